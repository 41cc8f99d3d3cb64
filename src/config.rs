//! Configuration for the MudranIO daemon
//!
//! Loads configuration from a TOML file. The device set is fixed at load
//! time; identifiers absent from `[devices]` are permanent errors, never
//! transient ones.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Device identifier -> transport settings, fixed for the process lifetime
    pub devices: BTreeMap<String, DeviceConfig>,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Per-device transport and protocol settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Serial device path (e.g. "/dev/serial/by-id/usb-Prusa_Research_...")
    pub port: String,
    /// Baud rate, 115200 for this protocol family
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Transport kind: "serial" or "mock" (hardware-free testing)
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Upper bound on every line read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Post-open delay: the firmware reboots when the line opens and drops
    /// anything sent before it has settled
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Freshness window for cached status snapshots
    #[serde(default = "default_status_ttl_ms")]
    pub status_ttl_ms: u64,
    /// Inter-line delay while streaming a file, bounds the device's
    /// receive-buffer fill rate
    #[serde(default = "default_stream_pacing_ms")]
    pub stream_pacing_ms: u64,
    /// Substring of the status reply that means "currently printing".
    /// Firmware dialects disagree on the exact text, so it is per-device.
    #[serde(default = "default_printing_marker")]
    pub printing_marker: String,
}

/// TCP control surface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Bind address for inbound control connections
    ///
    /// Examples:
    /// - `0.0.0.0:5580` - Bind to all interfaces on port 5580
    /// - `127.0.0.1:5580` - Localhost only
    pub bind_address: String,
}

/// Uploaded artifact storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding uploaded command scripts, one subdirectory per device
    pub upload_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout or stderr)
    pub output: String,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_transport() -> String {
    "serial".to_string()
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_status_ttl_ms() -> u64 {
    2000
}

fn default_stream_pacing_ms() -> u64 {
    30
}

fn default_printing_marker() -> String {
    "SD printing byte".to_string()
}

impl DeviceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.stream_pacing_ms)
    }

    /// Settings for a mock-transport device: no settle delay, short read
    /// timeout. Used by tests and hardware-free demo setups.
    pub fn mock() -> Self {
        DeviceConfig {
            port: "mock".to_string(),
            baud_rate: default_baud_rate(),
            transport: "mock".to_string(),
            read_timeout_ms: 50,
            settle_ms: 0,
            status_ttl_ms: default_status_ttl_ms(),
            stream_pacing_ms: 0,
            printing_marker: default_printing_marker(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for a pair of MK2S printers
    ///
    /// Suitable for testing and development. Production deployments
    /// should use a proper TOML configuration file.
    pub fn mk2s_defaults() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(
            "prusa_mk2s_1".to_string(),
            DeviceConfig {
                port: "/dev/serial/by-id/usb-Prusa_Research__prusa3d.com__Original_Prusa_i3_MK2_1-if00".to_string(),
                baud_rate: default_baud_rate(),
                transport: default_transport(),
                read_timeout_ms: default_read_timeout_ms(),
                settle_ms: default_settle_ms(),
                status_ttl_ms: default_status_ttl_ms(),
                stream_pacing_ms: default_stream_pacing_ms(),
                printing_marker: default_printing_marker(),
            },
        );
        devices.insert(
            "prusa_mk2s_4".to_string(),
            DeviceConfig {
                port: "/dev/serial/by-id/usb-Prusa_Research__prusa3d.com__Original_Prusa_i3_MK2_4-if00".to_string(),
                baud_rate: default_baud_rate(),
                transport: default_transport(),
                read_timeout_ms: default_read_timeout_ms(),
                settle_ms: default_settle_ms(),
                status_ttl_ms: default_status_ttl_ms(),
                stream_pacing_ms: default_stream_pacing_ms(),
                printing_marker: default_printing_marker(),
            },
        );
        AppConfig {
            devices,
            network: NetworkConfig {
                bind_address: "0.0.0.0:5580".to_string(),
            },
            storage: StorageConfig {
                upload_dir: "/var/lib/mudranio/uploads".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stdout".to_string(),
            },
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::mk2s_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::mk2s_defaults();
        assert_eq!(config.devices.len(), 2);
        let dev = &config.devices["prusa_mk2s_1"];
        assert_eq!(dev.baud_rate, 115_200);
        assert_eq!(dev.transport, "serial");
        assert_eq!(dev.printing_marker, "SD printing byte");
        assert_eq!(config.network.bind_address, "0.0.0.0:5580");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::mk2s_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[devices.prusa_mk2s_1]"));
        assert!(toml_string.contains("[devices.prusa_mk2s_4]"));
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("baud_rate = 115200"));
        assert!(toml_string.contains("printing_marker = \"SD printing byte\""));
    }

    #[test]
    fn test_toml_deserialization_with_defaults() {
        let toml_content = r#"
[devices.ender_1]
port = "/dev/ttyUSB0"

[devices.ender_2]
port = "/dev/ttyUSB1"
baud_rate = 250000
printing_marker = "SD print in progress"

[network]
bind_address = "127.0.0.1:5580"

[storage]
upload_dir = "/tmp/uploads"

[logging]
level = "debug"
output = "stderr"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        let first = &config.devices["ender_1"];
        assert_eq!(first.port, "/dev/ttyUSB0");
        assert_eq!(first.baud_rate, 115_200);
        assert_eq!(first.settle_ms, 2000);
        assert_eq!(first.printing_marker, "SD printing byte");

        let second = &config.devices["ender_2"];
        assert_eq!(second.baud_rate, 250_000);
        assert_eq!(second.printing_marker, "SD print in progress");

        assert_eq!(config.logging.level, "debug");
    }
}
