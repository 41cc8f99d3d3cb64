//! Line-by-line artifact streaming
//!
//! Sends a previously uploaded command script to a device, one line per
//! write, with a fixed inter-line pacing delay. The pacing is a hardware
//! constraint of this protocol family: the device's receive buffer overruns
//! without it. The device's exchange token is held for the whole transfer,
//! so command dispatch and polling on that device wait until streaming
//! completes; other devices are unaffected.

use crate::error::{Error, Result};
use crate::protocol;
use crate::registry::ConnectionRegistry;
use crate::transport;
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub struct FileStreamer {
    registry: Arc<ConnectionRegistry>,
}

impl FileStreamer {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        FileStreamer { registry }
    }

    /// Stream an artifact's lines to a device in file order
    ///
    /// Sends the storage-release command first, then every line verbatim;
    /// content is an opaque pass-through from the upload store. Returns the
    /// number of artifact lines written. A mid-stream transport error
    /// aborts immediately with [`Error::StreamAborted`] reporting how far
    /// the transfer got; resuming mid-file is not supported, so the caller
    /// decides whether to retry the whole artifact.
    pub fn stream(&self, device: &str, lines: &[String]) -> Result<usize> {
        let port = self.registry.get(device)?;
        let pacing = port.config().stream_pacing();
        let device_id = device.to_string();

        log::info!("{device}: streaming {} line(s)", lines.len());
        port.with_link(|link| {
            transport::write_line(link, protocol::CMD_RELEASE_SD).map_err(|e| {
                Error::StreamAborted {
                    device: device_id.clone(),
                    sent: 0,
                    reason: e.to_string(),
                }
            })?;

            for (sent, line) in lines.iter().enumerate() {
                transport::write_line(link, line).map_err(|e| Error::StreamAborted {
                    device: device_id.clone(),
                    sent,
                    reason: e.to_string(),
                })?;
                if !pacing.is_zero() {
                    thread::sleep(pacing);
                }
            }
            Ok(lines.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::transport::MockTransport;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    fn registry_with(cfg: DeviceConfig) -> Arc<ConnectionRegistry> {
        let devices: BTreeMap<_, _> = [("p1".to_string(), cfg)].into_iter().collect();
        Arc::new(ConnectionRegistry::new(&devices))
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_streams_release_then_every_line_in_order() {
        let registry = registry_with(DeviceConfig::mock());
        let mock = MockTransport::new();
        registry.get("p1").unwrap().install(Box::new(mock.clone()));

        let streamer = FileStreamer::new(registry);
        let sent = streamer
            .stream("p1", &lines(&["G28", "G1 X10 Y10", "M104 S0"]))
            .unwrap();

        assert_eq!(sent, 3);
        assert_eq!(
            mock.written_lines(),
            vec!["M22", "G28", "G1 X10 Y10", "M104 S0"]
        );
    }

    #[test]
    fn test_midstream_failure_aborts_with_progress() {
        let registry = registry_with(DeviceConfig::mock());
        let port = registry.get("p1").unwrap();
        let mock = MockTransport::new();
        // Release + first two artifact lines land, the third write fails
        mock.fail_after_writes(3);
        port.install(Box::new(mock.clone()));

        let streamer = FileStreamer::new(Arc::clone(&registry));
        let err = streamer
            .stream("p1", &lines(&["G28", "G1 X10", "G1 X20", "G1 X30"]))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::StreamAborted { sent: 2, device, .. } if device == "p1"
        ));
        assert_eq!(mock.written_lines(), vec!["M22", "G28", "G1 X10"]);
        // The handle is gone: the next operation must start from a fresh open
        assert!(!port.is_connected());
    }

    #[test]
    fn test_pacing_delay_between_lines() {
        let registry = registry_with(DeviceConfig {
            stream_pacing_ms: 20,
            ..DeviceConfig::mock()
        });
        let mock = MockTransport::new();
        registry.get("p1").unwrap().install(Box::new(mock));

        let streamer = FileStreamer::new(registry);
        let start = Instant::now();
        streamer.stream("p1", &lines(&["G28", "G1 X10", "M104 S0"])).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_unknown_device_stream() {
        let registry = registry_with(DeviceConfig::mock());
        let streamer = FileStreamer::new(registry);
        assert!(matches!(
            streamer.stream("p9", &lines(&["G28"])),
            Err(Error::UnknownDevice(id)) if id == "p9"
        ));
    }
}
