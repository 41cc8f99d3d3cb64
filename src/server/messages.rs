//! Request/response messages for the control surface
//!
//! Inbound requests map one-to-one onto the core operations; responses
//! carry either the operation's result or a single error message. Status
//! responses render unavailable fields as `"N/A"` so clients can show
//! field-level uncertainty without special-casing missing keys.

use crate::types::{PrintState, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// Inbound control requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Queue one command line on a device (acknowledged, not awaited)
    SendCommand { device: String, line: String },
    /// Fetch the device's status snapshot (cached within the freshness window)
    GetStatus { device: String },
    /// Stream a previously uploaded artifact to the device
    StreamFile { device: String, file: String },
    /// List the device's SD card contents
    ListSdFiles { device: String },
    /// Graceful daemon shutdown
    Shutdown,
}

/// Outbound replies, one per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Request accepted (queued command, shutdown)
    Ack,
    Status {
        device: String,
        state: PrintState,
        hotend: String,
        bed: String,
        endstops: String,
    },
    Streamed {
        device: String,
        lines_sent: usize,
    },
    SdFiles {
        device: String,
        files: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl Response {
    /// Render a snapshot for clients, `"N/A"` for unavailable fields
    pub fn status(device: &str, snapshot: &StatusSnapshot) -> Self {
        Response::Status {
            device: device.to_string(),
            state: snapshot.state,
            hotend: temperature_field(snapshot.hotend_c),
            bed: temperature_field(snapshot.bed_c),
            endstops: snapshot
                .endstops
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }

    pub fn error(err: impl std::fmt::Display) -> Self {
        Response::Error {
            message: err.to_string(),
        }
    }
}

fn temperature_field(value: Option<f32>) -> String {
    value
        .map(|t| format!("{t:.1}"))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_renders_na_fields() {
        let snapshot = StatusSnapshot {
            state: PrintState::Unknown,
            hotend_c: None,
            bed_c: Some(60.0),
            endstops: None,
        };
        let response = Response::status("p1", &snapshot);
        let Response::Status {
            hotend,
            bed,
            endstops,
            ..
        } = response
        else {
            panic!("expected status response");
        };
        assert_eq!(hotend, "N/A");
        assert_eq!(bed, "60.0");
        assert_eq!(endstops, "N/A");
    }
}
