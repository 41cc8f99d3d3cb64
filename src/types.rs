//! Core data types for commands and device status.
//!
//! Key types for the dispatch and polling layers:
//! - [`Command`]: one outbound instruction line, immutable once enqueued
//! - [`StatusSnapshot`]: parsed status derived from a device's latest replies
//! - [`PrintState`]: coarse print activity classification

use serde::{Deserialize, Serialize};

/// Print activity reported by the firmware's status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintState {
    Idle,
    Printing,
    /// Status line was empty or unparseable (e.g. a timed-out read)
    Unknown,
}

/// Parsed, cacheable device status
///
/// Temperature fields are `None` when the firmware reply carried no
/// parseable value for them; that is field-level uncertainty, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: PrintState,
    pub hotend_c: Option<f32>,
    pub bed_c: Option<f32>,
    pub endstops: Option<String>,
}

/// One queued command line for a device
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Instruction line, written verbatim (newline appended by the transport)
    pub line: String,
    /// Optional marker expected in the device's one-line reply. When set,
    /// the worker reads one response line after the write and logs a
    /// mismatch; it never fails the command on reply contents.
    pub expect: Option<String>,
}

impl Command {
    pub fn new(line: impl Into<String>) -> Self {
        Command {
            line: line.into(),
            expect: None,
        }
    }

    pub fn expecting(line: impl Into<String>, marker: impl Into<String>) -> Self {
        Command {
            line: line.into(),
            expect: Some(marker.into()),
        }
    }
}
