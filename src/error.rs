//! Error types for MudranIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// MudranIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device identifier not present in configuration (permanent, never retried)
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Transport open/read/write failure (transient, invalidates the handle)
    #[error("device unreachable: {device}: {reason}")]
    Unreachable { device: String, reason: String },

    /// Mid-transfer transport failure while streaming an artifact
    #[error("stream to {device} aborted after {sent} line(s): {reason}")]
    StreamAborted {
        device: String,
        sent: usize,
        reason: String,
    },

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file parse error
    #[error("configuration parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration file encode error
    #[error("configuration encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Wire serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the device's transport handle can no longer
    /// be trusted and must be discarded before the next exchange.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Serial(_)
                | Error::Io(_)
                | Error::Unreachable { .. }
                | Error::StreamAborted { .. }
        )
    }
}
