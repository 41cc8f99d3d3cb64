//! Transport layer for I/O abstraction
//!
//! A transport is one serial-like, half-duplex byte channel to a single
//! device. The protocol above it is line-oriented: newline-terminated ASCII
//! commands, one reply line per command in normal operation. [`write_line`]
//! and [`read_line`] frame that discipline over the byte-level trait.

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use std::time::{Duration, Instant};

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// How long to wait between polls while a read has produced no bytes
const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Transport trait for device communication
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 on timeout)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0) // Default implementation
    }
}

/// Open a transport for a configured device
///
/// Keyed by the device's `transport` kind so test and demo setups can run
/// without hardware.
pub fn open(cfg: &DeviceConfig) -> Result<Box<dyn Transport>> {
    match cfg.transport.as_str() {
        "serial" => Ok(Box::new(SerialTransport::open(&cfg.port, cfg.baud_rate)?)),
        "mock" => Ok(Box::new(MockTransport::new())),
        other => Err(Error::Config(format!("unknown transport kind: {other}"))),
    }
}

/// Write one command line, newline-terminated, and flush it out
pub fn write_line(transport: &mut dyn Transport, line: &str) -> Result<()> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');

    let mut written = 0;
    while written < frame.len() {
        let n = transport.write(&frame[written..])?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "transport accepted no bytes",
            )));
        }
        written += n;
    }
    transport.flush()
}

/// Read one reply line, bounded by `timeout`
///
/// Returns whatever arrived before the newline with `\r` and surrounding
/// whitespace stripped. A timed-out read yields the partial line collected
/// so far (usually empty), never an error: the firmware response format is
/// not contractually guaranteed.
pub fn read_line(transport: &mut dyn Transport, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut collected: Vec<u8> = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = transport.read(&mut byte)?;
        if n == 0 {
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(READ_POLL_INTERVAL);
            continue;
        }
        if byte[0] == b'\n' {
            break;
        }
        collected.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&collected).trim().to_string())
}
