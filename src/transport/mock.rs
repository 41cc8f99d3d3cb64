//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock transport for unit testing
///
/// Clones share the same buffers, so a test can keep one handle for
/// injection and assertions while the registry owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// When `Some(n)`, the next n writes succeed and every write after
    /// that fails. Simulates a wire dropping mid-operation.
    writes_remaining: Option<usize>,
    /// Per-write sleep simulating a slow wire
    write_delay: Option<Duration>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                writes_remaining: None,
                write_delay: None,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Inject one newline-terminated reply line
    pub fn inject_line(&self, line: &str) {
        self.inject_read(line.as_bytes());
        self.inject_read(b"\n");
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        inner.write_buffer.clone()
    }

    /// Written data split into lines, in write order
    pub fn written_lines(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        String::from_utf8_lossy(&inner.write_buffer)
            .split('\n')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.clear();
    }

    /// Let the next `n` writes succeed, then fail every write after them
    pub fn fail_after_writes(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.writes_remaining = Some(n);
    }

    /// Sleep this long inside every write, simulating a slow wire
    pub fn set_write_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_delay = Some(delay);
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let available = inner.read_buffer.len().min(buffer.len());

        for item in buffer.iter_mut().take(available) {
            *item = inner.read_buffer.pop_front().unwrap();
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let delay = self.inner.lock().unwrap().write_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(remaining) = inner.writes_remaining {
            if remaining == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated write failure",
                )));
            }
            inner.writes_remaining = Some(remaining - 1);
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.read_buffer.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
