//! Per-device ordered command dispatch
//!
//! Each configured device gets one unbounded FIFO and one named worker
//! thread that drains it. Enqueueing returns as soon as the command is
//! queued; the write happens on the worker, under the device's exchange
//! token, so issuance never races with status polling or file streaming on
//! the same wire. Commands are applied in exactly the order they were
//! enqueued; the dispatcher never reorders or merges them.
//!
//! Workers are started right after the registry is built and joined on
//! shutdown; dropping a device's sender is its termination signal.

use crate::error::{Error, Result};
use crate::registry::{ConnectionRegistry, PrinterPort};
use crate::transport;
use crate::types::Command;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct CommandDispatcher {
    queues: Mutex<BTreeMap<String, Sender<Command>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CommandDispatcher {
    /// Spawn one worker per configured device
    pub fn start(registry: &Arc<ConnectionRegistry>) -> Result<Self> {
        let mut queues = BTreeMap::new();
        let mut workers = Vec::new();

        for (id, port) in registry.ports() {
            let (tx, rx) = unbounded::<Command>();
            let port = Arc::clone(port);
            let handle = thread::Builder::new()
                .name(format!("cmd-{id}"))
                .spawn(move || worker_loop(port, rx))
                .map_err(|e| Error::Other(format!("Failed to spawn worker for {id}: {e}")))?;
            queues.insert(id.to_string(), tx);
            workers.push(handle);
        }

        Ok(CommandDispatcher {
            queues: Mutex::new(queues),
            workers: Mutex::new(workers),
        })
    }

    /// Queue a command for a device
    ///
    /// Returns as soon as the command is accepted into the device's FIFO;
    /// it does not wait for the device's response. Callers that need
    /// synchronous confirmation pair the command with a follow-up status
    /// query. Unknown devices fail immediately without touching any queue.
    pub fn enqueue(&self, device: &str, command: Command) -> Result<()> {
        let queues = self.queues.lock();
        let queue = queues
            .get(device)
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))?;
        queue
            .send(command)
            .map_err(|_| Error::Other(format!("command worker for {device} is gone")))
    }

    /// Convenience for a bare command line with no expected reply
    pub fn send(&self, device: &str, line: impl Into<String>) -> Result<()> {
        self.enqueue(device, Command::new(line))
    }

    /// Signal every worker to stop and join them
    pub fn shutdown(&self) {
        self.queues.lock().clear();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        // Idempotent with an explicit shutdown() call
        self.shutdown();
    }
}

fn worker_loop(port: Arc<PrinterPort>, queue: Receiver<Command>) {
    log::info!("{}: command worker started", port.id());

    // recv fails once the dispatcher drops this device's sender
    while let Ok(command) = queue.recv() {
        if let Err(e) = deliver(&port, &command) {
            log::error!("{}: command {:?} failed: {}", port.id(), command.line, e);
        }
    }

    log::info!("{}: command worker stopped", port.id());
}

/// Write one command under the device's exchange token
///
/// A write failure invalidates the handle via the registry; the next queued
/// command triggers a fresh open attempt.
fn deliver(port: &PrinterPort, command: &Command) -> Result<()> {
    let timeout = port.config().read_timeout();
    port.with_link(|link| {
        transport::write_line(link, &command.line)?;
        if let Some(marker) = &command.expect {
            let reply = transport::read_line(link, timeout)?;
            if !reply.contains(marker) {
                log::warn!(
                    "unexpected reply to {:?}: {:?} (wanted {:?})",
                    command.line,
                    reply,
                    marker
                );
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::transport::{MockTransport, Transport};
    use std::time::{Duration, Instant};

    fn mock_registry(ids: &[&str]) -> Arc<ConnectionRegistry> {
        let devices = ids
            .iter()
            .map(|id| (id.to_string(), DeviceConfig::mock()))
            .collect();
        Arc::new(ConnectionRegistry::new(&devices))
    }

    fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_commands_written_in_enqueue_order() {
        let registry = mock_registry(&["p1"]);
        let port = registry.get("p1").unwrap();
        let mock = MockTransport::new();
        port.install(Box::new(mock.clone()));

        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        dispatcher.send("p1", "G28").unwrap();
        dispatcher.send("p1", "G1 X10").unwrap();
        dispatcher.send("p1", "M104 S200").unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            mock.written_lines().len() == 3
        }));
        assert_eq!(mock.written_lines(), vec!["G28", "G1 X10", "M104 S200"]);
        dispatcher.shutdown();
    }

    #[test]
    fn test_expected_reply_is_read_after_write() {
        let registry = mock_registry(&["p1"]);
        let port = registry.get("p1").unwrap();
        let mock = MockTransport::new();
        mock.inject_line("ok");
        port.install(Box::new(mock.clone()));

        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        dispatcher
            .enqueue("p1", Command::expecting("M104 S200", "ok"))
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            mock.written_lines() == vec!["M104 S200"]
        }));
        // The worker consumed the one-line reply as part of the exchange
        assert!(wait_until(Duration::from_secs(2), || {
            mock.clone().available().unwrap() == 0
        }));
        assert!(port.is_connected());
        dispatcher.shutdown();
    }

    #[test]
    fn test_mismatched_reply_is_logged_not_fatal() {
        let registry = mock_registry(&["p1"]);
        let port = registry.get("p1").unwrap();
        let mock = MockTransport::new();
        mock.inject_line("echo:busy processing");
        port.install(Box::new(mock.clone()));

        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        dispatcher
            .enqueue("p1", Command::expecting("M104 S200", "ok"))
            .unwrap();
        dispatcher.send("p1", "G28").unwrap();

        // The mismatch only produces a warning: the handle stays live and
        // the next queued command still goes out in order.
        assert!(wait_until(Duration::from_secs(2), || {
            mock.written_lines() == vec!["M104 S200", "G28"]
        }));
        assert!(port.is_connected());
        dispatcher.shutdown();
    }

    #[test]
    fn test_enqueue_unknown_device() {
        let registry = mock_registry(&["p1"]);
        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        assert!(matches!(
            dispatcher.send("p9", "G28"),
            Err(Error::UnknownDevice(id)) if id == "p9"
        ));
        dispatcher.shutdown();
    }

    #[test]
    fn test_write_failure_invalidates_then_reopens() {
        let registry = mock_registry(&["p1"]);
        let port = registry.get("p1").unwrap();
        let mock = MockTransport::new();
        mock.fail_after_writes(0);
        port.install(Box::new(mock));

        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        dispatcher.send("p1", "G28").unwrap();
        assert!(wait_until(Duration::from_secs(2), || !port.is_connected()));

        // The next command triggers a fresh open (mock kind) and succeeds
        dispatcher.send("p1", "G28").unwrap();
        assert!(wait_until(Duration::from_secs(2), || port.is_connected()));
        dispatcher.shutdown();
    }

    #[test]
    fn test_devices_drain_in_parallel() {
        let registry = mock_registry(&["p1", "p2"]);
        let slow_a = MockTransport::new();
        let slow_b = MockTransport::new();
        slow_a.set_write_delay(Duration::from_millis(50));
        slow_b.set_write_delay(Duration::from_millis(50));
        registry.get("p1").unwrap().install(Box::new(slow_a.clone()));
        registry.get("p2").unwrap().install(Box::new(slow_b.clone()));

        let dispatcher = CommandDispatcher::start(&registry).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            dispatcher.send("p1", "G1 X1").unwrap();
            dispatcher.send("p2", "G1 X1").unwrap();
        }

        assert!(wait_until(Duration::from_secs(3), || {
            slow_a.written_lines().len() == 4 && slow_b.written_lines().len() == 4
        }));

        // Serialized across devices this would take >= 400ms; parallel
        // workers finish in roughly half that.
        assert!(
            start.elapsed() < Duration::from_millis(350),
            "devices appear to share a lock: {:?}",
            start.elapsed()
        );
        dispatcher.shutdown();
    }
}
