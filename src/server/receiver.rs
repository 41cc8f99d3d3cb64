//! TCP request receiver for client control
//!
//! One receiver runs per connected client. Requests are processed
//! sequentially on the connection's own thread; the per-device exchange
//! tokens below this layer keep concurrent clients from interleaving on
//! the same wire, so multiple connections are safe.
//!
//! # Safety Features
//!
//! - **Read timeout**: 500ms timeout allows periodic shutdown flag checks
//! - **Frame limit**: payloads > 1MB are rejected
//! - **Graceful shutdown**: handles both global and per-connection flags
//!
//! A client that disconnects mid-request does not cancel the in-progress
//! device exchange (bytes already on the wire cannot be un-sent); it only
//! stops the response from being delivered.

use crate::dispatch::CommandDispatcher;
use crate::error::{Error, Result};
use crate::poller::StatusPoller;
use crate::registry::ConnectionRegistry;
use crate::server::messages::{Request, Response};
use crate::server::wire::{self, Serializer};
use crate::storage::UploadStore;
use crate::streamer::FileStreamer;
use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Initial capacity for the request read buffer (typical request size)
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Shared handles the control surface dispatches into
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub poller: StatusPoller,
    pub streamer: FileStreamer,
    pub store: UploadStore,
}

/// Receiver that handles requests from one connected client
pub struct Receiver {
    serializer: Serializer,
    services: Services,
    /// Global running flag (daemon shutdown)
    running: Arc<AtomicBool>,
    /// Per-connection alive flag (connection health)
    conn_alive: Arc<AtomicBool>,
    /// Reusable buffer for reading request payloads
    read_buffer: Vec<u8>,
}

impl Receiver {
    pub fn new(
        serializer: Serializer,
        services: Services,
        running: Arc<AtomicBool>,
        conn_alive: Arc<AtomicBool>,
    ) -> Self {
        Receiver {
            serializer,
            services,
            running,
            conn_alive,
            read_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Run the receiver loop for a connected client
    pub fn run(&mut self, mut stream: TcpStream) -> Result<()> {
        log::info!("Control receiver started for client: {:?}", stream.peer_addr());

        // Set read timeout so we can check shutdown flags
        if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(500))) {
            log::warn!("Failed to set read timeout: {}", e);
        }

        loop {
            if !self.running.load(Ordering::Relaxed) {
                log::debug!("Running flag cleared, exiting");
                break;
            }
            if !self.conn_alive.load(Ordering::Relaxed) {
                log::debug!("Connection alive flag cleared, exiting");
                break;
            }

            match self.read_request(&mut stream) {
                Ok(Some(request)) => {
                    log::debug!("Request: {:?}", request);
                    let response = self.handle(request);
                    if let Err(e) = self.send_response(&mut stream, &response) {
                        log::error!("Failed to send response: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    // Timeout, loop back to the flag checks
                }
                Err(e) => {
                    self.conn_alive.store(false, Ordering::Relaxed);
                    let _ = stream.shutdown(std::net::Shutdown::Both);

                    if let Error::Io(ref io_err) = e
                        && (io_err.kind() == std::io::ErrorKind::UnexpectedEof
                            || io_err.kind() == std::io::ErrorKind::ConnectionReset)
                    {
                        log::info!("Client disconnected");
                        return Ok(());
                    }
                    log::error!("Failed to read request: {}", e);
                    return Err(e);
                }
            }
        }

        self.conn_alive.store(false, Ordering::Relaxed);
        let _ = stream.shutdown(std::net::Shutdown::Both);

        log::info!("Control receiver stopped");
        Ok(())
    }

    /// Read one framed request
    fn read_request(&mut self, stream: &mut TcpStream) -> Result<Option<Request>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > wire::MAX_FRAME_BYTES {
            return Err(Error::Other(format!("Frame too large: {} bytes", len)));
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        stream.read_exact(&mut self.read_buffer)?;

        self.serializer.deserialize(&self.read_buffer).map(Some)
    }

    fn send_response(&self, stream: &mut TcpStream, response: &Response) -> Result<()> {
        let payload = self.serializer.serialize(response)?;
        wire::write_frame(stream, &payload)
    }

    /// Dispatch one request; failures become error responses, never a
    /// dropped connection
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::SendCommand { device, line } => {
                match self.services.dispatcher.send(&device, line) {
                    Ok(()) => Response::Ack,
                    Err(e) => Response::error(e),
                }
            }
            Request::GetStatus { device } => match self.services.poller.query(&device) {
                Ok(snapshot) => Response::status(&device, &snapshot),
                Err(e) => Response::error(e),
            },
            Request::StreamFile { device, file } => {
                if let Err(e) = self.services.registry.get(&device) {
                    return Response::error(e);
                }
                if !UploadStore::has_gcode_extension(&file) {
                    return Response::error(format!("not a gcode file: {file}"));
                }
                let outcome = self
                    .services
                    .store
                    .resolve(&device, &file)
                    .and_then(|lines| self.services.streamer.stream(&device, &lines));
                match outcome {
                    Ok(lines_sent) => Response::Streamed { device, lines_sent },
                    Err(e) => Response::error(e),
                }
            }
            Request::ListSdFiles { device } => match self.services.poller.sd_files(&device) {
                Ok(files) => Response::SdFiles { device, files },
                Err(e) => Response::error(e),
            },
            Request::Shutdown => {
                log::info!("Shutdown requested by client");
                self.running.store(false, Ordering::Relaxed);
                Response::Ack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::server::wire::WireFormat;
    use crate::transport::MockTransport;
    use std::collections::BTreeMap;

    fn mock_services() -> (Services, MockTransport) {
        let devices: BTreeMap<_, _> = [("p1".to_string(), DeviceConfig::mock())]
            .into_iter()
            .collect();
        let registry = Arc::new(ConnectionRegistry::new(&devices));
        let mock = MockTransport::new();
        registry.get("p1").unwrap().install(Box::new(mock.clone()));

        let services = Services {
            registry: Arc::clone(&registry),
            dispatcher: Arc::new(CommandDispatcher::start(&registry).unwrap()),
            poller: StatusPoller::new(Arc::clone(&registry)),
            streamer: FileStreamer::new(Arc::clone(&registry)),
            store: UploadStore::new("/nonexistent-mudranio-root"),
        };
        (services, mock)
    }

    fn receiver(services: Services, running: &Arc<AtomicBool>) -> Receiver {
        Receiver::new(
            Serializer::new(WireFormat::Json),
            services,
            Arc::clone(running),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn test_get_status_renders_snapshot() {
        let (services, mock) = mock_services();
        mock.inject_line("Not SD printing");
        mock.inject_line("ok T:210.5 /210.0 B:60.0 /60.0");
        mock.inject_line("x_min: open");

        let running = Arc::new(AtomicBool::new(true));
        let receiver = receiver(services, &running);
        let response = receiver.handle(Request::GetStatus {
            device: "p1".to_string(),
        });

        let Response::Status { hotend, bed, .. } = response else {
            panic!("expected status response");
        };
        assert_eq!(hotend, "210.5");
        assert_eq!(bed, "60.0");
    }

    #[test]
    fn test_unknown_device_becomes_error_response() {
        let (services, _mock) = mock_services();
        let running = Arc::new(AtomicBool::new(true));
        let receiver = receiver(services, &running);

        let response = receiver.handle(Request::GetStatus {
            device: "p9".to_string(),
        });
        assert!(matches!(response, Response::Error { .. }));
    }

    #[test]
    fn test_stream_rejects_wrong_extension() {
        let (services, mock) = mock_services();
        let running = Arc::new(AtomicBool::new(true));
        let receiver = receiver(services, &running);

        let response = receiver.handle(Request::StreamFile {
            device: "p1".to_string(),
            file: "notes.txt".to_string(),
        });
        assert!(matches!(response, Response::Error { .. }));
        // Rejected before anything touched the wire
        assert!(mock.written_lines().is_empty());
    }

    #[test]
    fn test_shutdown_clears_running_flag() {
        let (services, _mock) = mock_services();
        let running = Arc::new(AtomicBool::new(true));
        let receiver = receiver(services, &running);

        let response = receiver.handle(Request::Shutdown);
        assert!(matches!(response, Response::Ack));
        assert!(!running.load(Ordering::Relaxed));
    }
}
