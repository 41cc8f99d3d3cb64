//! MudranIO - connection and command-dispatch daemon for a fleet of
//! serial-attached 3D printers
//!
//! One daemon fronts every configured printer: clients connect over TCP,
//! send framed requests (queue a command, poll status, stream an uploaded
//! file, list the SD card), and the per-device machinery below keeps each
//! printer's half-duplex serial line disciplined.

use mudran_io::config::AppConfig;
use mudran_io::dispatch::CommandDispatcher;
use mudran_io::error::{Error, Result};
use mudran_io::poller::StatusPoller;
use mudran_io::registry::ConnectionRegistry;
use mudran_io::server::{Receiver, Serializer, Services, WireFormat};
use mudran_io::storage::UploadStore;
use mudran_io::streamer::FileStreamer;
use std::env;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `mudran-io <path>` (positional)
/// - `mudran-io --config <path>` (flag-based)
/// - `mudran-io -c <path>` (short flag)
///
/// Defaults to `/etc/mudranio.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/mudranio.toml".to_string()
}

fn init_logger(level: &str, output: &str) {
    let target = match output {
        "stderr" => env_logger::Target::Stderr,
        _ => env_logger::Target::Stdout,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(target)
        .init();
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path)?;
    init_logger(&config.logging.level, &config.logging.output);

    log::info!("MudranIO v0.1.0 starting...");
    log::info!("Using config: {}", config_path);
    log::info!("{} device(s) configured:", config.devices.len());
    for (id, device) in &config.devices {
        log::info!("  {} -> {} @ {} baud", id, device.port, device.baud_rate);
    }

    // Per-device state is owned here and handed to the workers; nothing
    // reaches for globals.
    let registry = Arc::new(ConnectionRegistry::new(&config.devices));
    let dispatcher = Arc::new(CommandDispatcher::start(&registry)?);
    let services = Services {
        registry: Arc::clone(&registry),
        dispatcher: Arc::clone(&dispatcher),
        poller: StatusPoller::new(Arc::clone(&registry)),
        streamer: FileStreamer::new(Arc::clone(&registry)),
        store: UploadStore::new(&config.storage.upload_dir),
    };

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let bind_addr = &config.network.bind_address;
    let listener = TcpListener::bind(bind_addr)
        .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    if let Err(e) = listener.set_nonblocking(true) {
        log::warn!("Failed to set nonblocking mode: {}", e);
    }

    log::info!("Control surface listening on {}", bind_addr);
    log::info!("MudranIO running. Press Ctrl-C to stop.");

    // Main loop - accept control connections. Concurrent clients are fine:
    // the per-device exchange tokens serialize wire access below this layer.
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Client connected: {}", addr);
                if let Err(e) = stream.set_nonblocking(false) {
                    log::error!("Failed to set socket to blocking mode: {}", e);
                    continue;
                }

                let mut receiver = Receiver::new(
                    Serializer::new(WireFormat::default()),
                    services.clone(),
                    Arc::clone(&running),
                    Arc::new(AtomicBool::new(true)),
                );
                let _recv_handle = thread::Builder::new()
                    .name("ctl-receiver".to_string())
                    .spawn(move || {
                        if let Err(e) = receiver.run(stream) {
                            log::error!("Receiver error: {}", e);
                        }
                        log::info!("Client disconnected: {}", addr);
                    });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No connection pending, sleep briefly
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
            }
        }
    }

    log::info!("Shutting down...");
    dispatcher.shutdown();
    log::info!("MudranIO stopped");
    Ok(())
}
