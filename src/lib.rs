//! MudranIO - connection and dispatch library for a fleet of
//! serial-attached 3D printers
//!
//! The core is the per-device transport discipline: one lazily-opened
//! serial handle per printer, one exchange token serializing all wire
//! access, one worker draining an ordered command queue. Status polling
//! and file streaming route through the same token, so no two operations
//! ever interleave on a device's half-duplex line, while different
//! devices proceed fully in parallel.
//!
//! ## Modules
//!
//! - [`registry`]: per-device connection ownership and reconnection
//! - [`dispatch`]: ordered, asynchronous command queues
//! - [`poller`]: cached status queries (`M27`/`M105`/`M119`)
//! - [`streamer`]: paced line-by-line file streaming
//! - [`server`]: framed TCP control surface (glue)
//! - [`storage`]: uploaded artifact resolution (glue)

pub mod config;
pub mod dispatch;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod storage;
pub mod streamer;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
