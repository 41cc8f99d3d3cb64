//! Framed TCP control surface
//!
//! Thin serving layer over the core: clients send framed requests, the
//! receiver dispatches into the registry-backed services and frames the
//! response back. All device serialization happens below this layer.

pub mod messages;
pub mod receiver;
pub mod wire;

pub use messages::{Request, Response};
pub use receiver::{Receiver, Services};
pub use wire::{Serializer, WireFormat};
