//! Per-device connection ownership
//!
//! The registry is built once at startup from the configured device set and
//! owns all per-device state: the transport handle, the exchange token that
//! serializes wire access, and the cached status snapshot. The map itself is
//! immutable after construction, so operations on two different devices
//! never contend: all mutability lives behind each device's own mutex.

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::transport::{self, Transport};
use crate::types::StatusSnapshot;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Device identifier -> port entry, fixed for the process lifetime
pub struct ConnectionRegistry {
    ports: BTreeMap<String, Arc<PrinterPort>>,
}

impl ConnectionRegistry {
    /// Build the registry from the configured device set
    pub fn new(devices: &BTreeMap<String, DeviceConfig>) -> Self {
        let ports = devices
            .iter()
            .map(|(id, cfg)| {
                (
                    id.clone(),
                    Arc::new(PrinterPort::new(id.clone(), cfg.clone())),
                )
            })
            .collect();
        ConnectionRegistry { ports }
    }

    /// Look up a device's port entry
    ///
    /// Unknown identifiers are a configuration mismatch, permanent for the
    /// process lifetime, and are never retried.
    pub fn get(&self, device: &str) -> Result<Arc<PrinterPort>> {
        self.ports
            .get(device)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))
    }

    /// Iterate all configured ports in identifier order
    pub fn ports(&self) -> impl Iterator<Item = (&str, &Arc<PrinterPort>)> {
        self.ports.iter().map(|(id, port)| (id.as_str(), port))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// One device's connection state
///
/// `link` doubles as the device's exchange token: whoever holds the lock
/// owns the wire for one full request/response exchange (or a whole file
/// stream), so command dispatch, polling, and streaming never interleave
/// byte-for-byte on the same transport.
pub struct PrinterPort {
    id: String,
    cfg: DeviceConfig,
    link: Mutex<Option<Box<dyn Transport>>>,
    status: Mutex<Option<CachedStatus>>,
}

struct CachedStatus {
    snapshot: StatusSnapshot,
    taken_at: Instant,
}

impl PrinterPort {
    fn new(id: String, cfg: DeviceConfig) -> Self {
        PrinterPort {
            id,
            cfg,
            link: Mutex::new(None),
            status: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.cfg
    }

    /// Run one exchange while holding this device's token
    ///
    /// Opens the transport lazily; a freshly opened handle is only usable
    /// after the configured settle delay because the firmware reboots when
    /// the line opens. A healthy handle is reused as-is, with no settle.
    ///
    /// On a transport-class error the handle is dropped before returning,
    /// so the next exchange starts from a fresh open. Open failure stores
    /// nothing and reports the device unreachable.
    pub fn with_link<R>(&self, f: impl FnOnce(&mut dyn Transport) -> Result<R>) -> Result<R> {
        let mut slot = self.link.lock();
        let mut link = match slot.take() {
            Some(link) => link,
            None => self.open_link()?,
        };

        let result = f(link.as_mut());
        match result {
            Err(err) if err.is_transport() => {
                log::warn!("{}: transport fault, dropping handle: {}", self.id, err);
                self.clear_status();
                Err(self.promote(err))
            }
            other => {
                *slot = Some(link);
                other
            }
        }
    }

    fn open_link(&self) -> Result<Box<dyn Transport>> {
        let link = transport::open(&self.cfg).map_err(|e| {
            log::warn!("{}: open failed on {}: {}", self.id, self.cfg.port, e);
            Error::Unreachable {
                device: self.id.clone(),
                reason: e.to_string(),
            }
        })?;
        if !self.cfg.settle().is_zero() {
            log::info!(
                "{}: opened {}, settling for {:?}",
                self.id,
                self.cfg.port,
                self.cfg.settle()
            );
            thread::sleep(self.cfg.settle());
        }
        Ok(link)
    }

    /// Fold raw I/O failures into the device-unreachable kind; typed
    /// results like `StreamAborted` pass through unchanged.
    fn promote(&self, err: Error) -> Error {
        match err {
            Error::Io(_) | Error::Serial(_) => Error::Unreachable {
                device: self.id.clone(),
                reason: err.to_string(),
            },
            other => other,
        }
    }

    /// Swap in an already-open transport, bypassing the open path.
    /// Used by tests and hardware-free demo setups.
    pub fn install(&self, link: Box<dyn Transport>) {
        *self.link.lock() = Some(link);
    }

    /// Whether a live handle currently exists for this device
    pub fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Drop the handle (and the cached status derived through it)
    pub fn disconnect(&self) {
        *self.link.lock() = None;
        self.clear_status();
    }

    /// Cached snapshot, if one exists and is younger than the freshness window
    pub fn cached_status(&self) -> Option<StatusSnapshot> {
        let cache = self.status.lock();
        cache
            .as_ref()
            .filter(|c| c.taken_at.elapsed() < self.cfg.status_ttl())
            .map(|c| c.snapshot.clone())
    }

    pub fn store_status(&self, snapshot: StatusSnapshot) {
        *self.status.lock() = Some(CachedStatus {
            snapshot,
            taken_at: Instant::now(),
        });
    }

    pub fn clear_status(&self) {
        *self.status.lock() = None;
    }
}
