//! Cached status polling
//!
//! A poll is three ordered request/response exchanges under one hold of the
//! device's exchange token: print status (`M27`), temperatures (`M105`),
//! endstops (`M119`). The parsed snapshot is cached per device for the
//! configured freshness window, which bounds the polling rate the device
//! ever sees regardless of how often clients ask.

use crate::error::Result;
use crate::protocol;
use crate::registry::ConnectionRegistry;
use crate::transport::{self, Transport};
use crate::types::StatusSnapshot;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on collected `M20` reply lines, guards against a listing
/// that never terminates
const MAX_FILE_LIST_LINES: usize = 512;

#[derive(Clone)]
pub struct StatusPoller {
    registry: Arc<ConnectionRegistry>,
}

impl StatusPoller {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        StatusPoller { registry }
    }

    /// Fetch a device's status snapshot
    ///
    /// Serves the cached snapshot when it is younger than the device's
    /// freshness window, without touching the wire. A transport error
    /// invalidates both the handle and the cache; the caller decides
    /// whether to retry. Timed-out reads degrade individual fields, never
    /// the whole query.
    pub fn query(&self, device: &str) -> Result<StatusSnapshot> {
        let port = self.registry.get(device)?;
        if let Some(snapshot) = port.cached_status() {
            log::debug!("{device}: serving cached status");
            return Ok(snapshot);
        }

        let timeout = port.config().read_timeout();
        let (status_line, temp_line, endstop_line) = port.with_link(|link| {
            let status = exchange(link, protocol::CMD_PRINT_STATUS, timeout)?;
            let temps = exchange(link, protocol::CMD_TEMPERATURE, timeout)?;
            let endstops = exchange(link, protocol::CMD_ENDSTOPS, timeout)?;
            Ok((status, temps, endstops))
        })?;

        let (hotend_c, bed_c) = protocol::parse_temperatures(&temp_line);
        let snapshot = StatusSnapshot {
            state: protocol::parse_print_state(&status_line, &port.config().printing_marker),
            hotend_c,
            bed_c,
            endstops: protocol::parse_endstops(&endstop_line),
        };

        log::debug!("{device}: polled status {snapshot:?}");
        port.store_status(snapshot.clone());
        Ok(snapshot)
    }

    /// List the device's SD card contents (`M20`)
    ///
    /// The reply spans multiple lines terminated by `End file list`; a
    /// timed-out line ends the listing early rather than failing it.
    pub fn sd_files(&self, device: &str) -> Result<Vec<String>> {
        let port = self.registry.get(device)?;
        let timeout = port.config().read_timeout();

        let lines = port.with_link(|link| {
            transport::write_line(link, protocol::CMD_LIST_SD_FILES)?;
            let mut lines = Vec::new();
            loop {
                let line = transport::read_line(link, timeout)?;
                if line.is_empty() || protocol::is_file_list_end(&line) {
                    break;
                }
                lines.push(line);
                if lines.len() >= MAX_FILE_LIST_LINES {
                    log::warn!("{}: file listing truncated at {} lines", port.id(), lines.len());
                    break;
                }
            }
            Ok(lines)
        })?;

        Ok(protocol::file_list_entries(&lines))
    }
}

/// One request/response exchange: write the query, read its single reply line
fn exchange(link: &mut dyn Transport, command: &str, timeout: Duration) -> Result<String> {
    transport::write_line(link, command)?;
    transport::read_line(link, timeout)
}
