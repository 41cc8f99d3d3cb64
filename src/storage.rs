//! Uploaded artifact storage
//!
//! The serving layer persists uploaded command scripts under one directory
//! per device; this collaborator resolves a `(device, filename)` pair back
//! to ordered lines for the streamer. Content is read-only here and passed
//! through opaquely with no G-code validation.

use crate::error::{Error, Result};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Extensions accepted for uploaded command scripts
const SCRIPT_EXTENSIONS: [&str; 2] = ["gcode", "gco"];

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        UploadStore { root: root.into() }
    }

    /// Whether a filename carries an accepted script extension
    ///
    /// The serving layer applies this check before accepting an upload or a
    /// stream request.
    pub fn has_gcode_extension(name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SCRIPT_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            })
            .unwrap_or(false)
    }

    /// Resolve an uploaded artifact to its ordered lines
    pub fn resolve(&self, device: &str, name: &str) -> Result<Vec<String>> {
        // Client-supplied names must stay inside the upload directory
        if !is_plain_name(device) || !is_plain_name(name) {
            return Err(Error::Other(format!(
                "invalid artifact reference: {device}/{name}"
            )));
        }

        let path = self.root.join(device).join(name);
        let file = fs::File::open(&path)
            .map_err(|e| Error::Other(format!("artifact {} not found: {e}", path.display())))?;

        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            lines.push(line?);
        }
        Ok(lines)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}
