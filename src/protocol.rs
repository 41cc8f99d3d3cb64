//! Query commands and reply parsing for the printers' line protocol
//!
//! The firmware answers in free text, not structured data, so every parser
//! here degrades to `Unknown`/`None` instead of failing: a malformed reply
//! is field-level uncertainty, never an error.
//!
//! Reply shapes this module understands:
//!
//! ```text
//! M27  -> "SD printing byte 2134/93932"   or "Not SD printing"
//! M105 -> "ok T:210.5 /210.0 B:60.0 /60.0"
//! M119 -> "x_min: open y_min: open z_min: TRIGGERED"
//! M20  -> "Begin file list" ... one name per line ... "End file list"
//! ```

use crate::types::PrintState;

/// Print status query
pub const CMD_PRINT_STATUS: &str = "M27";
/// Hotend/bed temperature query
pub const CMD_TEMPERATURE: &str = "M105";
/// Endstop status query
pub const CMD_ENDSTOPS: &str = "M119";
/// SD card file listing
pub const CMD_LIST_SD_FILES: &str = "M20";
/// SD card release, sent before streaming so the card is not mid-selected
pub const CMD_RELEASE_SD: &str = "M22";

/// Terminator line of an `M20` listing
pub const FILE_LIST_END: &str = "End file list";
/// Header line of an `M20` listing
pub const FILE_LIST_BEGIN: &str = "Begin file list";

/// Classify the `M27` reply
///
/// `printing_marker` is the per-device substring meaning "currently
/// printing" (dialects disagree on the exact text). An empty line is a
/// timed-out read and classifies as [`PrintState::Unknown`].
pub fn parse_print_state(line: &str, printing_marker: &str) -> PrintState {
    let line = line.trim();
    if line.is_empty() {
        return PrintState::Unknown;
    }
    if line.contains(printing_marker) {
        PrintState::Printing
    } else {
        PrintState::Idle
    }
}

/// Extract (hotend, bed) temperatures from the `M105` reply
///
/// The numeric token runs from the marker to the next whitespace; a marker
/// with no parseable number yields `None` for that field only.
pub fn parse_temperatures(line: &str) -> (Option<f32>, Option<f32>) {
    (
        parse_marked_number(line, "T:"),
        parse_marked_number(line, "B:"),
    )
}

fn parse_marked_number(line: &str, marker: &str) -> Option<f32> {
    let start = line.find(marker)? + marker.len();
    let token = line[start..].split_whitespace().next()?;
    token.parse().ok()
}

/// Endstop summary: the trimmed reply line, or `None` when nothing arrived
pub fn parse_endstops(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Whether this reply line terminates an `M20` listing
pub fn is_file_list_end(line: &str) -> bool {
    line.trim().starts_with(FILE_LIST_END)
}

/// Strip listing chrome (`Begin file list`, `ok`, blanks) from collected
/// `M20` reply lines, leaving the file entries in device order
pub fn file_list_entries(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .filter(|line| !line.eq_ignore_ascii_case(FILE_LIST_BEGIN))
        .filter(|line| !line.eq_ignore_ascii_case(FILE_LIST_END))
        .filter(|line| !line.eq_ignore_ascii_case("ok"))
        .map(str::to_string)
        .collect()
}
