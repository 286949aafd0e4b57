//! Utility functions for System2

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Cut `text` down to at most `capacity` bytes without splitting a
/// character. Returns whether anything was removed.
pub fn truncate_text(text: &mut String, capacity: usize) -> bool {
    if text.len() <= capacity {
        return false;
    }
    let mut end = capacity;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

/// Decode bytes as UTF-8 (lossily) and bound the result to `capacity` bytes
pub fn bounded_text(bytes: &[u8], capacity: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncate_text(&mut text, capacity) {
        log::debug!("Truncated text to {} bytes", capacity);
    }
    text
}

/// Reject empty or oversized request parameters
pub fn check_param(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.len() > max_len {
        return Err(Error::InvalidInput(format!(
            "{} exceeds {} bytes",
            field, max_len
        )));
    }
    Ok(())
}

/// Length check only; empty and whitespace values are accepted as given
pub fn check_optional_param(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.len() > max_len {
        return Err(Error::InvalidInput(format!(
            "{} exceeds {} bytes",
            field, max_len
        )));
    }
    Ok(())
}

/// Sibling path a download is written to before it is complete
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Format bytes to human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Calculate progress fraction
pub fn calculate_progress(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64).min(1.0)
}
