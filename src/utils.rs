//! Utility functions for hashing and scratch-file handling

use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

/// Content-addressed base name for a URL: lowercase hex SHA-256
///
/// Repeated requests for the same URL map to the same name, and the name is
/// filesystem-safe whatever the URL contains.
///
/// ```
/// use tg_media_dl::utils::url_hash;
///
/// let hash = url_hash("https://example.com/watch?v=1");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, url_hash("https://example.com/watch?v=1"));
/// ```
#[must_use]
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Delete a scratch file, logging instead of failing
///
/// Returns `true` if the file is gone afterwards (already missing counts).
pub fn remove_scratch_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(?path, "removed scratch file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(?path, error = %e, "failed to remove scratch file");
            false
        }
    }
}

/// Delete a scratch directory and its contents, logging instead of failing
pub fn remove_scratch_dir(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(?path, "removed scratch directory");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(?path, error = %e, "failed to remove scratch directory");
            false
        }
    }
}

/// Keep the last `max_chars` characters of tool output, trimmed
pub fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}
