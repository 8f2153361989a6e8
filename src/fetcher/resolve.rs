//! Locating the file an extractor actually produced
//!
//! Extension-guessing extractors do not always write the file they report
//! (`<hash>.NA` is a known case). Resolution is a best-effort chain:
//!
//! 1. the reported path, if it exists
//! 2. the reported path with the metadata extension substituted
//! 3. the newest file in the directory whose name starts with the hash

use crate::error::{FetchError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Resolve the produced file, following the fallback chain
///
/// # Errors
///
/// [`FetchError::ResultFileNotFound`] if no step yields an existing file.
pub fn resolve_output(
    reported: Option<&Path>,
    info_ext: Option<&str>,
    dir: &Path,
    url_hash: &str,
) -> Result<PathBuf> {
    if let Some(path) = reported
        && path.is_file()
    {
        return Ok(path.to_path_buf());
    }

    if let Some(ext) = info_ext.filter(|e| !e.is_empty() && *e != "NA") {
        let candidate = match reported {
            Some(path) => path.with_extension(ext),
            None => dir.join(format!("{url_hash}.{ext}")),
        };
        if candidate.is_file() {
            debug!(?candidate, "resolved output via metadata extension");
            return Ok(candidate);
        }
    }

    if let Some(candidate) = newest_with_prefix(dir, url_hash)? {
        debug!(?candidate, "resolved output via directory scan");
        return Ok(candidate);
    }

    Err(FetchError::ResultFileNotFound {
        url_hash: url_hash.to_string(),
        dir: dir.to_path_buf(),
    }
    .into())
}

/// Newest regular file in `dir` whose name starts with `prefix`
fn newest_with_prefix(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || is_scratch_name(name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

/// In-progress downloads and upload parts are never results
fn is_scratch_name(name: &str) -> bool {
    if name.ends_with(".part") || name.ends_with(".ytdl") || name.ends_with(".temp") {
        return true;
    }
    // `<file>.part<N>` chunks
    match name.rsplit_once(".part") {
        Some((_, digits)) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
