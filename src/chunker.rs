//! Fixed-size file splitting for upload size limits
//!
//! A file is cut into consecutive parts of at most `chunk_size` bytes, each
//! written next to the source as `<source>.part<N>`. Concatenating the parts
//! in index order reproduces the source exactly.

use crate::error::{Error, Result};
use crate::types::FilePart;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default part size: 45 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 45 * 1024 * 1024;

/// Size of the buffer used to stream each part to disk
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Path of the `index`-th part (1-based) of `source`
///
/// ```
/// use std::path::Path;
/// use tg_media_dl::chunker::part_path;
///
/// let part = part_path(Path::new("/cache/abc.mp4"), 2);
/// assert_eq!(part, Path::new("/cache/abc.mp4.part2"));
/// ```
#[must_use]
pub fn part_path(source: &Path, index: usize) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

/// Split `path` into parts of at most `chunk_size` bytes
///
/// Reads sequentially from offset 0 and stops at end of file. A zero-byte
/// file yields no parts; a file whose size is a multiple of `chunk_size`
/// yields no empty trailing part. Parts already written are left on disk if
/// a later write fails; cleanup is the caller's job.
///
/// This is blocking I/O; async callers run it under `spawn_blocking`.
///
/// # Errors
///
/// Returns [`Error::Config`] for a zero `chunk_size` and [`Error::Io`] if the
/// source cannot be read or a part cannot be written.
pub fn split(path: &Path, chunk_size: u64) -> Result<Vec<FilePart>> {
    if chunk_size == 0 {
        return Err(Error::config("chunk_size", "chunk size must be greater than zero"));
    }

    let mut source = File::open(path)?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE.min(chunk_size as usize)];
    let mut parts = Vec::new();
    let mut offset = 0u64;

    loop {
        let part_start = offset;
        let mut writer: Option<(PathBuf, File)> = None;
        let mut remaining = chunk_size;

        while remaining > 0 {
            let want = buffer.len().min(remaining as usize);
            let read = source.read(&mut buffer[..want])?;
            if read == 0 {
                break;
            }
            // Only create the part file once there is data for it
            if writer.is_none() {
                let part = part_path(path, parts.len() + 1);
                let file = File::create(&part)?;
                writer = Some((part, file));
            }
            if let Some((_, file)) = writer.as_mut() {
                file.write_all(&buffer[..read])?;
            }
            remaining -= read as u64;
            offset += read as u64;
        }

        let Some((part, mut file)) = writer else {
            break;
        };
        file.flush()?;

        debug!(
            ?part,
            index = parts.len() + 1,
            bytes = offset - part_start,
            "wrote file part"
        );

        parts.push(FilePart {
            source: path.to_path_buf(),
            path: part,
            index: parts.len() + 1,
            range: part_start..offset,
        });

        if remaining > 0 {
            // Short part: end of file reached
            break;
        }
    }

    Ok(parts)
}

/// Number of parts `split` produces for a file of `size` bytes
#[must_use]
pub fn part_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}
