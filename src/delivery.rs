//! Upload of fetched artifacts and cleanup of the scratch files
//!
//! A file no larger than the upload ceiling goes out whole; a larger one is
//! cut by the [`chunker`](crate::chunker) and sent part by part with a
//! `Part i of N` caption, each part deleted as soon as it is delivered.
//! Galleries go out in media groups, falling back to single photos when the
//! chat platform rejects a group.
//!
//! This module owns cleanup: fetched files, parts and gallery directories
//! are deleted here and nowhere else.

use crate::chunker::{self, part_path};
use crate::error::{DeliveryError, Error, Result};
use crate::types::{DeliveryOutcome, FilePart, Gallery, GalleryOutcome};
use crate::utils::{remove_scratch_dir, remove_scratch_file};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Uploads one media file
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Send `path` with an optional caption
    async fn upload(&self, path: &Path, caption: Option<&str>) -> Result<()>;
}

/// Uploads images, singly or as a group
#[async_trait]
pub trait PhotoUploader: Send + Sync {
    /// Send up to one media group's worth of images together
    async fn upload_group(&self, paths: &[PathBuf]) -> Result<()>;

    /// Send a single image
    async fn upload_one(&self, path: &Path) -> Result<()>;
}

/// Caption for the `index`-th of `total` parts
#[must_use]
pub fn part_caption(index: usize, total: usize) -> String {
    format!("Part {index} of {total}")
}

/// Upload `path` whole or in parts, then delete it
///
/// # Errors
///
/// [`DeliveryError::UploadFailed`] or [`DeliveryError::PartUploadFailed`]
/// when an upload is rejected; I/O errors if the file cannot be inspected or
/// split. Scratch files are removed in every case.
pub async fn deliver(
    path: &Path,
    uploader: &dyn MediaUploader,
    max_whole_upload_bytes: u64,
) -> Result<DeliveryOutcome> {
    let size = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            remove_scratch_file(path);
            return Err(e.into());
        }
    };

    if size <= max_whole_upload_bytes {
        return deliver_whole(path, uploader).await;
    }

    info!(?path, size, max_whole_upload_bytes, "file exceeds upload ceiling, splitting");

    let source = path.to_path_buf();
    let split = tokio::task::spawn_blocking(move || chunker::split(&source, max_whole_upload_bytes))
        .await
        .map_err(|e| Error::Other(format!("split task failed: {e}")));
    let parts = match split {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) | Err(e) => {
            discard_stray_parts(path);
            remove_scratch_file(path);
            return Err(e);
        }
    };

    if parts.is_empty() {
        return deliver_whole(path, uploader).await;
    }

    deliver_parts(path, &parts, uploader).await
}

async fn deliver_whole(path: &Path, uploader: &dyn MediaUploader) -> Result<DeliveryOutcome> {
    let result = uploader.upload(path, None).await;
    remove_scratch_file(path);
    match result {
        Ok(()) => {
            info!(?path, "delivered file whole");
            Ok(DeliveryOutcome::Whole)
        }
        Err(e) => Err(DeliveryError::UploadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()),
    }
}

async fn deliver_parts(
    source: &Path,
    parts: &[FilePart],
    uploader: &dyn MediaUploader,
) -> Result<DeliveryOutcome> {
    let total = parts.len();
    for (position, part) in parts.iter().enumerate() {
        let caption = part_caption(part.index, total);
        debug!(part = ?part.path, index = part.index, total, "uploading part");

        if let Err(e) = uploader.upload(&part.path, Some(&caption)).await {
            warn!(
                index = part.index,
                total,
                delivered = position,
                error = %e,
                "part upload failed, abandoning remaining parts"
            );
            for remaining in &parts[position..] {
                remove_scratch_file(&remaining.path);
            }
            remove_scratch_file(source);
            return Err(DeliveryError::PartUploadFailed {
                index: part.index,
                total,
                delivered: position,
                reason: e.to_string(),
            }
            .into());
        }

        remove_scratch_file(&part.path);
    }

    remove_scratch_file(source);
    info!(path = ?source, parts = total, "delivered file in parts");
    Ok(DeliveryOutcome::Parts(total))
}

/// Remove `<path>.part1`, `<path>.part2`, ... left by an interrupted split
fn discard_stray_parts(path: &Path) {
    let mut index = 1;
    loop {
        let part = part_path(path, index);
        if !part.exists() {
            break;
        }
        remove_scratch_file(&part);
        index += 1;
    }
}

/// Drop a fetched file that will not be delivered
pub fn discard_file(path: &Path) {
    remove_scratch_file(path);
}

/// Drop a gallery directory that will not be delivered
pub fn discard_gallery(dir: &Path) {
    remove_scratch_dir(dir);
}

/// Upload a gallery in batches of `group_limit`, then delete its directory
///
/// A batch the platform rejects as a payload (see
/// [`Error::is_payload_rejection`]) is retried one image at a time; images
/// that still fail are counted in [`GalleryOutcome::failed`]. Any other batch
/// error stops delivery.
pub async fn deliver_gallery(
    gallery: &Gallery,
    uploader: &dyn PhotoUploader,
    group_limit: usize,
) -> Result<GalleryOutcome> {
    let result = upload_batches(&gallery.photos, uploader, group_limit.max(1)).await;
    remove_scratch_dir(&gallery.dir);
    result
}

async fn upload_batches(
    photos: &[PathBuf],
    uploader: &dyn PhotoUploader,
    group_limit: usize,
) -> Result<GalleryOutcome> {
    let mut outcome = GalleryOutcome::default();

    for batch in photos.chunks(group_limit) {
        let sent = if let [single] = batch {
            uploader.upload_one(single).await
        } else {
            uploader.upload_group(batch).await
        };

        match sent {
            Ok(()) => outcome.delivered += batch.len(),
            Err(e) if e.is_payload_rejection() => {
                warn!(error = %e, size = batch.len(), "batch rejected, sending photos one by one");
                outcome.fallbacks += 1;
                for photo in batch {
                    match uploader.upload_one(photo).await {
                        Ok(()) => outcome.delivered += 1,
                        Err(e) => {
                            warn!(?photo, error = %e, "photo upload failed");
                            outcome.failed += 1;
                        }
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        delivered = outcome.delivered,
        failed = outcome.failed,
        fallbacks = outcome.fallbacks,
        "gallery delivery finished"
    );
    Ok(outcome)
}
