//! Photo gallery retrieval with the external `gallery-dl` binary

use super::process::run_to_end;
use super::{GalleryExtractor, locate_tool, push_options};
use crate::config::{CookieSource, FetchConfig};
use crate::error::{FetchError, Result};
use crate::types::{DownloadRequest, Gallery};
use crate::utils::url_hash;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::{info, warn};
use walkdir::WalkDir;

const GALLERY_DL: &str = "gallery-dl";

/// Extensions the chat platform accepts as photos
const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Per-gallery scratch directory: `<destination>/<sha256(url)>`
#[must_use]
pub fn gallery_dir(destination: &Path, url: &str) -> PathBuf {
    destination.join(url_hash(url))
}

/// Gallery extractor backed by the `gallery-dl` executable
pub struct GalleryDl {
    binary_path: PathBuf,
    config: FetchConfig,
}

impl GalleryDl {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf, config: FetchConfig) -> Self {
        Self {
            binary_path,
            config,
        }
    }

    /// Create an extractor using the configured path or `PATH` lookup
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let binary_path = locate_tool(config.gallery_dl_path.as_deref(), GALLERY_DL)?;
        Ok(Self::new(binary_path, config.clone()))
    }

    pub(crate) fn command(&self, request: &DownloadRequest, dir: &Path) -> Command {
        let mut command = Command::new(&self.binary_path);
        command.arg("--directory").arg(dir);
        if let Some(proxy) = &self.config.proxy_url {
            command.arg("--proxy").arg(proxy);
        }
        match &self.config.cookies {
            Some(CookieSource::File(path)) => {
                command.arg("--cookies").arg(path);
            }
            Some(CookieSource::Browser(profile)) => {
                command.arg("--cookies-from-browser").arg(profile);
            }
            None => {}
        }
        push_options(&mut command, &request.options);
        command.arg("--").arg(&request.url);
        command
    }
}

/// Image files under `dir`, sorted by path
pub(crate) fn collect_photos(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut photos = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_photo(entry.path()) {
            photos.push(entry.into_path());
        }
    }
    Ok(photos)
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            PHOTO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

#[async_trait]
impl GalleryExtractor for GalleryDl {
    async fn fetch_gallery(&self, request: DownloadRequest) -> Result<Gallery> {
        let dir = gallery_dir(&request.destination, &request.url);
        tokio::fs::create_dir_all(&dir).await?;

        info!(?dir, "starting gallery-dl download");

        let command = self.command(&request, &dir);
        // gallery-dl lists downloaded files on stdout
        let run = run_to_end(GALLERY_DL, command).await;

        let scan_dir = dir.clone();
        let photos = spawn_blocking(move || collect_photos(&scan_dir))
            .await
            .map_err(|e| FetchError::TaskFailed(e.to_string()))??;

        match run {
            Ok(()) => {}
            // Galleries with some unreachable items still exit non-zero
            Err(e) if !photos.is_empty() => {
                warn!(?dir, error = %e, count = photos.len(), "gallery-dl failed part way, delivering what arrived");
            }
            Err(e) => return Err(e),
        }

        info!(?dir, count = photos.len(), "gallery-dl download complete");
        Ok(Gallery { dir, photos })
    }
}

/// Stand-in for a missing `gallery-dl` installation
///
/// Every request fails with [`FetchError::ToolNotFound`], so photo requests
/// get an error reply while video requests keep working.
#[derive(Debug, Default)]
pub struct MissingGalleryDl;

#[async_trait]
impl GalleryExtractor for MissingGalleryDl {
    async fn fetch_gallery(&self, request: DownloadRequest) -> Result<Gallery> {
        warn!(url = %request.url, "photo request without gallery-dl installed");
        Err(FetchError::ToolNotFound {
            tool: GALLERY_DL.to_string(),
        }
        .into())
    }
}
