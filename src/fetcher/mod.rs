//! Media retrieval through external extractors
//!
//! - [`ytdlp`] - videos (and the proxy IP probe) via `yt-dlp`
//! - [`gallery`] - photo galleries via `gallery-dl`
//! - [`parser`] - yt-dlp progress/result line parsing
//! - [`resolve`] - locating the file an extractor actually wrote
//!
//! The extractors are external programs run as Tokio child processes; their
//! output is read asynchronously and progress goes out through a
//! [`ProgressSender`].

pub mod gallery;
pub mod parser;
mod process;
pub mod resolve;
pub mod ytdlp;

pub use gallery::{GalleryDl, MissingGalleryDl, gallery_dir};
pub use resolve::resolve_output;
pub use ytdlp::YtDlp;

use crate::error::{FetchError, Result};
use crate::types::{DownloadRequest, DownloadResult, Gallery, ProgressSender};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Retrieves single media files
///
/// # Examples
///
/// ```no_run
/// use tg_media_dl::config::FetchConfig;
/// use tg_media_dl::fetcher::{MediaExtractor, YtDlp};
/// use tg_media_dl::types::DownloadRequest;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = YtDlp::from_config(&FetchConfig::default())?;
/// let request = DownloadRequest::new("https://example.com/video", "cache");
/// let result = extractor.fetch(request, None).await?;
/// println!("{} bytes at {}", result.size_bytes, result.path.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Download `request.url` into `request.destination`
    ///
    /// The returned path exists. Progress, if requested, is emitted in order
    /// and ends with at most one `Finished`.
    async fn fetch(
        &self,
        request: DownloadRequest,
        progress: Option<ProgressSender>,
    ) -> Result<DownloadResult>;

    /// Fetch the IP-echo URL through the configured proxy and return the body
    async fn probe_ip(&self) -> Result<String>;
}

/// Retrieves image galleries
#[async_trait]
pub trait GalleryExtractor: Send + Sync {
    /// Download all images behind `request.url` into a per-URL directory
    ///
    /// An empty gallery is returned as such, not as an error.
    async fn fetch_gallery(&self, request: DownloadRequest) -> Result<Gallery>;
}

/// Find an extractor binary: explicit path first, then `PATH`
pub fn locate_tool(explicit: Option<&Path>, name: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(_) => Err(FetchError::ToolNotFound {
            tool: name.to_string(),
        }
        .into()),
        None => which::which(name).map_err(|_| {
            FetchError::ToolNotFound {
                tool: name.to_string(),
            }
            .into()
        }),
    }
}

/// Append `--key value` pairs; keys already starting with `-` are kept as is
pub(crate) fn push_options<'a>(
    command: &mut tokio::process::Command,
    options: impl IntoIterator<Item = (&'a String, &'a String)>,
) {
    for (key, value) in options {
        if key.starts_with('-') {
            command.arg(key);
        } else {
            command.arg(format!("--{key}"));
        }
        if !value.is_empty() {
            command.arg(value);
        }
    }
}
