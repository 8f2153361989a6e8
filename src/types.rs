//! Core types for tg-media-dl

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// A request to retrieve one remote resource into a local directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Directory the extractor writes into
    pub destination: PathBuf,
    /// Opaque extractor options, passed through as `--key value`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl DownloadRequest {
    /// Create a request without extra options
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            options: BTreeMap::new(),
        }
    }

    /// Attach extractor options
    pub fn with_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.options = options;
        self
    }
}

/// The file produced by a successful fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// Resolved local file path (exists when returned)
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Images retrieved for one gallery URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gallery {
    /// Per-gallery scratch directory (`<cache>/<url hash>`)
    pub dir: PathBuf,
    /// Image files in delivery order
    pub photos: Vec<PathBuf>,
}

/// Progress notification emitted by a running fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Bytes received so far
    Downloading {
        /// Bytes written to disk so far
        downloaded_bytes: u64,
        /// Expected size, if the source announced one
        total_bytes: Option<u64>,
    },
    /// Retrieval finished; post-processing or upload follows
    Finished,
}

/// Producer half of a per-request progress channel
///
/// Enforces the event ordering contract before anything reaches the
/// channel: `downloaded_bytes` never regresses and nothing follows
/// `Finished`.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
    last_downloaded: u64,
    finished: bool,
}

impl ProgressSender {
    /// Wrap the sending half of a bounded channel
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            last_downloaded: 0,
            finished: false,
        }
    }

    /// Forward an event if it keeps the sequence well-formed
    ///
    /// `Downloading` events are dropped when the channel is full. `Finished`
    /// waits for room. Returns whether the event was queued.
    pub async fn send(&mut self, event: ProgressEvent) -> bool {
        if self.finished {
            return false;
        }
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes, ..
            } => {
                if downloaded_bytes < self.last_downloaded {
                    return false;
                }
                self.last_downloaded = downloaded_bytes;
                self.tx.try_send(event).is_ok()
            }
            ProgressEvent::Finished => {
                self.finished = true;
                self.tx.send(event).await.is_ok()
            }
        }
    }
}

/// One contiguous slice of a larger file, written next to it for upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    /// File the part was cut from
    pub source: PathBuf,
    /// Location of the part on disk (`<source>.part<index>`)
    pub path: PathBuf,
    /// 1-based position in the delivery order
    pub index: usize,
    /// Byte range of `source` covered by this part
    pub range: Range<u64>,
}

impl FilePart {
    /// Number of bytes in this part
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Whether the part covers no bytes (never produced by the chunker)
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// How a fetched file was delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Uploaded in one piece
    Whole,
    /// Uploaded as this many parts
    Parts(usize),
}

/// Summary of a gallery delivery
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GalleryOutcome {
    /// Images that reached the chat
    pub delivered: usize,
    /// Images that could not be sent, even one by one
    pub failed: usize,
    /// Batches that had to fall back to one-by-one delivery
    pub fallbacks: usize,
}

/// Lifecycle of one media request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted, nothing started
    Idle,
    /// Extractor running
    Fetching,
    /// Extractor failed (terminal)
    FetchFailed,
    /// File on disk, upload not started
    Fetched,
    /// Upload in progress
    Delivering,
    /// Upload failed (terminal)
    DeliverFailed,
    /// All uploads done (terminal)
    Delivered,
}

impl RequestState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::FetchFailed | RequestState::DeliverFailed | RequestState::Delivered
        )
    }

    /// Move to `next` if the transition is allowed
    ///
    /// Returns the new state, or `None` for an illegal transition. There are
    /// no retries: terminal states have no successors.
    pub fn advance(self, next: RequestState) -> Option<RequestState> {
        use RequestState::*;
        let allowed = matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, FetchFailed)
                | (Fetching, Fetched)
                | (Fetched, Delivering)
                | (Delivering, DeliverFailed)
                | (Delivering, Delivered)
        );
        allowed.then_some(next)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RequestState::Idle => "idle",
            RequestState::Fetching => "fetching",
            RequestState::FetchFailed => "fetch_failed",
            RequestState::Fetched => "fetched",
            RequestState::Delivering => "delivering",
            RequestState::DeliverFailed => "deliver_failed",
            RequestState::Delivered => "delivered",
        };
        f.write_str(name)
    }
}
