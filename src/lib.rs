//! # tg-media-dl
//!
//! A chat bot that turns links into media. Send it a video link and it
//! downloads the video with `yt-dlp`, relays download progress by editing a
//! status message, and uploads the result; files over the upload ceiling are
//! split into numbered parts. `photo <url>` fetches an image gallery with
//! `gallery-dl` and sends it as albums.
//!
//! ## Layout
//!
//! - [`fetcher`] runs the external extractors as child processes
//! - [`progress`] throttles progress events into status message edits
//! - [`chunker`] splits oversized files into `<file>.part<N>` pieces
//! - [`delivery`] uploads whole files, parts and galleries, and cleans up
//! - [`telegram`] is the chat platform client
//! - [`bot`] routes messages and runs the long-polling loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tg_media_dl::{Config, MediaBot, run_with_shutdown};
//! use tg_media_dl::fetcher::{GalleryDl, YtDlp};
//! use tg_media_dl::telegram::BotApi;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let api = BotApi::new(&config.telegram)?;
//!     let video = YtDlp::from_config(&config.fetch)?;
//!     let gallery = GalleryDl::from_config(&config.fetch)?;
//!
//!     let bot = MediaBot::new(
//!         Arc::new(config),
//!         Arc::new(api),
//!         Arc::new(video),
//!         Arc::new(gallery),
//!     );
//!     run_with_shutdown(bot).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Message routing, handlers and the polling loop
pub mod bot;
/// Splitting files into upload-sized parts
pub mod chunker;
/// Configuration types
pub mod config;
/// Upload of fetched media and scratch cleanup
pub mod delivery;
/// Error types
pub mod error;
/// External media extractors
pub mod fetcher;
/// Progress relay to a status message
pub mod progress;
/// Telegram Bot API client
pub mod telegram;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

pub use bot::{MediaBot, run_polling};
pub use config::{Config, CookieSource};
pub use error::{DeliveryError, Error, FetchError, Result};
pub use types::{
    DeliveryOutcome, DownloadRequest, DownloadResult, FilePart, Gallery, GalleryOutcome,
    ProgressEvent, ProgressSender, RequestState,
};

use tokio_util::sync::CancellationToken;

/// Run the bot until a termination signal arrives
///
/// Stops polling on the signal, then waits for requests already in flight.
/// Returns the number of updates dispatched.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(bot: MediaBot) -> usize {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    run_polling(bot, shutdown).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
