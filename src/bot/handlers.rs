//! Per-command request handlers
//!
//! Each handler runs one request end to end and reports every failure as a
//! chat message. Nothing here is retried.

use super::MediaBot;
use crate::delivery::{self, deliver, deliver_gallery, discard_gallery};
use crate::error::Error;
use crate::progress::{INITIAL_TEXT, ProgressReporter, StatusMessage};
use crate::telegram::{ChatId, MessageId, PhotoSize};
use crate::types::{DeliveryOutcome, DownloadRequest, ProgressSender, RequestState};
use crate::utils::url_hash;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reply to `/start` and `/help`
pub const WELCOME_TEXT: &str = "Welcome! Send me a message or a video link.";

/// Posted once a video is on disk
pub const UPLOAD_START_TEXT: &str = "Uploading video, please wait...";

/// Upload status after a whole-file upload
pub const UPLOAD_DONE_TEXT: &str = "Upload complete.";

/// Upload status after a multi-part upload
pub const UPLOAD_PARTS_DONE_TEXT: &str = "Upload complete in parts.";

/// Posted when a gallery request starts
pub const GALLERY_START_TEXT: &str = "Downloading photos...";

/// Reply for a gallery that yielded no images
pub const GALLERY_EMPTY_TEXT: &str = "No photos were found.";

impl MediaBot {
    /// Send `text`, logging on failure
    async fn reply(&self, chat: ChatId, text: &str) -> Option<MessageId> {
        match self.api.send_text(chat, text).await {
            Ok(message) => Some(message.message_id),
            Err(e) => {
                warn!(%chat, error = %e, "failed to send reply");
                None
            }
        }
    }

    /// Edit a status message if there is one, otherwise post `text`
    async fn update_status(&self, chat: ChatId, status: Option<MessageId>, text: &str) {
        let Some(message) = status else {
            self.reply(chat, text).await;
            return;
        };
        if let Err(e) = self.api.edit_text(chat, message, text).await {
            warn!(%chat, error = %e, "failed to edit status message");
        }
    }

    pub(super) async fn welcome(&self, chat: ChatId) {
        self.reply(chat, WELCOME_TEXT).await;
    }

    pub(super) async fn probe_ip(&self, chat: ChatId) {
        let text = match self.video.probe_ip().await {
            Ok(ip) => format!("Your IP address is: {ip}"),
            Err(e) => {
                warn!(error = %e, "IP probe failed");
                format!("Failed to retrieve IP: {e}")
            }
        };
        self.reply(chat, &text).await;
    }

    /// Fetch a video, relay progress, deliver it; returns the final state
    pub(super) async fn fetch_video(&self, chat: ChatId, url: String) -> RequestState {
        let hash = url_hash(&url);
        let mut state = RequestState::Idle;
        advance(&mut state, RequestState::Fetching, &hash);
        info!(%chat, url_hash = %hash, "video request");

        // Progress goes to a status message; without one the fetch still runs
        let (progress, reporter) = match self.reply(chat, INITIAL_TEXT).await {
            Some(message) => {
                let (tx, rx) = mpsc::channel(self.config.progress.channel_capacity.max(1));
                let sink = StatusMessage::new(self.api.clone(), chat, message);
                let reporter = ProgressReporter::new(sink, self.config.progress.min_update_interval);
                (Some(ProgressSender::new(tx)), Some(tokio::spawn(reporter.run(rx))))
            }
            None => (None, None),
        };

        let request = DownloadRequest::new(url, &self.config.fetch.cache_dir)
            .with_options(self.config.fetch.extra_options.clone());
        let fetched = self.video.fetch(request, progress).await;

        // The sender is gone with the fetch; wait for the last edit to land
        if let Some(reporter) = reporter
            && let Err(e) = reporter.await
        {
            warn!(url_hash = %hash, error = %e, "progress reporter task failed");
        }

        let result = match fetched {
            Ok(result) => result,
            Err(e) => {
                warn!(url_hash = %hash, error = %e, "video fetch failed");
                advance(&mut state, RequestState::FetchFailed, &hash);
                self.reply(chat, &format!("Failed to download video: {e}")).await;
                return state;
            }
        };
        advance(&mut state, RequestState::Fetched, &hash);

        let status = self.reply(chat, UPLOAD_START_TEXT).await;
        advance(&mut state, RequestState::Delivering, &hash);

        let uploader = self.uploader(chat);
        match deliver(&result.path, &uploader, self.config.delivery.max_upload_bytes).await {
            Ok(outcome) => {
                let text = match outcome {
                    DeliveryOutcome::Whole => UPLOAD_DONE_TEXT,
                    DeliveryOutcome::Parts(_) => UPLOAD_PARTS_DONE_TEXT,
                };
                advance(&mut state, RequestState::Delivered, &hash);
                self.update_status(chat, status, text).await;
            }
            Err(e) => {
                warn!(url_hash = %hash, error = %e, "video delivery failed");
                advance(&mut state, RequestState::DeliverFailed, &hash);
                self.reply(chat, &format!("Failed to send video: {e}")).await;
            }
        }
        state
    }

    pub(super) async fn fetch_gallery(&self, chat: ChatId, url: String) {
        info!(%chat, url_hash = %url_hash(&url), "gallery request");
        if url::Url::parse(&url).is_err() {
            let e = Error::InvalidUrl(url);
            self.reply(chat, &format!("Failed to download photos: {e}")).await;
            return;
        }
        self.reply(chat, GALLERY_START_TEXT).await;

        let request = DownloadRequest::new(url, &self.config.fetch.cache_dir);
        let gallery = match self.gallery.fetch_gallery(request).await {
            Ok(gallery) => gallery,
            Err(e) => {
                warn!(error = %e, "gallery fetch failed");
                self.reply(chat, &format!("Failed to download photos: {e}")).await;
                return;
            }
        };

        if gallery.photos.is_empty() {
            discard_gallery(&gallery.dir);
            self.reply(chat, GALLERY_EMPTY_TEXT).await;
            return;
        }

        let uploader = self.uploader(chat);
        match deliver_gallery(&gallery, &uploader, self.config.delivery.media_group_limit).await {
            Ok(outcome) if outcome.delivered == 0 => {
                self.reply(
                    chat,
                    &format!(
                        "Failed to send photos: all {} photo(s) were rejected",
                        outcome.failed
                    ),
                )
                .await;
            }
            Ok(outcome) if outcome.failed > 0 => {
                warn!(?outcome, "gallery partly delivered");
                self.reply(
                    chat,
                    &format!(
                        "Failed to send {} of {} photos.",
                        outcome.failed,
                        outcome.delivered + outcome.failed
                    ),
                )
                .await;
            }
            Ok(outcome) => {
                debug!(?outcome, "gallery delivered");
            }
            Err(e) => {
                warn!(error = %e, "gallery delivery failed");
                self.reply(chat, &format!("Failed to send photos: {e}")).await;
            }
        }
    }

    /// Send a photo the user posted straight back
    pub(super) async fn echo_photo(&self, chat: ChatId, photo: &PhotoSize) {
        let cache_dir = &self.config.fetch.cache_dir;
        if let Err(e) = tokio::fs::create_dir_all(cache_dir).await {
            warn!(error = %e, "cannot create cache directory");
            let e = Error::from(e);
            self.reply(chat, &format!("Failed to send photo: {e}")).await;
            return;
        }
        let dest = cache_dir.join(format!("{}.jpg", photo.file_unique_id));

        let sent = match self.api.download_file(&photo.file_id, &dest).await {
            Ok(bytes) => {
                debug!(%chat, bytes, "echoing photo");
                self.api.send_photo(chat, &dest, None).await
            }
            Err(e) => Err(e),
        };
        delivery::discard_file(&dest);
        if let Err(e) = sent {
            warn!(%chat, error = %e, "photo echo failed");
            self.reply(chat, &format!("Failed to send photo: {e}")).await;
        }
    }
}

fn advance(state: &mut RequestState, next: RequestState, url_hash: &str) {
    match state.advance(next) {
        Some(new_state) => {
            debug!(%url_hash, from = %state, to = %new_state, "request state");
            *state = new_state;
        }
        None => warn!(%url_hash, from = %state, to = %next, "illegal request transition"),
    }
}
