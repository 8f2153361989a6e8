//! The chat front end: routing, request handlers and the polling loop
//!
//! A [`MediaBot`] owns shared handles to the chat API and the extractors.
//! Every inbound update is handled on its own task; handlers never return
//! errors, they turn them into chat replies.

mod dispatch;
mod handlers;
mod polling;

#[cfg(test)]
mod tests;

pub use dispatch::{Command, extract_url, route, route_text};
pub use handlers::{
    GALLERY_EMPTY_TEXT, GALLERY_START_TEXT, UPLOAD_DONE_TEXT,
    UPLOAD_PARTS_DONE_TEXT, UPLOAD_START_TEXT, WELCOME_TEXT,
};
pub use polling::run_polling;

use crate::config::Config;
use crate::delivery::{MediaUploader, PhotoUploader};
use crate::error::Result;
use crate::fetcher::{GalleryExtractor, MediaExtractor};
use crate::telegram::{ChatApi, ChatId, Update};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Shared state for all request handlers
#[derive(Clone)]
pub struct MediaBot {
    config: Arc<Config>,
    api: Arc<dyn ChatApi>,
    video: Arc<dyn MediaExtractor>,
    gallery: Arc<dyn GalleryExtractor>,
}

impl MediaBot {
    /// Assemble a bot from its collaborators
    pub fn new(
        config: Arc<Config>,
        api: Arc<dyn ChatApi>,
        video: Arc<dyn MediaExtractor>,
        gallery: Arc<dyn GalleryExtractor>,
    ) -> Self {
        Self {
            config,
            api,
            video,
            gallery,
        }
    }

    /// The configuration the bot was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The chat API handle
    pub fn api(&self) -> &Arc<dyn ChatApi> {
        &self.api
    }

    /// Handle one inbound update to completion
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "ignoring update without a message");
            return;
        };
        let chat = message.chat.id;

        match route(&message) {
            Command::Welcome => self.welcome(chat).await,
            Command::ProbeIp => self.probe_ip(chat).await,
            Command::Gallery(url) => {
                self.fetch_gallery(chat, url).await;
            }
            Command::Video(url) => {
                self.fetch_video(chat, url).await;
            }
            Command::EchoPhoto(photo) => self.echo_photo(chat, &photo).await,
            Command::Ignore => {}
        }
    }

    fn uploader(&self, chat: ChatId) -> ChatUploader {
        ChatUploader {
            api: Arc::clone(&self.api),
            chat,
        }
    }
}

/// Uploads into one chat
pub struct ChatUploader {
    api: Arc<dyn ChatApi>,
    chat: ChatId,
}

#[async_trait]
impl MediaUploader for ChatUploader {
    async fn upload(&self, path: &Path, caption: Option<&str>) -> Result<()> {
        self.api.send_video(self.chat, path, caption).await
    }
}

#[async_trait]
impl PhotoUploader for ChatUploader {
    async fn upload_group(&self, paths: &[PathBuf]) -> Result<()> {
        self.api.send_media_group(self.chat, paths).await
    }

    async fn upload_one(&self, path: &Path) -> Result<()> {
        self.api.send_photo(self.chat, path, None).await
    }
}
