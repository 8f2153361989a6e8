//! Chat platform surface
//!
//! The bot depends on a handful of outward capabilities (send and edit text,
//! upload video, photo and media groups, download an incoming file) and on
//! long polling for inbound updates. [`ChatApi`] is that seam; [`BotApi`]
//! implements it over the Telegram Bot HTTP API.

mod client;
mod types;

pub use client::BotApi;
pub use types::{
    ApiResponse, Chat, ChatId, InputMediaPhoto, Message, MessageId, PhotoSize, TelegramFile,
    Update,
};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outward chat capabilities the bot depends on
///
/// Implementations must be cheap to share across request tasks.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Long-poll for updates with `update_id >= offset`
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>>;

    /// Send a plain text message, returning it (for later edits)
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<Message>;

    /// Replace the text of a message the bot sent earlier
    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()>;

    /// Upload a video file with an optional caption
    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()>;

    /// Upload a photo file with an optional caption
    async fn send_photo(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()>;

    /// Upload up to ten photos as one album
    async fn send_media_group(&self, chat: ChatId, paths: &[PathBuf]) -> Result<()>;

    /// Download a file a user sent to `dest`, returning the byte count
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64>;
}
