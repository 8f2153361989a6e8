//! Bot API wire types (the subset the bot reads)

use serde::{Deserialize, Serialize};

/// Chat identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier, unique within a chat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope every Bot API method returns
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub ok: bool,
    /// Payload on success
    pub result: Option<T>,
    /// Error description on failure
    pub description: Option<String>,
    /// Error code on failure
    pub error_code: Option<i64>,
}

/// An incoming update
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Update {
    /// Monotonic update identifier, used as the polling offset
    pub update_id: i64,
    /// New incoming message, if this update carries one
    #[serde(default)]
    pub message: Option<Message>,
}

/// A chat
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Chat {
    /// Chat identifier
    pub id: ChatId,
}

/// A message
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Message {
    /// Message identifier
    pub message_id: MessageId,
    /// Chat the message belongs to
    pub chat: Chat,
    /// Text content for text messages
    #[serde(default)]
    pub text: Option<String>,
    /// Available sizes of an attached photo, smallest first
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

/// One size of a photo
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PhotoSize {
    /// Identifier used to download the file
    pub file_id: String,
    /// Identifier stable across bots, safe for file names
    pub file_unique_id: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Size in bytes, if known
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// File metadata returned by `getFile`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TelegramFile {
    /// File identifier
    pub file_id: String,
    /// Path to download the file from, relative to the file endpoint
    #[serde(default)]
    pub file_path: Option<String>,
    /// Size in bytes, if known
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// An element of a media group
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InputMediaPhoto {
    /// Always "photo"
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `attach://<name>` reference to a multipart field
    pub media: String,
}

impl InputMediaPhoto {
    /// Reference the multipart field `name`
    pub fn attached(name: &str) -> Self {
        Self {
            kind: "photo",
            media: format!("attach://{name}"),
        }
    }
}

impl Message {
    /// The largest attached photo size, if any
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_deref()?
            .iter()
            .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size))
    }
}
