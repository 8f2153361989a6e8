//! Telegram Bot API client over `reqwest`

use super::types::{ApiResponse, ChatId, InputMediaPhoto, Message, MessageId, TelegramFile, Update};
use super::ChatApi;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Upper bound on photos per `sendMediaGroup` call
const MEDIA_GROUP_MAX: usize = 10;

/// Bot API client
///
/// Method URLs embed the token. Transport errors are stripped of their URL
/// before they leave the client, so neither logs nor replies can carry it.
#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl BotApi {
    /// Build a client from configuration
    ///
    /// The request timeout covers whole uploads, so it is configured generously.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        debug!(method, "calling Bot API");
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        unwrap_response(response.json().await.map_err(network)?)
    }

    async fn call_multipart<T: DeserializeOwned>(&self, method: &str, form: Form) -> Result<T> {
        debug!(method, "calling Bot API with upload");
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(network)?;
        unwrap_response(response.json().await.map_err(network)?)
    }

    /// Look up the download path of a file
    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.call_json("getFile", json!({ "file_id": file_id })).await
    }

    async fn upload_single(
        &self,
        method: &str,
        field: &str,
        chat: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<()> {
        let mut form = Form::new()
            .text("chat_id", chat.to_string())
            .part(field.to_string(), file_part(path).await?);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let _: Message = self.call_multipart(method, form).await?;
        Ok(())
    }
}

/// Drop the request URL, which holds the token, from a transport error
fn network(e: reqwest::Error) -> Error {
    Error::Network(e.without_url())
}

/// Read a file into a multipart part named after the file
async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

/// Turn a Bot API envelope into a result
fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            error_code,
            description,
            ..
        } => Err(Error::Telegram {
            code: error_code.unwrap_or(0),
            description: description.unwrap_or_else(|| "request failed without description".into()),
        }),
    }
}

#[async_trait]
impl ChatApi for BotApi {
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call_json("getUpdates", body).await
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<Message> {
        self.call_json("sendMessage", json!({ "chat_id": chat, "text": text }))
            .await
    }

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result<()> {
        let result: Result<serde_json::Value> = self
            .call_json(
                "editMessageText",
                json!({ "chat_id": chat, "message_id": message, "text": text }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // Editing to identical text is rejected; the message already shows it
            Err(Error::Telegram { description, .. })
                if description.contains("message is not modified") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn send_video(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()> {
        self.upload_single("sendVideo", "video", chat, path, caption)
            .await
    }

    async fn send_photo(&self, chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()> {
        self.upload_single("sendPhoto", "photo", chat, path, caption)
            .await
    }

    async fn send_media_group(&self, chat: ChatId, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() || paths.len() > MEDIA_GROUP_MAX {
            return Err(Error::Other(format!(
                "media group must hold 1 to {MEDIA_GROUP_MAX} items, got {}",
                paths.len()
            )));
        }

        let mut media = Vec::with_capacity(paths.len());
        let mut form = Form::new().text("chat_id", chat.to_string());
        for (i, path) in paths.iter().enumerate() {
            let field = format!("photo{i}");
            media.push(InputMediaPhoto::attached(&field));
            form = form.part(field, file_part(path).await?);
        }
        form = form.text("media", serde_json::to_string(&media)?);

        let _: Vec<Message> = self.call_multipart("sendMediaGroup", form).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let file = self.get_file(file_id).await?;
        let file_path = file.file_path.ok_or_else(|| {
            Error::Other(format!("file {file_id} has no download path"))
        })?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?;
        let bytes = response.bytes().await.map_err(network)?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
