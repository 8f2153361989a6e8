//! Configuration types for tg-media-dl
//!
//! All settings are read once at startup (see [`Config::from_env`]) into an
//! immutable [`Config`] that is shared by every component through an `Arc`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// 45 MiB, kept under the Bot API's 50 MB upload ceiling
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 45 * 1024 * 1024;

/// Bot API connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot credential token
    pub token: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for a single HTTP request, uploads included (default: 30 minutes)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Long-polling timeout passed to `getUpdates` (default: 30 seconds)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: Duration,
}

impl TelegramConfig {
    /// Create settings for the given token with default endpoints and timeouts
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: default_api_url(),
            request_timeout: default_request_timeout(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

// The token grants full control of the bot
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Where the extractor reads cookies from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieSource {
    /// Netscape-format cookie file
    File(PathBuf),
    /// Browser profile specification, e.g. "firefox" or "chrome:Profile 1"
    Browser(String),
}

/// Media retrieval settings (cache directory, external tools, network)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Process-wide scratch directory (default: "cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Proxy URL handed to the extractors
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// URL fetched through the proxy to report the public IP
    #[serde(default = "default_ip_check_url")]
    pub ip_check_url: String,

    /// Cookie material for sites requiring authentication
    #[serde(default)]
    pub cookies: Option<CookieSource>,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to gallery-dl executable (auto-detected if None)
    #[serde(default)]
    pub gallery_dl_path: Option<PathBuf>,

    /// Format selector passed to yt-dlp (default: "best")
    #[serde(default = "default_format")]
    pub format: String,

    /// Additional yt-dlp options for video requests, passed as `--key value`
    #[serde(default)]
    pub extra_options: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            proxy_url: None,
            ip_check_url: default_ip_check_url(),
            cookies: None,
            ytdlp_path: None,
            gallery_dl_path: None,
            format: default_format(),
            extra_options: BTreeMap::new(),
        }
    }
}

/// Upload settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Largest file uploaded in one piece; also the part size (default: 45 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Maximum images per media group (default: 10)
    #[serde(default = "default_media_group_limit")]
    pub media_group_limit: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            media_group_limit: default_media_group_limit(),
        }
    }
}

/// Status message update settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum time between two edits of the status message (default: 1.5s)
    #[serde(default = "default_min_update_interval")]
    pub min_update_interval: Duration,

    /// Capacity of the per-request progress channel (default: 64)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_update_interval: default_min_update_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Main configuration for the bot
///
/// Grouped into sub-configs:
/// - [`telegram`](TelegramConfig): credential and Bot API endpoint
/// - [`fetch`](FetchConfig): cache directory, extractors, proxy, cookies
/// - [`delivery`](DeliveryConfig): upload ceiling and media group size
/// - [`progress`](ProgressConfig): status message throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Bot API settings
    pub telegram: TelegramConfig,

    /// Media retrieval settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Upload settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Progress reporting settings
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Create a configuration with defaults for everything except the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            telegram: TelegramConfig::new(token),
            fetch: FetchConfig::default(),
            delivery: DeliveryConfig::default(),
            progress: ProgressConfig::default(),
        }
    }

    /// Read configuration from the process environment
    ///
    /// `.env` loading is left to the caller (the binary calls
    /// `dotenvy::dotenv()` before this).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset. Recognized keys: `TELEGRAM_TOKEN`
    /// (required), `TELEGRAM_API_URL`, `REQUEST_TIMEOUT_SECS`, `CACHE_DIR`,
    /// `PROXY_URL`, `GET_IP_URL`, `COOKIES_FILE`, `COOKIES_FROM_BROWSER`,
    /// `YTDLP_PATH`, `GALLERY_DL_PATH`, `MAX_UPLOAD_BYTES`,
    /// `PROGRESS_INTERVAL_MS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("TELEGRAM_TOKEN").ok_or_else(|| {
            Error::config(
                "TELEGRAM_TOKEN",
                "TELEGRAM_TOKEN is not set. Please check your environment or .env file.",
            )
        })?;

        let mut config = Config::new(token);

        if let Some(url) = get("TELEGRAM_API_URL") {
            config.telegram.api_url = url;
        }
        if let Some(secs) = get("REQUEST_TIMEOUT_SECS") {
            config.telegram.request_timeout =
                Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &secs)?);
        }

        if let Some(dir) = get("CACHE_DIR") {
            config.fetch.cache_dir = PathBuf::from(dir);
        }
        config.fetch.proxy_url = get("PROXY_URL");
        if let Some(url) = get("GET_IP_URL") {
            config.fetch.ip_check_url = url;
        }
        // An explicit cookie file takes precedence over browser extraction
        config.fetch.cookies = match (get("COOKIES_FILE"), get("COOKIES_FROM_BROWSER")) {
            (Some(file), _) => Some(CookieSource::File(PathBuf::from(file))),
            (None, Some(browser)) => Some(CookieSource::Browser(browser)),
            (None, None) => None,
        };
        config.fetch.ytdlp_path = get("YTDLP_PATH").map(PathBuf::from);
        config.fetch.gallery_dl_path = get("GALLERY_DL_PATH").map(PathBuf::from);

        if let Some(bytes) = get("MAX_UPLOAD_BYTES") {
            config.delivery.max_upload_bytes = parse_number("MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Some(ms) = get("PROGRESS_INTERVAL_MS") {
            config.progress.min_update_interval =
                Duration::from_millis(parse_number("PROGRESS_INTERVAL_MS", &ms)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.is_empty() {
            return Err(Error::config("TELEGRAM_TOKEN", "bot token must not be empty"));
        }
        if self.delivery.max_upload_bytes == 0 {
            return Err(Error::config(
                "MAX_UPLOAD_BYTES",
                "maximum upload size must be greater than zero",
            ));
        }
        if self.delivery.media_group_limit == 0 || self.delivery.media_group_limit > 10 {
            return Err(Error::config(
                "media_group_limit",
                "media groups hold between 1 and 10 items",
            ));
        }
        check_url("TELEGRAM_API_URL", &self.telegram.api_url)?;
        check_url("GET_IP_URL", &self.fetch.ip_check_url)?;
        if let Some(proxy) = &self.fetch.proxy_url {
            check_url("PROXY_URL", proxy)?;
        }
        if self.progress.channel_capacity == 0 {
            return Err(Error::config(
                "channel_capacity",
                "progress channel capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn check_url(key: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::config(key, format!("expected a non-negative integer, got {value:?}")))
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_ip_check_url() -> String {
    "https://wtfismyip.com/text".to_string()
}

fn default_format() -> String {
    "best".to_string()
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_media_group_limit() -> usize {
    10
}

fn default_min_update_interval() -> Duration {
    Duration::from_millis(1500)
}

fn default_channel_capacity() -> usize {
    64
}
