//! Error types for tg-media-dl
//!
//! This module provides the error taxonomy for the bot:
//! - Configuration errors (fatal at startup)
//! - Fetch errors (external extractor failures, unresolved output files)
//! - Delivery errors (rejected uploads, failed parts)
//! - Chat API rejections with the platform's error code and description
//!
//! Every per-request error is converted into a user-visible message at the
//! request-handling boundary; none of these terminate the dispatcher.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tg-media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tg-media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "TELEGRAM_TOKEN")
        key: Option<String>,
    },

    /// Media retrieval failed
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// Upload of a fetched artifact failed
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// The chat platform rejected a request
    #[error("Telegram API error {code}: {description}")]
    Telegram {
        /// Error code reported by the Bot API (HTTP-like, e.g. 400, 413)
        code: i64,
        /// Description reported by the Bot API
        description: String,
    },

    /// Text did not contain a usable URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while retrieving media with an external extractor
#[derive(Debug, Error)]
pub enum FetchError {
    /// The extractor binary could not be located
    #[error("{tool} not found: set its path explicitly or install it in PATH")]
    ToolNotFound {
        /// Name of the missing tool (e.g., "yt-dlp")
        tool: String,
    },

    /// The extractor exited unsuccessfully
    #[error("{tool} exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    ExtractorFailed {
        /// Name of the tool that failed
        tool: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Trailing part of the tool's standard error
        stderr: String,
    },

    /// The extractor succeeded but no output file could be located
    #[error("result file not found for {url_hash} in {}", dir.display())]
    ResultFileNotFound {
        /// Content hash the output file was expected to start with
        url_hash: String,
        /// Directory that was searched
        dir: PathBuf,
    },

    /// A blocking helper task (such as the gallery directory scan) panicked or was cancelled
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

/// Errors raised while uploading fetched artifacts back to the chat
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A whole-file upload failed
    #[error("upload of {} failed: {reason}", path.display())]
    UploadFailed {
        /// File that was being uploaded
        path: PathBuf,
        /// The reason the upload failed
        reason: String,
    },

    /// One part of a multi-part upload failed; remaining parts were not sent
    #[error("upload of part {index} of {total} failed after {delivered} delivered part(s): {reason}")]
    PartUploadFailed {
        /// 1-based index of the failed part
        index: usize,
        /// Total number of parts
        total: usize,
        /// Number of parts delivered before the failure
        delivered: usize,
        /// The reason the upload failed
        reason: String,
    },
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code, used as a structured logging field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(e) => match e {
                FetchError::ToolNotFound { .. } => "tool_not_found",
                FetchError::ExtractorFailed { .. } => "extractor_failed",
                FetchError::ResultFileNotFound { .. } => "result_file_not_found",
                FetchError::TaskFailed(_) => "task_failed",
            },
            Error::Delivery(e) => match e {
                DeliveryError::UploadFailed { .. } => "upload_failed",
                DeliveryError::PartUploadFailed { .. } => "part_upload_failed",
            },
            Error::Telegram { .. } => "telegram_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the chat platform rejected the request payload itself
    ///
    /// Such rejections (4xx other than rate limiting) are the trigger for
    /// falling back from a media group to one-by-one delivery.
    pub fn is_payload_rejection(&self) -> bool {
        matches!(self, Error::Telegram { code, .. } if (400..500).contains(code) && *code != 429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_cover_nested_variants() {
        let cases: Vec<(Error, &str)> = vec![
            (Error::config("TELEGRAM_TOKEN", "missing"), "config_error"),
            (
                FetchError::ToolNotFound {
                    tool: "yt-dlp".into(),
                }
                .into(),
                "tool_not_found",
            ),
            (
                FetchError::ResultFileNotFound {
                    url_hash: "abc".into(),
                    dir: PathBuf::from("/tmp"),
                }
                .into(),
                "result_file_not_found",
            ),
            (
                DeliveryError::PartUploadFailed {
                    index: 2,
                    total: 3,
                    delivered: 1,
                    reason: "boom".into(),
                }
                .into(),
                "part_upload_failed",
            ),
            (
                Error::Telegram {
                    code: 400,
                    description: "Bad Request".into(),
                },
                "telegram_error",
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.error_code(), code, "wrong code for {error}");
        }
    }

    #[test]
    fn test_extractor_failed_display() {
        let err = FetchError::ExtractorFailed {
            tool: "yt-dlp".into(),
            code: Some(1),
            stderr: "ERROR: Unsupported URL".into(),
        };
        assert_eq!(
            err.to_string(),
            "yt-dlp exited with code 1: ERROR: Unsupported URL"
        );

        let err = FetchError::ExtractorFailed {
            tool: "gallery-dl".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().starts_with("gallery-dl exited with signal"));
    }

    #[test]
    fn test_part_failure_names_the_step() {
        let err: Error = DeliveryError::PartUploadFailed {
            index: 2,
            total: 3,
            delivered: 1,
            reason: "Request Entity Too Large".into(),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("part 2 of 3"));
        assert!(text.contains("1 delivered"));
    }

    #[test]
    fn test_payload_rejection_classification() {
        let bad_request = Error::Telegram {
            code: 400,
            description: "Bad Request: wrong file identifier".into(),
        };
        assert!(bad_request.is_payload_rejection());

        let throttled = Error::Telegram {
            code: 429,
            description: "Too Many Requests".into(),
        };
        assert!(!throttled.is_payload_rejection());

        let io = Error::Io(std::io::Error::other("disk"));
        assert!(!io.is_payload_rejection());
    }
}
