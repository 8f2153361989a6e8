#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::error::{Error, FetchError};
use crate::progress::{FINISHED_TEXT, INITIAL_TEXT};
use crate::telegram::{Chat, Message, MessageId, PhotoSize};
use crate::types::{
    DownloadRequest, DownloadResult, Gallery, ProgressEvent, ProgressSender, RequestState,
};
use crate::utils::url_hash;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CHAT: ChatId = ChatId(99);

#[derive(Clone, Debug, PartialEq)]
enum Sent {
    Text(String),
    Edit(MessageId, String),
    Video {
        caption: Option<String>,
        size: u64,
    },
    Photo(String),
    Group(usize),
}

#[derive(Default)]
struct MockChat {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_videos: bool,
    reject_groups: bool,
    reject_photo: Option<&'static str>,
    fail_downloads: bool,
    batches: Mutex<VecDeque<Vec<Update>>>,
    offsets: Mutex<Vec<Option<i64>>>,
    shutdown: CancellationToken,
}

impl MockChat {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl ChatApi for MockChat {
    async fn get_updates(&self, offset: Option<i64>, _timeout: Duration) -> Result<Vec<Update>> {
        self.offsets.lock().unwrap().push(offset);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                self.shutdown.cancel();
                Ok(Vec::new())
            }
        }
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<Message> {
        self.record(Sent::Text(text.to_string()));
        Ok(Message {
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            chat: Chat { id: chat },
            text: Some(text.to_string()),
            photo: None,
        })
    }

    async fn edit_text(&self, _chat: ChatId, message: MessageId, text: &str) -> Result<()> {
        self.record(Sent::Edit(message, text.to_string()));
        Ok(())
    }

    async fn send_video(&self, _chat: ChatId, path: &Path, caption: Option<&str>) -> Result<()> {
        if self.fail_videos {
            return Err(Error::Telegram {
                code: 413,
                description: "Request Entity Too Large".into(),
            });
        }
        let size = std::fs::metadata(path).unwrap().len();
        self.record(Sent::Video {
            caption: caption.map(str::to_string),
            size,
        });
        Ok(())
    }

    async fn send_photo(&self, _chat: ChatId, path: &Path, _caption: Option<&str>) -> Result<()> {
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.reject_photo == Some(name.as_str()) {
            return Err(Error::Telegram {
                code: 400,
                description: "Bad Request: IMAGE_PROCESS_FAILED".into(),
            });
        }
        self.record(Sent::Photo(name));
        Ok(())
    }

    async fn send_media_group(&self, _chat: ChatId, paths: &[PathBuf]) -> Result<()> {
        if self.reject_groups {
            return Err(Error::Telegram {
                code: 400,
                description: "Bad Request: group send failed".into(),
            });
        }
        self.record(Sent::Group(paths.len()));
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> Result<u64> {
        if self.fail_downloads {
            return Err(Error::Telegram {
                code: 400,
                description: "Bad Request: file is too big".into(),
            });
        }
        std::fs::write(dest, b"jpeg").unwrap();
        Ok(4)
    }
}

/// Writes `size` bytes as `<hash>.mp4`, reporting halfway progress first
struct FakeVideo {
    size: u64,
    fail: bool,
}

#[async_trait]
impl MediaExtractor for FakeVideo {
    async fn fetch(
        &self,
        request: DownloadRequest,
        progress: Option<ProgressSender>,
    ) -> Result<DownloadResult> {
        if self.fail {
            return Err(FetchError::ExtractorFailed {
                tool: "yt-dlp".into(),
                code: Some(1),
                stderr: "ERROR: Unsupported URL".into(),
            }
            .into());
        }
        let size = self.size;
        tokio::fs::create_dir_all(&request.destination).await.unwrap();
        let path = request
            .destination
            .join(format!("{}.mp4", url_hash(&request.url)));
        if let Some(mut progress) = progress {
            progress
                .send(ProgressEvent::Downloading {
                    downloaded_bytes: size / 2,
                    total_bytes: Some(size),
                })
                .await;
            tokio::fs::write(&path, vec![7u8; size as usize]).await.unwrap();
            progress.send(ProgressEvent::Finished).await;
        } else {
            tokio::fs::write(&path, vec![7u8; size as usize]).await.unwrap();
        }
        Ok(DownloadResult {
            path,
            size_bytes: size,
        })
    }

    async fn probe_ip(&self) -> Result<String> {
        if self.fail {
            return Err(Error::Other("proxy refused connection".into()));
        }
        Ok("203.0.113.7".into())
    }
}

/// Writes `count` images into the per-URL gallery directory
struct FakeGallery {
    count: usize,
    fail: bool,
}

#[async_trait]
impl GalleryExtractor for FakeGallery {
    async fn fetch_gallery(&self, request: DownloadRequest) -> Result<Gallery> {
        if self.fail {
            return Err(FetchError::ExtractorFailed {
                tool: "gallery-dl".into(),
                code: Some(64),
                stderr: "[error] No suitable extractor found".into(),
            }
            .into());
        }
        let dir = crate::fetcher::gallery_dir(&request.destination, &request.url);
        std::fs::create_dir_all(&dir).unwrap();
        let photos = (0..self.count)
            .map(|i| {
                let path = dir.join(format!("{i}.jpg"));
                std::fs::write(&path, b"img").unwrap();
                path
            })
            .collect();
        Ok(Gallery { dir, photos })
    }
}

struct Harness {
    bot: MediaBot,
    chat: Arc<MockChat>,
    cache: TempDir,
}

fn harness(chat: MockChat, video: FakeVideo, gallery: FakeGallery) -> Harness {
    let cache = tempfile::tempdir().unwrap();
    let mut config = Config::new("123:token");
    config.fetch.cache_dir = cache.path().to_path_buf();
    config.delivery.max_upload_bytes = 45;
    config.progress.min_update_interval = Duration::ZERO;

    let chat = Arc::new(chat);
    let bot = MediaBot::new(
        Arc::new(config),
        chat.clone(),
        Arc::new(video),
        Arc::new(gallery),
    );
    Harness { bot, chat, cache }
}

fn default_harness() -> Harness {
    harness(
        MockChat::default(),
        FakeVideo {
            size: 40,
            fail: false,
        },
        FakeGallery {
            count: 3,
            fail: false,
        },
    )
}

fn text_update(id: i64, text: &str) -> Update {
    Update {
        update_id: id,
        message: Some(Message {
            message_id: MessageId(id * 10),
            chat: Chat { id: CHAT },
            text: Some(text.to_string()),
            photo: None,
        }),
    }
}

fn photo_update() -> Update {
    Update {
        update_id: 5,
        message: Some(Message {
            message_id: MessageId(50),
            chat: Chat { id: CHAT },
            text: None,
            photo: Some(vec![PhotoSize {
                file_id: "file-1".into(),
                file_unique_id: "uniq-1".into(),
                width: 800,
                height: 600,
                file_size: Some(4),
            }]),
        }),
    }
}

fn cache_is_empty(cache: &TempDir) -> bool {
    std::fs::read_dir(cache.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn test_start_sends_welcome() {
    let h = default_harness();
    h.bot.handle_update(text_update(1, "/start")).await;
    assert_eq!(h.chat.texts(), vec![WELCOME_TEXT]);
}

#[tokio::test]
async fn test_plain_text_is_ignored() {
    let h = default_harness();
    h.bot.handle_update(text_update(1, "hello")).await;
    h.bot.handle_update(text_update(2, "/unknown")).await;
    assert!(h.chat.sent().is_empty());
}

#[tokio::test]
async fn test_ip_probe_reports_address() {
    let h = default_harness();
    h.bot.handle_update(text_update(1, "ip")).await;
    assert_eq!(h.chat.texts(), vec!["Your IP address is: 203.0.113.7"]);
}

#[tokio::test]
async fn test_ip_probe_failure_is_reported() {
    let h = harness(
        MockChat::default(),
        FakeVideo { size: 0, fail: true },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    h.bot.handle_update(text_update(1, "ip")).await;
    assert_eq!(
        h.chat.texts(),
        vec!["Failed to retrieve IP: proxy refused connection"]
    );
}

#[tokio::test]
async fn test_small_video_is_sent_whole() {
    let h = default_harness();
    let state = h
        .bot
        .fetch_video(CHAT, "https://example.com/v/1".into())
        .await;
    assert_eq!(state, RequestState::Delivered);

    // Status message 1 tracks progress, status message 2 tracks the upload
    assert_eq!(
        h.chat.sent(),
        vec![
            Sent::Text(INITIAL_TEXT.into()),
            Sent::Edit(MessageId(1), "Downloading video: 50.0%".into()),
            Sent::Edit(MessageId(1), FINISHED_TEXT.into()),
            Sent::Text(UPLOAD_START_TEXT.into()),
            Sent::Video {
                caption: None,
                size: 40
            },
            Sent::Edit(MessageId(2), UPLOAD_DONE_TEXT.into()),
        ]
    );
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_large_video_is_sent_in_parts() {
    let h = harness(
        MockChat::default(),
        FakeVideo {
            size: 100,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    h.bot
        .handle_update(text_update(1, "watch https://example.com/v/2 now"))
        .await;

    let videos: Vec<Sent> = h
        .chat
        .sent()
        .into_iter()
        .filter(|s| matches!(s, Sent::Video { .. }))
        .collect();
    assert_eq!(
        videos,
        vec![
            Sent::Video {
                caption: Some("Part 1 of 3".into()),
                size: 45
            },
            Sent::Video {
                caption: Some("Part 2 of 3".into()),
                size: 45
            },
            Sent::Video {
                caption: Some("Part 3 of 3".into()),
                size: 10
            },
        ]
    );
    assert_eq!(
        h.chat.sent().last(),
        Some(&Sent::Edit(MessageId(2), UPLOAD_PARTS_DONE_TEXT.into()))
    );
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let h = harness(
        MockChat::default(),
        FakeVideo { size: 0, fail: true },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    let state = h
        .bot
        .fetch_video(CHAT, "https://example.com/v/3".into())
        .await;
    assert_eq!(state, RequestState::FetchFailed);

    let texts = h.chat.texts();
    assert_eq!(texts[0], INITIAL_TEXT);
    assert_eq!(
        texts[1],
        "Failed to download video: yt-dlp exited with code 1: ERROR: Unsupported URL"
    );
    assert_eq!(texts.len(), 2);
}

#[tokio::test]
async fn test_upload_failure_is_reported_and_file_removed() {
    let h = harness(
        MockChat {
            fail_videos: true,
            ..Default::default()
        },
        FakeVideo {
            size: 10,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    let state = h
        .bot
        .fetch_video(CHAT, "https://example.com/v/4".into())
        .await;
    assert_eq!(state, RequestState::DeliverFailed);

    let last = h.chat.texts().pop().unwrap();
    assert!(last.starts_with("Failed to send video: "), "{last}");
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_gallery_is_sent_as_album() {
    let h = default_harness();
    h.bot
        .handle_update(text_update(1, "photo https://example.com/album"))
        .await;

    assert_eq!(
        h.chat.sent(),
        vec![Sent::Text(GALLERY_START_TEXT.into()), Sent::Group(3)]
    );
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_empty_gallery_reports_no_photos() {
    let h = harness(
        MockChat::default(),
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    h.bot
        .handle_update(text_update(1, "photo https://example.com/empty"))
        .await;

    assert_eq!(h.chat.texts(), vec![GALLERY_START_TEXT, GALLERY_EMPTY_TEXT]);
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_gallery_fetch_failure_is_reported() {
    let h = harness(
        MockChat::default(),
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: true,
        },
    );
    h.bot
        .handle_update(text_update(1, "photo https://example.com/bad"))
        .await;

    let last = h.chat.texts().pop().unwrap();
    assert!(last.starts_with("Failed to download photos: "), "{last}");
}

#[tokio::test]
async fn test_partly_delivered_gallery_reports_missing_photos() {
    let h = harness(
        MockChat {
            reject_groups: true,
            reject_photo: Some("1.jpg"),
            ..Default::default()
        },
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 3,
            fail: false,
        },
    );
    h.bot
        .handle_update(text_update(1, "photo https://example.com/album"))
        .await;

    assert_eq!(
        h.chat.sent(),
        vec![
            Sent::Text(GALLERY_START_TEXT.into()),
            Sent::Photo("0.jpg".into()),
            Sent::Photo("2.jpg".into()),
            Sent::Text("Failed to send 1 of 3 photos.".into()),
        ]
    );
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_missing_gallery_tool_is_reported_per_request() {
    let cache = tempfile::tempdir().unwrap();
    let mut config = Config::new("123:token");
    config.fetch.cache_dir = cache.path().to_path_buf();
    let chat = Arc::new(MockChat::default());
    let bot = MediaBot::new(
        Arc::new(config),
        chat.clone(),
        Arc::new(FakeVideo {
            size: 0,
            fail: false,
        }),
        Arc::new(crate::fetcher::MissingGalleryDl),
    );

    bot.handle_update(text_update(1, "photo https://example.com/album"))
        .await;
    bot.handle_update(text_update(2, "ip")).await;

    let texts = chat.texts();
    assert!(
        texts[1].starts_with("Failed to download photos: gallery-dl not found"),
        "{texts:?}"
    );
    // Video-side commands are unaffected
    assert_eq!(texts[2], "Your IP address is: 203.0.113.7");
}

#[tokio::test]
async fn test_gallery_needs_a_real_url() {
    let h = default_harness();
    h.bot.handle_update(text_update(1, "photo my-album")).await;
    assert_eq!(
        h.chat.texts(),
        vec!["Failed to download photos: invalid URL: my-album"]
    );
}

#[tokio::test]
async fn test_photo_is_echoed_and_removed() {
    let h = default_harness();
    h.bot.handle_update(photo_update()).await;

    assert_eq!(h.chat.sent(), vec![Sent::Photo("uniq-1.jpg".into())]);
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_photo_echo_failure_is_reported() {
    let h = harness(
        MockChat {
            fail_downloads: true,
            ..Default::default()
        },
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    h.bot.handle_update(photo_update()).await;

    assert_eq!(
        h.chat.texts(),
        vec!["Failed to send photo: Telegram API error 400: Bad Request: file is too big"]
    );
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_photo_echo_rejected_upload_is_reported() {
    let h = harness(
        MockChat {
            reject_photo: Some("uniq-1.jpg"),
            ..Default::default()
        },
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );
    h.bot.handle_update(photo_update()).await;

    let texts = h.chat.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Failed to send photo: "), "{texts:?}");
    assert!(cache_is_empty(&h.cache));
}

#[tokio::test]
async fn test_polling_dispatches_and_advances_offset() {
    let chat = MockChat::default();
    chat.batches.lock().unwrap().extend([
        vec![text_update(10, "/start"), text_update(11, "/help")],
        vec![text_update(12, "ip")],
    ]);
    let shutdown = chat.shutdown.clone();
    let h = harness(
        chat,
        FakeVideo {
            size: 0,
            fail: false,
        },
        FakeGallery {
            count: 0,
            fail: false,
        },
    );

    let dispatched = run_polling(h.bot.clone(), shutdown).await;
    assert_eq!(dispatched, 3);
    assert_eq!(
        *h.chat.offsets.lock().unwrap(),
        vec![None, Some(12), Some(13)]
    );

    // In-flight handlers finished before the loop returned
    let mut texts = h.chat.texts();
    texts.sort();
    let mut expected = vec![
        WELCOME_TEXT.to_string(),
        WELCOME_TEXT.to_string(),
        "Your IP address is: 203.0.113.7".to_string(),
    ];
    expected.sort();
    assert_eq!(texts, expected);
}
