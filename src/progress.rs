//! Rendering fetch progress into a single status message
//!
//! The fetch produces [`ProgressEvent`]s as the extractor prints them; the
//! [`ProgressReporter`] consumes them in its own task, which owns the chat
//! connection, and edits one status message. Updates are throttled and
//! coalesced (the last pending text wins). Sink failures never fail the
//! request.

use crate::error::Result;
use crate::telegram::{ChatApi, ChatId, MessageId};
use crate::types::ProgressEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Status text shown before the first progress report
pub const INITIAL_TEXT: &str = "Downloading video: 0%";

/// Status text once retrieval has finished
pub const FINISHED_TEXT: &str = "Download complete. Uploading video...";

/// Status text for a known percentage
#[must_use]
pub fn render_percent(percent: f64) -> String {
    format!("Downloading video: {percent:.1}%")
}

/// Percentage for a `Downloading` event, `None` when the total is unknown
#[must_use]
pub fn percent(downloaded_bytes: u64, total_bytes: Option<u64>) -> Option<f64> {
    let total = total_bytes.filter(|t| *t > 0)?;
    Some((downloaded_bytes as f64 / total as f64 * 100.0).min(100.0))
}

/// Where status text goes
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Replace the visible status text
    async fn update(&self, text: &str) -> Result<()>;
}

/// A chat message edited in place
pub struct StatusMessage {
    api: Arc<dyn ChatApi>,
    chat: ChatId,
    message: MessageId,
}

impl StatusMessage {
    /// Wrap a message previously sent by the bot
    pub fn new(api: Arc<dyn ChatApi>, chat: ChatId, message: MessageId) -> Self {
        Self { api, chat, message }
    }
}

#[async_trait]
impl StatusSink for StatusMessage {
    async fn update(&self, text: &str) -> Result<()> {
        self.api.edit_text(self.chat, self.message, text).await
    }
}

/// Consumer half of a per-request progress channel
pub struct ProgressReporter<S> {
    sink: S,
    min_interval: Duration,
    last_text: String,
    last_percent: f64,
    last_update: Option<Instant>,
    pending: Option<String>,
    finished: bool,
    updates: usize,
}

impl<S: StatusSink> ProgressReporter<S> {
    /// Create a reporter whose sink currently shows [`INITIAL_TEXT`]
    pub fn new(sink: S, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_text: INITIAL_TEXT.to_string(),
            last_percent: 0.0,
            last_update: None,
            pending: None,
            finished: false,
            updates: 0,
        }
    }

    /// Consume events until the producer hangs up
    ///
    /// Returns the number of status updates issued.
    pub async fn run(mut self, mut events: mpsc::Receiver<ProgressEvent>) -> usize {
        loop {
            let flush_at = self
                .last_update
                .map_or_else(Instant::now, |at| at + self.min_interval);

            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(flush_at), if self.pending.is_some() => {
                    if let Some(text) = self.pending.take() {
                        self.push(text).await;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => break,
                },
            }
        }

        // Producer gone without finishing (failed fetch): the caller posts
        // the failure, so a stale percentage is not worth an extra edit.
        debug!(updates = self.updates, finished = self.finished, "progress reporter done");
        self.updates
    }

    async fn on_event(&mut self, event: ProgressEvent) {
        if self.finished {
            return;
        }
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
            } => {
                let Some(percent) = percent(downloaded_bytes, total_bytes) else {
                    return;
                };
                if percent < self.last_percent {
                    return;
                }
                self.last_percent = percent;
                let text = render_percent(percent);
                if text == self.last_text {
                    return;
                }
                if self.due() {
                    self.pending = None;
                    self.push(text).await;
                } else {
                    self.pending = Some(text);
                }
            }
            ProgressEvent::Finished => {
                self.finished = true;
                self.pending = None;
                self.push(FINISHED_TEXT.to_string()).await;
            }
        }
    }

    /// Whether the throttle interval has passed since the last update
    fn due(&self) -> bool {
        self.last_update
            .is_none_or(|at| at.elapsed() >= self.min_interval)
    }

    async fn push(&mut self, text: String) {
        if text == self.last_text {
            return;
        }
        if let Err(e) = self.sink.update(&text).await {
            warn!(error = %e, "status update failed");
        }
        self.last_update = Some(Instant::now());
        self.last_text = text;
        self.updates += 1;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        texts: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn update(&self, text: &str) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(Error::Other("rate limited".into()));
            }
            Ok(())
        }
    }

    fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> ProgressEvent {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
        }
    }

    async fn run_events(sink: RecordingSink, interval: Duration, events: Vec<ProgressEvent>) -> usize {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let reporter = ProgressReporter::new(sink, interval);
        let handle = tokio::spawn(reporter.run(rx));
        for event in events {
            tx.send(event).await.unwrap();
            tokio::task::yield_now().await;
        }
        drop(tx);
        handle.await.unwrap()
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, Some(200)), Some(25.0));
        assert_eq!(percent(1, None), None);
        assert_eq!(percent(1, Some(0)), None);
        // Estimates can undershoot
        assert_eq!(percent(300, Some(200)), Some(100.0));
        assert_eq!(render_percent(33.333), "Downloading video: 33.3%");
    }

    #[tokio::test]
    async fn test_renders_each_step_without_throttling() {
        let sink = RecordingSink::default();
        let updates = run_events(
            sink.clone(),
            Duration::ZERO,
            vec![
                downloading(25, Some(100)),
                downloading(50, Some(100)),
                ProgressEvent::Finished,
            ],
        )
        .await;

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(
            texts,
            vec![
                "Downloading video: 25.0%",
                "Downloading video: 50.0%",
                FINISHED_TEXT
            ]
        );
        assert_eq!(updates, 3);
    }

    #[tokio::test]
    async fn test_unknown_total_is_not_rendered() {
        let sink = RecordingSink::default();
        run_events(
            sink.clone(),
            Duration::ZERO,
            vec![downloading(10, None), downloading(20, None)],
        )
        .await;
        assert!(sink.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_percentage_never_decreases() {
        let sink = RecordingSink::default();
        run_events(
            sink.clone(),
            Duration::ZERO,
            vec![
                downloading(60, Some(100)),
                // Total estimate grew: would render 30%
                downloading(60, Some(200)),
                downloading(180, Some(200)),
            ],
        )
        .await;

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(
            texts,
            vec!["Downloading video: 60.0%", "Downloading video: 90.0%"]
        );
    }

    #[tokio::test]
    async fn test_identical_text_not_resent_and_nothing_after_finished() {
        let sink = RecordingSink::default();
        run_events(
            sink.clone(),
            Duration::ZERO,
            vec![
                downloading(1000, Some(10_000)),
                downloading(1001, Some(10_000)),
                ProgressEvent::Finished,
                downloading(10_000, Some(10_000)),
                ProgressEvent::Finished,
            ],
        )
        .await;

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(texts, vec!["Downloading video: 10.0%", FINISHED_TEXT]);
    }

    #[tokio::test]
    async fn test_throttling_coalesces_to_last_event() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(ProgressReporter::new(sink.clone(), Duration::from_secs(3600)).run(rx));

        // First update goes out immediately, the rest wait for the interval
        for step in 1..=5u64 {
            tx.send(downloading(step * 10, Some(100))).await.unwrap();
            tokio::task::yield_now().await;
        }
        tx.send(ProgressEvent::Finished).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(texts.first().map(String::as_str), Some("Downloading video: 10.0%"));
        assert_eq!(texts.last().map(String::as_str), Some(FINISHED_TEXT));
        assert_eq!(texts.len(), 2);
    }

    #[tokio::test]
    async fn test_sink_failures_are_swallowed() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let updates = run_events(
            sink.clone(),
            Duration::ZERO,
            vec![downloading(5, Some(10)), ProgressEvent::Finished],
        )
        .await;
        assert_eq!(updates, 2);
        assert_eq!(sink.texts.lock().unwrap().len(), 2);
    }
}
