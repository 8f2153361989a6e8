//! Video retrieval with the external `yt-dlp` binary

use super::parser::{OutputLine, PROGRESS_TEMPLATE, RESULT_TEMPLATE, ToolReport, parse_line};
use super::process::{Stream, ToolRun, run_to_end};
use super::resolve::resolve_output;
use super::{MediaExtractor, locate_tool, push_options};
use crate::config::{CookieSource, FetchConfig};
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, DownloadResult, ProgressEvent, ProgressSender};
use crate::utils::{remove_scratch_file, url_hash};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, info};

const YTDLP: &str = "yt-dlp";

/// Distinguishes concurrent IP probe scratch files
static PROBE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Extractor backed by the `yt-dlp` executable
///
/// Output files are named `<sha256(url)>.<ext>` inside the request's
/// destination directory.
pub struct YtDlp {
    binary_path: PathBuf,
    config: FetchConfig,
}

impl YtDlp {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf, config: FetchConfig) -> Self {
        Self {
            binary_path,
            config,
        }
    }

    /// Create an extractor using the configured path or `PATH` lookup
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let binary_path = locate_tool(config.ytdlp_path.as_deref(), YTDLP)?;
        Ok(Self::new(binary_path, config.clone()))
    }

    /// Path of the binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Proxy and cookie options shared by every invocation
    fn push_network_args(&self, command: &mut Command) {
        if let Some(proxy) = &self.config.proxy_url {
            command.arg("--proxy").arg(proxy);
        }
        match &self.config.cookies {
            Some(CookieSource::File(path)) => {
                command.arg("--cookies").arg(path);
            }
            Some(CookieSource::Browser(profile)) => {
                command.arg("--cookies-from-browser").arg(profile);
            }
            None => {}
        }
    }

    pub(crate) fn download_command(&self, request: &DownloadRequest, url_hash: &str) -> Command {
        let template = request.destination.join(format!("{url_hash}.%(ext)s"));

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-f")
            .arg(&self.config.format)
            .arg("--no-playlist")
            .arg("-o")
            .arg(template)
            .arg("--newline")
            .arg("--progress")
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg("--no-simulate")
            .arg("--print")
            .arg(RESULT_TEMPLATE);
        self.push_network_args(&mut command);
        push_options(&mut command, &request.options);
        command.arg("--").arg(&request.url);
        command
    }

    pub(crate) fn probe_command(&self, output: &Path) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-f")
            .arg(&self.config.format)
            .arg("--no-playlist")
            .arg("--force-generic-extractor")
            .arg("--quiet")
            .arg("--no-progress")
            .arg("-o")
            .arg(output);
        self.push_network_args(&mut command);
        command.arg("--").arg(&self.config.ip_check_url);
        command
    }
}

/// Run the download to completion, relaying progress as it is printed
async fn run_download(
    command: Command,
    progress: &mut Option<ProgressSender>,
) -> Result<ToolReport> {
    let mut report = ToolReport::default();
    let mut run = ToolRun::spawn(YTDLP, command)?;

    while let Some((stream, line)) = run.next_line().await {
        match parse_line(&line) {
            OutputLine::Progress(event) => {
                if let Some(progress) = progress.as_mut() {
                    progress.send(event).await;
                }
            }
            OutputLine::Result(result) => report = result,
            OutputLine::Ignored => {}
            OutputLine::Other => {
                debug!(line = %line, "yt-dlp output");
                if stream == Stream::Stderr {
                    run.keep(line);
                }
            }
        }
    }

    run.wait().await?;
    Ok(report)
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn fetch(
        &self,
        request: DownloadRequest,
        mut progress: Option<ProgressSender>,
    ) -> Result<DownloadResult> {
        let url_hash = url_hash(&request.url);
        tokio::fs::create_dir_all(&request.destination).await?;

        info!(%url_hash, dir = ?request.destination, "starting yt-dlp download");

        let command = self.download_command(&request, &url_hash);
        let report = run_download(command, &mut progress).await?;

        // No-op if the tool already reported it
        if let Some(progress) = progress.as_mut() {
            progress.send(ProgressEvent::Finished).await;
        }
        drop(progress);

        let path = resolve_output(
            report.filename.as_deref(),
            report.ext.as_deref(),
            &request.destination,
            &url_hash,
        )?;

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        info!(%url_hash, ?path, size_bytes, "yt-dlp download complete");

        Ok(DownloadResult { path, size_bytes })
    }

    async fn probe_ip(&self) -> Result<String> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let output = self.config.cache_dir.join(format!(
            "ip-{}-{}.txt",
            std::process::id(),
            PROBE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let command = self.probe_command(&output);
        let body = match run_to_end(YTDLP, command).await {
            Ok(()) => tokio::fs::read_to_string(&output).await,
            Err(e) => {
                remove_scratch_file(&output);
                return Err(e);
            }
        };
        remove_scratch_file(&output);

        let ip = body?.trim().to_string();
        if ip.is_empty() {
            return Err(Error::Other("IP check returned an empty response".to_string()));
        }
        Ok(ip)
    }
}
