//! Asynchronous execution of external extractor binaries
//!
//! Both output streams are read concurrently and handed out line by line.
//! yt-dlp writes progress to stderr once `--print` puts it in quiet mode, so
//! neither stream can be treated as noise.

use crate::error::{Error, FetchError, Result};
use crate::utils::tail;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// Number of kept stderr lines for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Maximum characters of stderr quoted in an error
const STDERR_TAIL_CHARS: usize = 500;

/// Which stream a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

/// Newline-delimited reader over one child stream
///
/// The buffer survives across calls, so a read dropped by `select!` resumes
/// where it stopped.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
            buf: Vec::new(),
        }
    }

    /// Lines of the next chunk, `None` at end of stream
    async fn next_chunk(&mut self) -> std::io::Result<Option<Vec<String>>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        // Progress bars without --newline separate updates with CR
        let lines = String::from_utf8_lossy(&self.buf)
            .split(['\r', '\n'])
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.buf.clear();
        Ok(Some(lines))
    }
}

/// A running extractor process
///
/// The child is killed if the run is dropped before [`ToolRun::wait`], so an
/// abandoned request does not leave the tool running.
pub(crate) struct ToolRun {
    tool: String,
    child: Child,
    stdout: Option<LineReader<ChildStdout>>,
    stderr: Option<LineReader<ChildStderr>>,
    pending: VecDeque<(Stream, String)>,
    stderr_tail: VecDeque<String>,
}

impl ToolRun {
    /// Start `command` with both output streams piped
    pub(crate) fn spawn(tool: &str, mut command: Command) -> Result<Self> {
        debug!(tool, ?command, "spawning external tool");

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::Fetch(FetchError::ToolNotFound {
                    tool: tool.to_string(),
                }),
                _ => Error::Fetch(FetchError::ExtractorFailed {
                    tool: tool.to_string(),
                    code: None,
                    stderr: format!("failed to start: {e}"),
                }),
            })?;

        Ok(Self {
            tool: tool.to_string(),
            stdout: child.stdout.take().map(LineReader::new),
            stderr: child.stderr.take().map(LineReader::new),
            child,
            pending: VecDeque::new(),
            stderr_tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
        })
    }

    /// Next output line from either stream, `None` once both are closed
    pub(crate) async fn next_line(&mut self) -> Option<(Stream, String)> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }

            let (stream, chunk) = match (self.stdout.as_mut(), self.stderr.as_mut()) {
                (None, None) => return None,
                (Some(out), None) => (Stream::Stdout, out.next_chunk().await),
                (None, Some(err)) => (Stream::Stderr, err.next_chunk().await),
                (Some(out), Some(err)) => tokio::select! {
                    chunk = out.next_chunk() => (Stream::Stdout, chunk),
                    chunk = err.next_chunk() => (Stream::Stderr, chunk),
                },
            };

            match chunk {
                Ok(Some(lines)) => self
                    .pending
                    .extend(lines.into_iter().map(|line| (stream, line))),
                Ok(None) => self.close(stream),
                Err(e) => {
                    debug!(tool = %self.tool, ?stream, error = %e, "output stream read failed");
                    self.close(stream);
                }
            }
        }
    }

    fn close(&mut self, stream: Stream) {
        match stream {
            Stream::Stdout => self.stdout = None,
            Stream::Stderr => self.stderr = None,
        }
    }

    /// Keep a stderr line for the error message if the tool fails
    pub(crate) fn keep(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        if self.stderr_tail.len() == STDERR_TAIL_LINES {
            self.stderr_tail.pop_front();
        }
        self.stderr_tail.push_back(line);
    }

    /// Wait for exit; a non-zero status carries the kept stderr lines
    pub(crate) async fn wait(mut self) -> Result<()> {
        let status = self.child.wait().await?;
        if status.success() {
            debug!(tool = %self.tool, "external tool finished");
            return Ok(());
        }

        let stderr = tail(
            &self.stderr_tail.into_iter().collect::<Vec<_>>().join("\n"),
            STDERR_TAIL_CHARS,
        );
        Err(FetchError::ExtractorFailed {
            tool: self.tool,
            code: status.code(),
            stderr,
        }
        .into())
    }
}

/// Run `command` to completion, keeping all of stderr for the error report
pub(crate) async fn run_to_end(tool: &str, command: Command) -> Result<()> {
    let mut run = ToolRun::spawn(tool, command)?;
    while let Some((stream, line)) = run.next_line().await {
        match stream {
            Stream::Stdout => debug!(tool, line = %line, "tool output"),
            Stream::Stderr => run.keep(line),
        }
    }
    run.wait().await
}
