//! Parser for yt-dlp machine-readable output lines
//!
//! yt-dlp is driven with a progress template and a post-move print template
//! so that both kinds of information arrive as single, tagged lines:
//!
//! ```text
//! [progress] downloading 1048576 5242880 NA
//! [progress] finished 5242880 5242880 NA
//! [result] mp4|/cache/3a7bd3e2...mp4
//! ```

use crate::types::ProgressEvent;
use std::path::PathBuf;

/// Tag of progress lines
pub const PROGRESS_TAG: &str = "[progress]";

/// Tag of the result line
pub const RESULT_TAG: &str = "[result]";

/// `--progress-template` value producing [`PROGRESS_TAG`] lines
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s \
     %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// `--print` value producing the [`RESULT_TAG`] line once the file is in place
pub const RESULT_TEMPLATE: &str = "after_move:[result] %(ext)s|%(filepath,_filename)s";

/// What the tool reported about its output file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolReport {
    /// Extension from the tool's metadata (`None` if missing or "NA")
    pub ext: Option<String>,
    /// File path the tool says it produced
    pub filename: Option<PathBuf>,
}

/// One classified output line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputLine {
    /// A progress update
    Progress(ProgressEvent),
    /// The final file report
    Result(ToolReport),
    /// A tagged progress line carrying nothing usable (e.g. status "error")
    Ignored,
    /// Anything else (warnings, errors, informational output)
    Other,
}

/// Classify a single output line
pub fn parse_line(line: &str) -> OutputLine {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_TAG) {
        return parse_progress(rest).map_or(OutputLine::Ignored, OutputLine::Progress);
    }
    if let Some(rest) = line.strip_prefix(RESULT_TAG) {
        return OutputLine::Result(parse_result(rest));
    }
    OutputLine::Other
}

fn parse_progress(rest: &str) -> Option<ProgressEvent> {
    let mut fields = rest.split_whitespace();
    let status = fields.next()?;
    let downloaded = fields.next().and_then(parse_bytes);
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: downloaded?,
            total_bytes: total.or(estimate).filter(|t| *t > 0),
        }),
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

fn parse_result(rest: &str) -> ToolReport {
    let rest = rest.trim();
    let (ext, filename) = rest.split_once('|').unwrap_or((rest, ""));
    ToolReport {
        ext: known(ext).map(str::to_string),
        filename: known(filename).map(PathBuf::from),
    }
}

/// yt-dlp renders missing fields as "NA"
fn known(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != "NA" && value != "None").then_some(value)
}

/// Byte counts may be integers or floats (estimates)
fn parse_bytes(value: &str) -> Option<u64> {
    let value = known(value)?;
    if let Ok(n) = value.parse::<u64>() {
        return Some(n);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64)
}
