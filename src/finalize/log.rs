use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::capture::StopReason;
use crate::playback::TrackId;

/// How finalization ended for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// Kept, tagged, and logged.
    Completed,
    /// Deleted: recorded duration fell short of the upstream duration.
    DiscardedShort,
    /// Deleted: output file missing or implausibly small.
    DiscardedMissing,
}

/// Append-only record persisted once per finalized capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationLogEntry {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// UTC arm timestamp of the capture.
    pub start_time: DateTime<Utc>,
    /// UTC finalize timestamp.
    pub end_time: DateTime<Utc>,
    /// Upstream-reported track duration.
    pub original_duration_secs: f64,
    /// Upstream duration plus the configured buffer.
    pub target_duration_secs: f64,
    /// Wall-clock capture length, arm to finalize.
    pub recorded_duration_secs: f64,
    pub header_rewrite_successful: bool,
    pub stop_reason: StopReason,
    pub outcome: FinalizeOutcome,
    pub path: PathBuf,
    pub format: String,
}

/// Writer for the jsonl metadata log, one JSON object per line.
#[derive(Clone)]
pub struct MetadataLog {
    path: Arc<PathBuf>,
}

impl MetadataLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Arc::new(path) }
    }

    pub fn append(&self, entry: &FinalizationLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())
            .with_context(|| format!("Failed to open metadata log {:?}", self.path))?;
        writeln!(file, "{}", line).context("Failed to append metadata log entry")?;
        Ok(())
    }
}

/// Append-only list of failed tracks, one resolvable link or
/// `Artist - Title` line each. Write errors are logged, never raised.
#[derive(Clone)]
pub struct FailureLog {
    path: Arc<PathBuf>,
}

impl FailureLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Arc::new(path) }
    }

    pub fn append(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            warn!("Failure list write error: {e}");
        }
    }
}
