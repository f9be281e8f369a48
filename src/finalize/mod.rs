pub mod log;
pub mod rewrite;
pub mod tags;

pub use log::{FailureLog, FinalizationLogEntry, FinalizeOutcome, MetadataLog};
pub use rewrite::HeaderRewriter;
pub use tags::{download_cover, embed_tags, is_already_recorded, IDENTITY_TAG};

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::capture::CaptureTask;
use crate::config::Settings;
use crate::fs;

/// Files at or below this size are treated as absent.
const MIN_PLAUSIBLE_BYTES: u64 = 1024;

/// Flush window after a capture process that was still running at dequeue.
const POST_EXIT_FLUSH: Duration = Duration::from_secs(5);

/// Bounded wait when joining the worker at shutdown.
const SHUTDOWN_JOIN_WAIT: Duration = Duration::from_secs(30);

/// Producer side of the finalization queue. Tasks move in by value; the
/// sender never sees them again.
#[derive(Clone)]
pub struct FinalizeSender {
    tx: mpsc::UnboundedSender<CaptureTask>,
}

impl FinalizeSender {
    pub fn enqueue(&self, task: CaptureTask) {
        if self.tx.send(task).is_err() {
            warn!("Finalization queue closed, dropping task");
        }
    }
}

/// Single-consumer pipeline that post-processes finished captures: waits
/// out the process, moves the file into place, validates duration, rewrites
/// headers, tags, and appends the metadata log entry.
///
/// The worker drains until every [`FinalizeSender`] is dropped *and* the
/// queue is empty, so callers can guarantee all enqueued tasks finish
/// before process exit.
pub struct FinalizationPipeline {
    tx: mpsc::UnboundedSender<CaptureTask>,
    worker: JoinHandle<()>,
}

impl FinalizationPipeline {
    pub fn spawn(settings: Arc<Settings>, failures: FailureLog) -> Result<Self> {
        let rec = &settings.recording;
        fs::ensure_dir(&rec.output_directory)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for cover fetch")?;

        let context = FinalizeContext {
            rewriter: HeaderRewriter::new(rec.capture_tool_path.clone()),
            metadata_log: MetadataLog::new(rec.output_directory.join(fs::METADATA_LOG)),
            failures,
            http,
            duration_tolerance_secs: rec.duration_tolerance_seconds,
            min_duration_secs: rec.min_duration_seconds,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, context));
        Ok(Self { tx, worker })
    }

    pub fn sender(&self) -> FinalizeSender {
        FinalizeSender { tx: self.tx.clone() }
    }

    /// Stop accepting, drain the queue, and join the worker with a bounded
    /// wait. Clones of the sender must be dropped first or the drain waits
    /// for them.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tx);
        match tokio::time::timeout(SHUTDOWN_JOIN_WAIT, self.worker).await {
            Ok(join) => join.context("Finalization worker panicked")?,
            Err(_) => warn!("Finalization worker join timed out"),
        }
        Ok(())
    }
}

struct FinalizeContext {
    rewriter: HeaderRewriter,
    metadata_log: MetadataLog,
    failures: FailureLog,
    http: reqwest::Client,
    duration_tolerance_secs: f64,
    min_duration_secs: f64,
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<CaptureTask>, context: FinalizeContext) {
    info!("Finalization worker started");
    while let Some(task) = rx.recv().await {
        if let Err(e) = finalize_task(&context, task).await {
            error!("Finalization error: {e:#}");
        }
    }
    info!("Finalization worker stopped");
}

async fn finalize_task(ctx: &FinalizeContext, mut task: CaptureTask) -> Result<()> {
    // The capture was already signaled to stop before enqueue; this wait
    // covers slow exits and gives the encoder a flush window.
    let was_running = task.handle.is_running();
    if let Err(e) = task.handle.stop().await {
        warn!("Capture process stop failed during finalize: {e:#}");
    }
    if was_running {
        tokio::time::sleep(POST_EXIT_FLUSH).await;
    }

    let mut audio_path = task.audio_path.clone();
    if in_scratch(&audio_path) {
        match fs::robust_move(&audio_path, &task.final_path).await {
            Ok(moved) => audio_path = moved,
            Err(e) => warn!("Move to final path failed: {e:#}"),
        }
    }

    let meta = &task.metadata;
    let recorded_secs =
        (Utc::now() - task.armed_at).num_milliseconds().max(0) as f64 / 1000.0;
    let original_secs = meta.duration_ms as f64 / 1000.0;
    let entry = |outcome, rewrite_ok| FinalizationLogEntry {
        track_id: meta.id.clone(),
        title: meta.title.clone(),
        artist: meta.artist_str(),
        album: meta.album.clone(),
        start_time: task.armed_at,
        end_time: Utc::now(),
        original_duration_secs: original_secs,
        target_duration_secs: task.expected_duration_secs,
        recorded_duration_secs: recorded_secs,
        header_rewrite_successful: rewrite_ok,
        stop_reason: task.stop_reason,
        outcome,
        path: audio_path.clone(),
        format: task
            .final_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let size = std::fs::metadata(&audio_path).map(|m| m.len()).unwrap_or(0);
    if size <= MIN_PLAUSIBLE_BYTES {
        warn!(
            "Discarding {}: output missing or implausibly small ({} bytes)",
            meta.title, size
        );
        fs::remove_quiet(&audio_path);
        ctx.failures
            .append(&format!("{} - {}", meta.artist_str(), meta.title));
        ctx.metadata_log
            .append(&entry(FinalizeOutcome::DiscardedMissing, false))?;
        return Ok(());
    }

    let rewrite_ok = task.rewrite_enabled && ctx.rewriter.rewrite(&audio_path).await;

    // Duration validation: a capture that falls short of the upstream
    // duration (beyond tolerance) is an incomplete recording. Unknown
    // upstream durations fall back to the configured minimum.
    let min_required = if meta.duration_ms > 0 {
        (original_secs - ctx.duration_tolerance_secs).max(0.0)
    } else {
        ctx.min_duration_secs
    };
    if recorded_secs < min_required {
        warn!(
            "Discarding {}: recorded {:.1}s of an expected {:.1}s",
            meta.title, recorded_secs, original_secs
        );
        fs::remove_quiet(&audio_path);
        ctx.failures
            .append(&format!("{} - {}", meta.artist_str(), meta.title));
        ctx.metadata_log
            .append(&entry(FinalizeOutcome::DiscardedShort, rewrite_ok))?;
        return Ok(());
    }

    // Tagging is best-effort: a failure here never costs the audio.
    let cover_path = cover_temp_path(&audio_path);
    let cover_ok = match meta.cover_url.as_deref() {
        Some(url) => download_cover(&ctx.http, url, &cover_path).await,
        None => false,
    };
    let embed_result = embed_tags(
        &audio_path,
        meta,
        cover_ok.then_some(cover_path.as_path()),
    );
    fs::remove_quiet(&cover_path);
    if let Err(e) = embed_result {
        warn!("Tag embed failed for {:?}: {e:#}", audio_path);
    }

    ctx.metadata_log
        .append(&entry(FinalizeOutcome::Completed, rewrite_ok))?;
    info!("Finalized: {:?} ({})", audio_path, task.stop_reason);
    Ok(())
}

fn in_scratch(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_str();
        name == Some(fs::ARMING_DIR) || name == Some(fs::STANDBY_DIR)
    })
}

fn cover_temp_path(audio_path: &Path) -> std::path::PathBuf {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    audio_path.with_file_name(format!("{}_cover.jpg", stem))
}
