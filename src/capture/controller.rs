use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::process::{CaptureBackend, CaptureHandle, CaptureSpec};
use super::task::{CaptureTask, StopReason, TrackFailure, TrackOutcome};
use crate::config::Settings;
use crate::finalize::{FailureLog, FinalizeSender};
use crate::fs;
use crate::playback::{track_link, SnapshotSource, TrackId, TrackMetadata, TrackSnapshot};

/// Ceiling for a pre-armed capture. Exact stop timing comes from polled
/// state, so the cap only has to outlast any single track.
const ARM_CAP_SECS: f64 = 3600.0;

/// Settle delay between the play command and the confirming poll.
const POST_START_SETTLE: Duration = Duration::from_millis(250);

/// An existing file below this size never satisfies the skip check.
const SKIP_MIN_BYTES: u64 = 20 * 1024;

/// Per-track recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Armed,
    Recording,
    Stopping,
}

/// Owns the per-track state machine: arms a capture process ahead of
/// playback, decides when to stop it from polled snapshots, and hands the
/// finished task to the finalization pipeline.
///
/// A controller holds at most one active task; `&mut self` on
/// [`record_track`](Self::record_track) makes overlapping captures
/// unrepresentable.
pub struct CaptureController {
    settings: Arc<Settings>,
    backend: Arc<dyn CaptureBackend>,
    snapshots: SnapshotSource,
    finalize: FinalizeSender,
    failures: FailureLog,
    state: RecordState,
    arm_counter: u32,
}

impl CaptureController {
    pub fn new(
        settings: Arc<Settings>,
        backend: Arc<dyn CaptureBackend>,
        snapshots: SnapshotSource,
        finalize: FinalizeSender,
        failures: FailureLog,
    ) -> Self {
        Self {
            settings,
            backend,
            snapshots,
            finalize,
            failures,
            state: RecordState::Idle,
            arm_counter: 0,
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Record one track to completion: skip check, arm, play, monitor,
    /// stop, enqueue. Always returns with the controller back in `Idle`.
    pub async fn record_track(
        &mut self,
        track: &TrackId,
        preview: Option<&TrackMetadata>,
        cancel: &CancellationToken,
    ) -> Result<TrackOutcome> {
        let settings = self.settings.clone();
        let rec = &settings.recording;

        // Pre-capture skip: the preview decides this and the banner, nothing
        // else. The authoritative path comes from post-start metadata.
        if let Some(meta) = preview {
            let prospective = self.final_path_for(meta);
            if rec.skip_existing_file
                && crate::finalize::is_already_recorded(&prospective, &meta.id, SKIP_MIN_BYTES)
            {
                info!("Skipping {}: already recorded -> {:?}", meta.title, prospective);
                return Ok(TrackOutcome::Skipped { final_path: prospective });
            }
        }

        // IDLE -> ARMED: spawn before playback so no audio goes uncaptured.
        self.arm_counter += 1;
        let arming_dir = rec.output_directory.join(fs::ARMING_DIR);
        fs::ensure_dir(&arming_dir)?;
        let temp_path = arming_dir.join(format!(
            "arming_{:03}.{}",
            self.arm_counter, rec.default_format
        ));

        let mut handle = self
            .backend
            .arm(CaptureSpec {
                device: rec.audio_device.clone(),
                max_duration_secs: ARM_CAP_SECS,
                output_path: temp_path.clone(),
                format: rec.default_format.clone(),
            })
            .await
            .context("Failed to arm capture process")?;
        self.state = RecordState::Armed;
        let armed_at = Utc::now();

        sleep(Duration::from_millis(rec.preroll_ms)).await;

        let link = track_link(&self.settings.upstream.web_base_url, track);
        if let Err(e) = self.snapshots.remote().start_playback(track).await {
            warn!("FAILED to start playback -> {} ({e:#})", link);
            self.discard_armed(handle, &temp_path).await;
            self.failures.append(&link);
            return Ok(TrackOutcome::Failed(TrackFailure::PlaybackStart {
                link,
                reason: format!("{e:#}"),
            }));
        }

        // ARMED -> RECORDING: one confirming poll after a short settle. No
        // matching identity is a hard failure for the whole track.
        sleep(POST_START_SETTLE).await;
        let confirmed = match self.snapshots.poll().await {
            Some(snap) if snap.metadata.id == *track => snap.metadata,
            _ => {
                warn!("FAILED (no confirmed metadata after start) -> {}", link);
                self.discard_armed(handle, &temp_path).await;
                self.failures.append(&link);
                return Ok(TrackOutcome::Failed(TrackFailure::MetadataUnresolved { link }));
            }
        };

        // Post-start metadata is authoritative for the destination.
        let final_path = self.final_path_for(&confirmed);
        let expected =
            confirmed.duration_ms as f64 / 1000.0 + rec.recording_buffer_seconds;

        info!(
            "Recording: {} - {} ({})",
            confirmed.artist_str(),
            confirmed.title,
            rec.default_format.to_uppercase()
        );
        info!("       to: {:?}", final_path);
        info!("   target: ~{:.1}s", expected);

        self.state = RecordState::Recording;
        let stop_reason = self
            .monitor_recording(&confirmed.id, cancel)
            .await;

        // RECORDING -> STOPPING -> IDLE: graceful stop, flush window, then
        // the task moves into the queue and the controller forgets it.
        self.state = RecordState::Stopping;
        if let Err(e) = handle.stop().await {
            warn!("Capture stop error: {e:#}");
        }
        sleep(Duration::from_secs_f64(rec.gap_seconds)).await;

        self.finalize.enqueue(CaptureTask {
            handle,
            audio_path: temp_path,
            final_path: final_path.clone(),
            metadata: confirmed,
            armed_at,
            expected_duration_secs: expected,
            stop_reason,
            rewrite_enabled: rec.rewrite_headers_enabled,
        });
        self.state = RecordState::Idle;

        Ok(TrackOutcome::Recorded { final_path })
    }

    /// Poll at the configured cadence until a stop condition fires.
    async fn monitor_recording(
        &self,
        recording_id: &TrackId,
        cancel: &CancellationToken,
    ) -> StopReason {
        let rec = &self.settings.recording;
        let interval = Duration::from_secs_f64(rec.polling_interval_seconds);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return StopReason::Shutdown,
                _ = sleep(interval) => {}
            }
            let snapshot = self.snapshots.poll().await;
            if let Some(reason) =
                decide_stop(snapshot.as_ref(), recording_id, rec.finish_tail_ms)
            {
                return reason;
            }
        }
    }

    fn final_path_for(&self, meta: &TrackMetadata) -> PathBuf {
        let rec = &self.settings.recording;
        fs::target_dir(&rec.output_directory, meta, rec.organize_by_artist_album)
            .join(fs::output_filename(meta, &rec.default_format))
    }

    /// Abort an armed capture that never became a recording.
    async fn discard_armed(&mut self, mut handle: Box<dyn CaptureHandle>, temp_path: &PathBuf) {
        if let Err(e) = handle.stop().await {
            warn!("Capture stop error while discarding: {e:#}");
        }
        fs::remove_quiet(temp_path);
        self.state = RecordState::Idle;
    }
}

/// Stop decision for one polled snapshot, in priority order: playback
/// stopped or unknown, then track change, then tail-of-track. `None` keeps
/// recording.
pub fn decide_stop(
    snapshot: Option<&TrackSnapshot>,
    recording_id: &TrackId,
    finish_tail_ms: u64,
) -> Option<StopReason> {
    let snap = match snapshot {
        None => return Some(StopReason::Stopped),
        Some(s) => s,
    };
    if !snap.is_playing {
        return Some(StopReason::Stopped);
    }
    if snap.metadata.id != *recording_id {
        return Some(StopReason::TrackChanged);
    }
    let duration = snap.metadata.duration_ms;
    if duration > 0 && snap.progress_ms.saturating_add(finish_tail_ms) >= duration {
        return Some(StopReason::TrackFinished);
    }
    None
}
