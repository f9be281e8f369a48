use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{
    decide_stop, CaptureBackend, CaptureController, CaptureTask, StandbyArmer, StopReason,
    TrackOutcome,
};
use crate::config::Settings;
use crate::finalize::{FailureLog, FinalizeSender};
use crate::fs;
use crate::playback::{
    track_link, RemotePlayback, SnapshotSource, SourceRef, TrackId, TrackMetadata,
};

/// A finished recording below this size is logged as failed even when no
/// earlier failure was recorded.
const POST_CAPTURE_MIN_BYTES: u64 = 50 * 1024;

/// Counts for one sequential run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub recorded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives an ordered list of tracks through the capture controller, one at
/// a time, with an inter-track gap.
pub struct SequentialDriver {
    settings: Arc<Settings>,
    remote: Arc<dyn RemotePlayback>,
    controller: CaptureController,
    failures: FailureLog,
}

impl SequentialDriver {
    pub fn new(
        settings: Arc<Settings>,
        remote: Arc<dyn RemotePlayback>,
        backend: Arc<dyn CaptureBackend>,
        finalize: FinalizeSender,
        failures: FailureLog,
    ) -> Self {
        let controller = CaptureController::new(
            settings.clone(),
            backend,
            SnapshotSource::new(remote.clone()),
            finalize,
            failures.clone(),
        );
        Self {
            settings,
            remote,
            controller,
            failures,
        }
    }

    /// Flatten a track, playlist, or album source into an ordered identifier
    /// list, following pagination while the upstream reports more pages.
    pub async fn resolve_tracks(&self, source: &SourceRef) -> Result<Vec<TrackId>> {
        let mut tracks: Vec<TrackId> = Vec::new();
        loop {
            let page = self.remote.source_page(source, tracks.len()).await?;
            let fetched = page.items.len();
            tracks.extend(page.items);
            if !page.has_more || fetched == 0 {
                break;
            }
        }
        Ok(tracks)
    }

    /// Record every track of `source` in order, starting at the 1-based
    /// `start_index`. Per-track failures are isolated; only cancellation
    /// ends the run early.
    pub async fn run(
        &mut self,
        source: &SourceRef,
        start_index: usize,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let tracks = self.resolve_tracks(source).await?;
        if tracks.is_empty() {
            warn!("Source has no playable tracks");
            return Ok(RunSummary::default());
        }
        info!("Sequential mode: {} tracks found", tracks.len());

        let start = start_index.max(1);
        if start > tracks.len() {
            bail!(
                "Start index {} is larger than the track list ({})",
                start,
                tracks.len()
            );
        }
        if start > 1 {
            info!("Starting from track #{}", start);
        }

        let gap = Duration::from_secs_f64(self.settings.recording.gap_seconds);
        let mut summary = RunSummary::default();
        let remaining = &tracks[start - 1..];

        for (i, track) in remaining.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancelled, stopping after {} tracks", i);
                break;
            }

            info!("({}/{}) {}", start + i, tracks.len(), track);
            let preview = self.preview(track).await;
            let outcome = self
                .controller
                .record_track(track, preview.as_ref(), cancel)
                .await?;

            match outcome {
                TrackOutcome::Recorded { final_path } => {
                    summary.recorded += 1;
                    // The finalize worker runs concurrently and may not have
                    // moved the file into place yet; a missing file is its
                    // problem to classify. An output that exists but never
                    // grew past the floor is a failure here and now.
                    if let Ok(meta) = std::fs::metadata(&final_path) {
                        if meta.len() < POST_CAPTURE_MIN_BYTES {
                            let link =
                                track_link(&self.settings.upstream.web_base_url, track);
                            warn!("FAILED (empty or too small file) -> {}", link);
                            self.failures.append(&link);
                        }
                    }
                }
                TrackOutcome::Skipped { .. } => summary.skipped += 1,
                TrackOutcome::Failed(failure) => {
                    warn!("Track failed: {}", failure);
                    summary.failed += 1;
                }
            }

            if i + 1 < remaining.len() {
                info!("Waiting {:.1}s before next track", gap.as_secs_f64());
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(gap) => {}
                }
            }
        }

        Ok(summary)
    }

    async fn preview(&self, track: &TrackId) -> Option<TrackMetadata> {
        match self.remote.track(track).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Preview lookup failed for {}: {e:#}", track);
                None
            }
        }
    }
}

struct ActiveRecording {
    handle: Box<dyn crate::capture::CaptureHandle>,
    scratch_path: std::path::PathBuf,
    final_path: std::path::PathBuf,
    metadata: TrackMetadata,
    armed_at: chrono::DateTime<Utc>,
    expected_duration_secs: f64,
}

/// Follow mode: record whatever the player plays, with a standby capture
/// pre-armed during silence so nothing is missed at track start.
pub struct FollowRecorder {
    settings: Arc<Settings>,
    snapshots: SnapshotSource,
    finalize: FinalizeSender,
    standby: StandbyArmer,
}

impl FollowRecorder {
    pub fn new(
        settings: Arc<Settings>,
        remote: Arc<dyn RemotePlayback>,
        backend: Arc<dyn CaptureBackend>,
        finalize: FinalizeSender,
    ) -> Self {
        let standby = StandbyArmer::new(settings.clone(), backend);
        Self {
            settings,
            snapshots: SnapshotSource::new(remote),
            finalize,
            standby,
        }
    }

    /// Monitor playback until cancelled. On shutdown any in-progress
    /// recording is enqueued with the `shutdown` stop reason and the
    /// standby capture is dropped.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        let rec = self.settings.recording.clone();
        let interval = Duration::from_secs_f64(rec.polling_interval_seconds);
        let mut active: Option<ActiveRecording> = None;

        info!("Follow mode: monitoring playback (standby pre-arm)");
        self.standby.ensure_armed().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }
            let snapshot = self.snapshots.poll().await;

            if active.is_some() {
                let reason = active.as_ref().and_then(|recording| {
                    decide_stop(snapshot.as_ref(), &recording.metadata.id, rec.finish_tail_ms)
                });
                if let Some(reason) = reason {
                    if let Some(recording) = active.take() {
                        self.finish(recording, reason).await;
                    }
                }
                continue;
            }

            let playing = snapshot.filter(|s| s.is_playing);
            if let Some(snap) = playing {
                if let Err(e) = self.standby.ensure_armed().await {
                    warn!("Standby arm failed: {e:#}");
                    continue;
                }
                let adopted = match self.standby.adopt() {
                    Some(standby) => standby,
                    None => continue,
                };

                let meta = snap.metadata;
                let final_path =
                    fs::target_dir(&rec.output_directory, &meta, rec.organize_by_artist_album)
                        .join(fs::output_filename(&meta, &rec.default_format));
                info!("Adopting standby capture: {} - {}", meta.artist_str(), meta.title);

                active = Some(ActiveRecording {
                    handle: adopted.handle,
                    scratch_path: adopted.scratch_path,
                    final_path,
                    expected_duration_secs: meta.duration_ms as f64 / 1000.0
                        + rec.recording_buffer_seconds,
                    metadata: meta,
                    armed_at: Utc::now(),
                });

                // Always ready for the next unattended track.
                if let Err(e) = self.standby.ensure_armed().await {
                    warn!("Standby re-arm failed: {e:#}");
                }
            } else if let Err(e) = self.standby.ensure_armed().await {
                warn!("Standby arm failed: {e:#}");
            }
        }

        if let Some(recording) = active.take() {
            self.finish(recording, StopReason::Shutdown).await;
        }
        self.standby.shutdown().await;
        Ok(())
    }

    async fn finish(&mut self, mut recording: ActiveRecording, reason: StopReason) {
        if let Err(e) = recording.handle.stop().await {
            warn!("Capture stop error: {e:#}");
        }
        self.finalize.enqueue(CaptureTask {
            handle: recording.handle,
            audio_path: recording.scratch_path,
            final_path: recording.final_path,
            metadata: recording.metadata,
            armed_at: recording.armed_at,
            expected_duration_secs: recording.expected_duration_secs,
            stop_reason: reason,
            rewrite_enabled: self.settings.recording.rewrite_headers_enabled,
        });
    }
}
