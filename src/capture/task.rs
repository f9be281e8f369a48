use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::process::CaptureHandle;
use crate::playback::TrackMetadata;

/// Classified cause that ended a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Playback stopped or the snapshot went absent.
    Stopped,
    /// The snapshot's track identity no longer matches the recording.
    TrackChanged,
    /// Progress reached the tail of the track's reported duration.
    TrackFinished,
    /// The run was cancelled while recording.
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Stopped => "stopped",
            StopReason::TrackChanged => "track_changed",
            StopReason::TrackFinished => "track_finished",
            StopReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// One in-flight or completed recording.
///
/// Exclusively owned by the capture controller while recording; ownership
/// moves into the finalization queue the moment the task is enqueued, and
/// the controller never touches it afterward.
pub struct CaptureTask {
    /// The capture process. Already signaled to stop by the time the task
    /// is enqueued; finalization still waits for its exit.
    pub handle: Box<dyn CaptureHandle>,

    /// Where the capture tool wrote the audio, usually a scratch path.
    pub audio_path: PathBuf,

    /// Final artist/album-organized (or flat) destination.
    pub final_path: PathBuf,

    /// Track metadata observed after playback start.
    pub metadata: TrackMetadata,

    /// UTC timestamp taken when the process was armed, before playback.
    pub armed_at: DateTime<Utc>,

    /// Upstream duration plus the configured buffer, in seconds.
    pub expected_duration_secs: f64,

    pub stop_reason: StopReason,

    pub rewrite_enabled: bool,
}

/// Per-track failure kinds that abort only the current track.
#[derive(Debug, thiserror::Error)]
pub enum TrackFailure {
    /// The remote service rejected the play command.
    #[error("playback start rejected for {link}: {reason}")]
    PlaybackStart { link: String, reason: String },

    /// No matching track identity observed after starting playback.
    #[error("no confirmed metadata after starting {link}")]
    MetadataUnresolved { link: String },

    /// The capture fell short of the upstream-reported duration.
    #[error("recorded {recorded_secs:.1}s of an expected {expected_secs:.1}s track")]
    IncompleteCapture {
        recorded_secs: f64,
        expected_secs: f64,
    },
}

/// What became of one track in the sequence.
pub enum TrackOutcome {
    /// A capture was produced and handed to finalization.
    Recorded { final_path: PathBuf },
    /// An existing recording with a matching identity tag was kept.
    Skipped { final_path: PathBuf },
    /// The track failed; the sequence advances.
    Failed(TrackFailure),
}
