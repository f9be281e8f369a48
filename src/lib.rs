pub mod capture;
pub mod config;
pub mod driver;
pub mod finalize;
pub mod fs;
pub mod playback;

pub use capture::{
    decide_stop, CaptureBackend, CaptureController, CaptureHandle, CaptureSpec, CaptureTask,
    FfmpegCapture, RecordState, StandbyArmer, StopReason, TrackFailure, TrackOutcome,
};
pub use config::Settings;
pub use driver::{FollowRecorder, RunSummary, SequentialDriver};
pub use finalize::{
    FailureLog, FinalizationLogEntry, FinalizationPipeline, FinalizeOutcome, FinalizeSender,
    MetadataLog,
};
pub use playback::{
    HttpRemotePlayback, RemotePlayback, SnapshotSource, SourceRef, TrackId, TrackMetadata,
    TrackPage, TrackSnapshot,
};
