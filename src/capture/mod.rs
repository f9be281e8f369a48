pub mod controller;
pub mod process;
pub mod standby;
pub mod task;

pub use controller::{decide_stop, CaptureController, RecordState};
pub use process::{CaptureBackend, CaptureHandle, CaptureSpec, FfmpegCapture};
pub use standby::{StandbyArmer, StandbyCapture};
pub use task::{CaptureTask, StopReason, TrackFailure, TrackOutcome};
