use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{info, warn};

/// Everything the capture tool needs for one armed process.
#[derive(Debug, Clone)]
pub struct CaptureSpec {
    /// Input device string, e.g. a loopback cable.
    pub device: String,
    /// Hard cap on capture length. Exact stop timing is driven by polled
    /// playback state, so this is a safety ceiling, not a schedule.
    pub max_duration_secs: f64,
    /// Where the tool writes the container file.
    pub output_path: PathBuf,
    /// Output container. Only FLAC is supported in this build.
    pub format: String,
}

/// A running capture process. The only interaction points are the graceful
/// quit signal and forced termination; the audio bytes it writes are opaque.
#[async_trait::async_trait]
pub trait CaptureHandle: Send {
    /// Signal a graceful stop, wait bounded for a clean exit, and escalate
    /// to a forced kill if the timeout elapses. Safe to call more than once.
    async fn stop(&mut self) -> Result<()>;

    /// Whether the process has not yet exited.
    fn is_running(&mut self) -> bool;
}

/// Spawns capture processes. The trait seam exists so orchestration tests
/// can substitute a backend that fabricates output files.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn arm(&self, spec: CaptureSpec) -> Result<Box<dyn CaptureHandle>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// ffmpeg-backed capture: low-delay device input, 44.1 kHz stereo FLAC out.
pub struct FfmpegCapture {
    tool_path: String,
}

impl FfmpegCapture {
    pub fn new(tool_path: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }

    fn input_format() -> &'static str {
        if cfg!(target_os = "windows") {
            "dshow"
        } else if cfg!(target_os = "macos") {
            "avfoundation"
        } else {
            "alsa"
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FfmpegCapture {
    async fn arm(&self, spec: CaptureSpec) -> Result<Box<dyn CaptureHandle>> {
        if spec.format != "flac" {
            bail!("Only FLAC output is supported, got {:?}", spec.format);
        }

        let duration = format!("{:.3}", spec.max_duration_secs.max(0.1));
        let mut command = Command::new(&self.tool_path);
        command
            .arg("-y")
            .arg("-hide_banner")
            .args(["-fflags", "+nobuffer"])
            .args(["-flags", "low_delay"])
            .args(["-thread_queue_size", "1024"])
            .args(["-f", Self::input_format()])
            .args(["-i", &spec.device])
            .args(["-t", &duration])
            .args(["-ac", "2"])
            .args(["-ar", "44100"])
            .args(["-sample_fmt", "s32"])
            .args(["-acodec", "flac"])
            .arg("-vn")
            .arg(&spec.output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn capture tool {:?}", self.tool_path))?;
        let stdin = child.stdin.take();

        info!(
            "Capture armed: device={:?} cap={:.0}s -> {:?}",
            spec.device, spec.max_duration_secs, spec.output_path
        );

        Ok(Box::new(FfmpegHandle { child, stdin }))
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Grace period after the quit signal before escalating to a kill.
const GRACEFUL_EXIT_WAIT: Duration = Duration::from_secs(6);
/// Bounded wait after a forced kill.
const KILLED_EXIT_WAIT: Duration = Duration::from_secs(3);

struct FfmpegHandle {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait::async_trait]
impl CaptureHandle for FfmpegHandle {
    async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        // ffmpeg treats 'q' on stdin as a request to finish the current
        // container cleanly.
        if let Some(mut stdin) = self.stdin.take() {
            if stdin.write_all(b"q").await.is_ok() {
                let _ = stdin.flush().await;
            }
            drop(stdin);
        }

        match tokio::time::timeout(GRACEFUL_EXIT_WAIT, self.child.wait()).await {
            Ok(status) => {
                status.context("Capture process wait failed")?;
                return Ok(());
            }
            Err(_) => {
                warn!("Capture process ignored quit signal, killing");
            }
        }

        self.child.start_kill().context("Failed to kill capture process")?;
        match tokio::time::timeout(KILLED_EXIT_WAIT, self.child.wait()).await {
            Ok(status) => {
                status.context("Capture process wait failed after kill")?;
            }
            Err(_) => {
                warn!("Capture process did not exit after kill");
            }
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
