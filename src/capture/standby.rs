use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::process::{CaptureBackend, CaptureHandle, CaptureSpec};
use crate::config::Settings;
use crate::fs;

/// An idle pre-armed capture, not yet associated with any track.
pub struct StandbyCapture {
    pub handle: Box<dyn CaptureHandle>,
    /// Scratch file under `__standby__`. Never a finalized recording.
    pub scratch_path: PathBuf,
}

/// Keeps at most one capture process pre-armed during silence so follow
/// mode can start a recording with zero spawn latency.
///
/// `ensure_armed`, `adopt` and `shutdown` are the only mutation points.
pub struct StandbyArmer {
    settings: Arc<Settings>,
    backend: Arc<dyn CaptureBackend>,
    armed: Option<StandbyCapture>,
    // Distinguishes scratch files armed within the same second, which is
    // the normal case right after an adoption.
    arm_counter: u64,
}

impl StandbyArmer {
    pub fn new(settings: Arc<Settings>, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            settings,
            backend,
            armed: None,
            arm_counter: 0,
        }
    }

    /// Arm a fresh standby process if none is alive. A process that already
    /// exited (duration cap reached) is discarded and replaced.
    pub async fn ensure_armed(&mut self) -> Result<()> {
        let alive = self
            .armed
            .as_mut()
            .map(|standby| standby.handle.is_running())
            .unwrap_or(false);
        if alive {
            return Ok(());
        }
        if self.armed.is_some() {
            warn!("Standby capture expired, re-arming");
            self.shutdown().await;
        }

        let settings = self.settings.clone();
        let rec = &settings.recording;
        let standby_dir = rec.output_directory.join(fs::STANDBY_DIR);
        fs::ensure_dir(&standby_dir)?;
        self.arm_counter += 1;
        let scratch_path = standby_dir.join(format!(
            "standby_{}_{:03}.{}",
            Utc::now().timestamp(),
            self.arm_counter,
            rec.default_format
        ));

        let handle = self
            .backend
            .arm(CaptureSpec {
                device: rec.audio_device.clone(),
                max_duration_secs: rec.standby_seconds.max(10.0),
                output_path: scratch_path.clone(),
                format: rec.default_format.clone(),
            })
            .await?;

        info!("Standby capture armed -> {:?}", scratch_path);
        self.armed = Some(StandbyCapture {
            handle,
            scratch_path,
        });
        Ok(())
    }

    /// Hand the idle process over to become the active recording. The armer
    /// is left empty; callers re-arm right afterward.
    pub fn adopt(&mut self) -> Option<StandbyCapture> {
        self.armed.take()
    }

    /// Kill any standby process and delete its scratch file.
    pub async fn shutdown(&mut self) {
        if let Some(mut standby) = self.armed.take() {
            if let Err(e) = standby.handle.stop().await {
                warn!("Standby stop error: {e:#}");
            }
            fs::remove_quiet(&standby.scratch_path);
        }
    }
}
