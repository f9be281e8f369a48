use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// A rewrite must produce at least this much output to replace the original.
const MIN_REWRITE_BYTES: u64 = 1024;

/// Bound on the stream-copy re-encode.
const REWRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Re-encodes a finished container with stream copy to strip the corrupt
/// metadata the capture tool leaves behind when terminated mid-write.
pub struct HeaderRewriter {
    tool_path: String,
}

impl HeaderRewriter {
    pub fn new(tool_path: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }

    /// Rewrite in place. The original is only removed after the rewrite
    /// produced a confirmed, non-trivial replacement; any failure leaves the
    /// original untouched and returns false.
    pub async fn rewrite(&self, audio_path: &Path) -> bool {
        if file_size(audio_path) < MIN_REWRITE_BYTES {
            return false;
        }
        let temp = rewrite_temp_path(audio_path);
        let replaced = self.run_copy(audio_path, &temp).await
            && file_size(&temp) >= MIN_REWRITE_BYTES
            && replace_original(audio_path, &temp);
        if !replaced {
            crate::fs::remove_quiet(&temp);
        }
        replaced
    }

    async fn run_copy(&self, src: &Path, dst: &Path) -> bool {
        let result = Command::new(&self.tool_path)
            .arg("-y")
            .arg("-i")
            .arg(src)
            .args(["-acodec", "copy"])
            .arg("-vn")
            .args(["-map_metadata", "-1"])
            .arg(dst)
            .output();

        match tokio::time::timeout(REWRITE_TIMEOUT, result).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                warn!("Header rewrite spawn failed: {e}");
                false
            }
            Err(_) => {
                warn!("Header rewrite timed out for {:?}", src);
                false
            }
        }
    }
}

fn rewrite_temp_path(audio_path: &Path) -> PathBuf {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = audio_path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    audio_path.with_file_name(format!("{}_rewrite_temp.{}", stem, ext))
}

fn replace_original(audio_path: &Path, temp: &Path) -> bool {
    if std::fs::remove_file(audio_path).is_err() {
        return false;
    }
    std::fs::rename(temp, audio_path).is_ok()
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
