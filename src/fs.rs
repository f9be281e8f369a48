use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::playback::TrackMetadata;

/// Scratch directory for captures that have been armed but not yet finalized.
pub const ARMING_DIR: &str = "__arming__";

/// Scratch directory for idle standby captures (follow mode).
pub const STANDBY_DIR: &str = "__standby__";

/// Append-only metadata log, one JSON object per finalized capture.
pub const METADATA_LOG: &str = "aurora_metadata.jsonl";

/// Append-only list of failed track links, one per line.
pub const FAILED_TRACKS: &str = "failed_tracks.txt";

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))
}

/// Reduce a free-form title or artist name to a safe filename fragment.
///
/// Anything outside alphanumerics, space, `.`, `_`, `-` becomes `_`; runs of
/// separators collapse; the result is capped at `max_len` characters.
pub fn sanitize_for_filesystem(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_sep = false;
    for c in out.trim().chars() {
        let sep = c == '_' || c == ' ';
        if sep && prev_sep {
            collapsed.pop();
            collapsed.push('_');
            continue;
        }
        prev_sep = sep;
        collapsed.push(c);
    }
    collapsed
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// `NN Sanitized Title.fmt` — tracks without a number get the `00` prefix.
pub fn output_filename(meta: &TrackMetadata, format: &str) -> String {
    let prefix = match meta.track_number {
        Some(n) if n > 0 => format!("{:02}", n),
        _ => "00".to_string(),
    };
    let title = sanitize_for_filesystem(&meta.title, 70);
    format!("{} {}.{}", prefix, title, format)
}

/// Final target directory for a track, `<root>/<artist>/<album>` when
/// organizing by artist, otherwise the output root itself.
pub fn target_dir(root: &Path, meta: &TrackMetadata, organize: bool) -> PathBuf {
    if organize {
        let artist = sanitize_for_filesystem(
            meta.artists.first().map(String::as_str).unwrap_or("Unknown Artist"),
            70,
        );
        let album = sanitize_for_filesystem(&meta.album, 70);
        root.join(artist).join(album)
    } else {
        root.to_path_buf()
    }
}

/// Move `src` to `dst`, creating parents. Rename first; encoders may still be
/// releasing the file, so fall back to copy+delete and retry once after a
/// short delay.
pub async fn robust_move(src: &Path, dst: &Path) -> Result<PathBuf> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(dst.to_path_buf());
    }
    match copy_and_delete(src, dst) {
        Ok(()) => Ok(dst.to_path_buf()),
        Err(_) => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            copy_and_delete(src, dst)
                .with_context(|| format!("Failed to move {:?} -> {:?}", src, dst))?;
            Ok(dst.to_path_buf())
        }
    }
}

fn copy_and_delete(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).with_context(|| format!("Failed to copy {:?}", src))?;
    fs::remove_file(src).with_context(|| format!("Failed to remove {:?}", src))?;
    Ok(())
}

/// Best-effort delete; missing files are fine.
pub fn remove_quiet(path: &Path) {
    let _ = fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_for_filesystem("AC/DC: Live!", 70), "AC_DC_Live");
    }

    #[test]
    fn sanitize_collapses_separator_runs() {
        assert_eq!(sanitize_for_filesystem("a   b__c", 70), "a_b_c");
    }

    #[test]
    fn sanitize_truncates_to_max_len() {
        let long = "x".repeat(120);
        assert_eq!(sanitize_for_filesystem(&long, 70).len(), 70);
    }
}
