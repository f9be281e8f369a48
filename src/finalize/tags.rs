use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use crate::playback::{TrackId, TrackMetadata};

/// Durable identity tag embedded in every finalized file; read back on
/// reruns to skip tracks that are already recorded.
pub const IDENTITY_TAG: &str = "AURORA_TRACK_ID";

/// Alternate field names accepted when reading identity from older files.
const IDENTITY_ALIASES: &[&str] = &["aurora_track_id", "trackid", "track_id"];

/// Whether `path` is an existing recording of `track`: the file must clear
/// the size floor and carry a matching embedded identity tag. Any read
/// error means "not recorded".
pub fn is_already_recorded(path: &Path, track: &TrackId, min_bytes: u64) -> bool {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size < min_bytes {
        return false;
    }
    let tag = match metaflac::Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(_) => return false,
    };
    let comments = match tag.vorbis_comments() {
        Some(vc) => &vc.comments,
        None => return false,
    };
    for (key, values) in comments {
        let known = key.eq_ignore_ascii_case(IDENTITY_TAG)
            || IDENTITY_ALIASES.iter().any(|a| key.eq_ignore_ascii_case(a));
        if known {
            return values
                .first()
                .map(|v| v.trim() == track.as_str())
                .unwrap_or(false);
        }
    }
    false
}

/// Download cover artwork to `dest`. Best-effort: any failure returns false.
pub async fn download_cover(client: &reqwest::Client, url: &str, dest: &Path) -> bool {
    let bytes = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cover download read failed: {e}");
                return false;
            }
        },
        Err(e) => {
            warn!("Cover download failed: {e}");
            return false;
        }
    };
    if std::fs::write(dest, &bytes).is_err() {
        return false;
    }
    true
}

/// Embed descriptive tags, the identity tag, and optional artwork into a
/// finalized FLAC file.
pub fn embed_tags(
    audio_path: &Path,
    meta: &TrackMetadata,
    cover_path: Option<&Path>,
) -> Result<()> {
    let mut tag = metaflac::Tag::read_from_path(audio_path)
        .with_context(|| format!("Failed to read FLAC container {:?}", audio_path))?;

    tag.set_vorbis("TITLE", vec![meta.title.clone()]);
    tag.set_vorbis("ARTIST", vec![meta.artist_str()]);
    tag.set_vorbis("ALBUM", vec![meta.album.clone()]);
    tag.set_vorbis("ALBUMARTIST", vec![meta.album_artist_str()]);
    tag.set_vorbis("COMPOSER", vec![meta.album_artist_str()]);
    tag.set_vorbis("PERFORMER", vec![meta.album_artist_str()]);
    if let Some(year) = meta.release_year() {
        tag.set_vorbis("DATE", vec![year.clone()]);
        tag.set_vorbis("YEAR", vec![year]);
    }
    if let Some(number) = meta.track_number {
        tag.set_vorbis("TRACKNUMBER", vec![number.to_string()]);
    }
    tag.set_vorbis(IDENTITY_TAG, vec![meta.id.as_str().to_string()]);

    if let Some(cover) = cover_path {
        if let Ok(data) = std::fs::read(cover) {
            tag.add_picture(
                "image/jpeg",
                metaflac::block::PictureType::CoverFront,
                data,
            );
        }
    }

    tag.save()
        .with_context(|| format!("Failed to write tags to {:?}", audio_path))?;
    Ok(())
}
