use serde::{Deserialize, Serialize};

/// Opaque upstream track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata for one track, as reported by the upstream service.
///
/// Captured once per poll or preview and cloned from there; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Upstream track identity.
    pub id: TrackId,

    /// Track title.
    pub title: String,

    /// Performing artists, in upstream order.
    pub artists: Vec<String>,

    /// Album title.
    pub album: String,

    /// Album-level artists. Falls back to `artists` when empty.
    pub album_artists: Vec<String>,

    /// Album release date as reported upstream (`YYYY` or `YYYY-MM-DD`).
    pub release_date: Option<String>,

    /// Position of the track on its album.
    pub track_number: Option<u32>,

    /// Total track duration in milliseconds. Zero when unknown.
    pub duration_ms: u64,

    /// Cover artwork URL, if the album carries one.
    pub cover_url: Option<String>,
}

impl TrackMetadata {
    /// Joined artist list for display and tagging.
    pub fn artist_str(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }

    /// Joined album-artist list, falling back to the track artists.
    pub fn album_artist_str(&self) -> String {
        if self.album_artists.is_empty() {
            self.artist_str()
        } else {
            self.album_artists.join(", ")
        }
    }

    /// Release year extracted from the upstream release date.
    pub fn release_year(&self) -> Option<String> {
        self.release_date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .filter(|y| !y.is_empty())
            .map(str::to_string)
    }
}

/// Immutable view of current playback at poll time.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    /// Metadata of the item currently loaded in the player.
    pub metadata: TrackMetadata,

    /// Whether the player reports active playback.
    pub is_playing: bool,

    /// Elapsed progress into the track, in milliseconds.
    pub progress_ms: u64,
}

/// One page of track identifiers from a playlist or album listing.
#[derive(Debug, Clone)]
pub struct TrackPage {
    pub items: Vec<TrackId>,
    /// Whether the upstream listing has further pages.
    pub has_more: bool,
}
