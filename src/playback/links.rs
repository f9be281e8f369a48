use super::snapshot::TrackId;

/// A user-supplied playback source: one track, or an ordered collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Track(TrackId),
    Playlist(String),
    Album(String),
}

impl SourceRef {
    /// Parse a web link (`…/track/<id>?…`) or URI (`<scheme>:track:<id>`).
    /// Returns `None` for anything that names neither a track, a playlist,
    /// nor an album.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        for (kind, make) in [
            ("track", Self::track as fn(String) -> Self),
            ("playlist", Self::playlist),
            ("album", Self::album),
        ] {
            let path_marker = format!("{}/", kind);
            if let Some(rest) = input.split(&path_marker).nth(1) {
                let id = rest.split(['?', '/']).next().unwrap_or_default();
                if !id.is_empty() {
                    return Some(make(id.to_string()));
                }
            }
            let uri_marker = format!(":{}:", kind);
            if input.contains(&uri_marker) {
                let id = input.rsplit(':').next().unwrap_or_default();
                if !id.is_empty() {
                    return Some(make(id.to_string()));
                }
            }
        }
        None
    }

    fn track(id: String) -> Self {
        Self::Track(TrackId::new(id))
    }

    fn playlist(id: String) -> Self {
        Self::Playlist(id)
    }

    fn album(id: String) -> Self {
        Self::Album(id)
    }
}

/// Canonical web link for a track, used when recording failures so the
/// entries stay resolvable in a browser.
pub fn track_link(web_base_url: &str, id: &TrackId) -> String {
    format!("{}/track/{}", web_base_url.trim_end_matches('/'), id)
}
