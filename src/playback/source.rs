use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use super::links::SourceRef;
use super::snapshot::{TrackId, TrackMetadata, TrackPage, TrackSnapshot};

/// Remote playback service contract.
///
/// The service owns playback; this crate only reads its state, issues play
/// commands, and lists the tracks of a source. Implementations handle their
/// own retries; callers get a single best-effort result with bounded latency.
#[async_trait::async_trait]
pub trait RemotePlayback: Send + Sync {
    /// Currently loaded item, its progress, and the play/pause flag.
    /// `None` when nothing is loaded in the player.
    async fn current_playback(&self) -> Result<Option<TrackSnapshot>>;

    /// Start playing the given track on the active device.
    async fn start_playback(&self, track: &TrackId) -> Result<()>;

    /// Preview metadata for a track that is not necessarily playing.
    async fn track(&self, id: &TrackId) -> Result<Option<TrackMetadata>>;

    /// One page of a playlist or album listing. For a single-track source
    /// the page holds that track and `has_more` is false.
    async fn source_page(&self, source: &SourceRef, offset: usize) -> Result<TrackPage>;
}

/// Poll-side adapter over [`RemotePlayback`].
///
/// Transient upstream errors are logged and collapse to `None` so the
/// driving loop treats them as "unknown state" and keeps its previous
/// decision context. Owned by the single driving loop, which guarantees at
/// most one outstanding poll.
pub struct SnapshotSource {
    remote: Arc<dyn RemotePlayback>,
}

impl SnapshotSource {
    pub fn new(remote: Arc<dyn RemotePlayback>) -> Self {
        Self { remote }
    }

    /// The wrapped service, for the command side (play, previews, listings).
    pub fn remote(&self) -> &dyn RemotePlayback {
        self.remote.as_ref()
    }

    pub async fn poll(&self) -> Option<TrackSnapshot> {
        match self.remote.current_playback().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Playback poll failed: {e:#}");
                None
            }
        }
    }
}
