//! Thin REST adapter for the upstream playback service.
//!
//! Endpoint shapes follow the service's player API: `/me/player` for the
//! current playback state, `/me/player/play` to start a track, and paginated
//! `/playlists/{id}/tracks` / `/albums/{id}/tracks` listings. The adapter is
//! deliberately minimal; every orchestration test runs against a mock
//! [`RemotePlayback`](super::RemotePlayback) instead.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use super::links::SourceRef;
use super::snapshot::{TrackId, TrackMetadata, TrackPage, TrackSnapshot};
use crate::config::UpstreamConfig;

const PAGE_LIMIT: usize = 100;

pub struct HttpRemotePlayback {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpRemotePlayback {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }
}

#[async_trait::async_trait]
impl super::RemotePlayback for HttpRemotePlayback {
    async fn current_playback(&self) -> Result<Option<TrackSnapshot>> {
        let response = self
            .get("/me/player")
            .send()
            .await
            .context("Playback state request failed")?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            bail!("Playback state request returned {}", status);
        }

        let state: PlayerState = response
            .json()
            .await
            .context("Failed to parse playback state")?;

        Ok(state.item.map(|item| TrackSnapshot {
            metadata: item.into_metadata(),
            is_playing: state.is_playing,
            progress_ms: state.progress_ms.unwrap_or(0),
        }))
    }

    async fn start_playback(&self, track: &TrackId) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/me/player/play", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "track_ids": [track.as_str()] }))
            .send()
            .await
            .context("Play command failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Play command for {} returned {}", track, status);
        }
        Ok(())
    }

    async fn track(&self, id: &TrackId) -> Result<Option<TrackMetadata>> {
        let response = self
            .get(&format!("/tracks/{}", id))
            .send()
            .await
            .context("Track lookup failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            bail!("Track lookup for {} returned {}", id, status);
        }

        let item: TrackItem = response.json().await.context("Failed to parse track")?;
        Ok(Some(item.into_metadata()))
    }

    async fn source_page(&self, source: &SourceRef, offset: usize) -> Result<TrackPage> {
        let path = match source {
            SourceRef::Track(id) => {
                // Single-track sources have exactly one page.
                return Ok(TrackPage {
                    items: if offset == 0 { vec![id.clone()] } else { Vec::new() },
                    has_more: false,
                });
            }
            SourceRef::Playlist(id) => format!(
                "/playlists/{}/tracks?offset={}&limit={}",
                id, offset, PAGE_LIMIT
            ),
            SourceRef::Album(id) => format!(
                "/albums/{}/tracks?offset={}&limit={}",
                id, offset, PAGE_LIMIT
            ),
        };

        let response = self.get(&path).send().await.context("Listing request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("Listing request returned {}", status);
        }

        let page: ListingPage = response.json().await.context("Failed to parse listing")?;
        let items = page
            .items
            .into_iter()
            .filter_map(|entry| entry.id().map(TrackId::new))
            .collect();

        Ok(TrackPage {
            items,
            has_more: page.next.is_some(),
        })
    }
}

// Wire types, matching the upstream JSON shapes.

#[derive(Deserialize)]
struct PlayerState {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<TrackItem>,
}

#[derive(Deserialize)]
struct TrackItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    #[serde(default)]
    album: Option<AlbumItem>,
    track_number: Option<u32>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Deserialize)]
struct AlbumItem {
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    #[serde(default)]
    images: Vec<ImageRef>,
}

#[derive(Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Deserialize)]
struct ImageRef {
    url: String,
}

#[derive(Deserialize)]
struct ListingPage {
    #[serde(default)]
    items: Vec<ListingEntry>,
    next: Option<String>,
}

/// Playlist pages nest the track object; album pages list tracks directly.
#[derive(Deserialize)]
struct ListingEntry {
    id: Option<String>,
    track: Option<ListingTrack>,
}

#[derive(Deserialize)]
struct ListingTrack {
    id: Option<String>,
}

impl ListingEntry {
    fn id(self) -> Option<String> {
        self.track.and_then(|t| t.id).or(self.id)
    }
}

impl TrackItem {
    fn into_metadata(self) -> TrackMetadata {
        let album = self.album;
        TrackMetadata {
            id: TrackId::new(self.id),
            title: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album: album
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "Unknown Album".to_string()),
            album_artists: album
                .as_ref()
                .map(|a| a.artists.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default(),
            release_date: album.as_ref().and_then(|a| a.release_date.clone()),
            track_number: self.track_number,
            duration_ms: self.duration_ms,
            cover_url: album.and_then(|a| a.images.into_iter().next().map(|i| i.url)),
        }
    }
}
