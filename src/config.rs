use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide configuration snapshot. Loaded once at startup and treated
/// as read-only for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub upstream: UpstreamConfig,
    pub recording: RecordingConfig,
}

/// Remote playback service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the playback-state API.
    pub api_base_url: String,
    /// Bearer token for the API. Empty means unauthenticated (tests/mocks).
    pub access_token: String,
    /// Web player base URL, used to render resolvable track links in the
    /// failure list.
    pub web_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Root directory for finalized recordings.
    pub output_directory: PathBuf,
    /// Output container. FLAC is the only supported format in this build.
    pub default_format: String,
    /// Cadence of the playback-state poll loop.
    pub polling_interval_seconds: f64,
    /// Capture input device string, passed through to the capture tool.
    pub audio_device: String,
    /// Path to the capture tool binary.
    pub capture_tool_path: String,
    /// Floor applied to captures whose upstream duration is unknown.
    pub min_duration_seconds: f64,
    /// Added to the upstream track duration when computing the expected
    /// capture length. May be negative to compensate encoder startup drift.
    pub recording_buffer_seconds: f64,
    /// Skip tracks whose final file already exists with a matching identity tag.
    pub skip_existing_file: bool,
    /// Organize output as `<artist>/<album>/` under the root.
    pub organize_by_artist_album: bool,
    /// Re-encode the container with stream copy after capture to strip
    /// corrupt metadata left by the capture tool.
    pub rewrite_headers_enabled: bool,
    /// Delay between arming the capture and issuing the play command.
    pub preroll_ms: u64,
    /// Pause between tracks; also the post-stop flush window.
    pub gap_seconds: f64,
    /// Maximum duration of an idle standby capture (follow mode).
    pub standby_seconds: f64,
    /// A capture shorter than upstream duration minus this is discarded.
    pub duration_tolerance_seconds: f64,
    /// Progress within this distance of the track duration counts as finished.
    pub finish_tail_ms: u64,
}

impl Settings {
    /// Load settings from a TOML file layered over the defaults. A missing
    /// file yields pure defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                api_base_url: "https://api.playback.localhost/v1".to_string(),
                access_token: String::new(),
                web_base_url: "https://play.playback.localhost".to_string(),
            },
            recording: RecordingConfig {
                output_directory: PathBuf::from("Recordings"),
                default_format: "flac".to_string(),
                polling_interval_seconds: 0.35,
                audio_device: "audio=CABLE Output (VB-Audio Virtual Cable)".to_string(),
                capture_tool_path: "ffmpeg".to_string(),
                min_duration_seconds: 30.0,
                recording_buffer_seconds: -0.20,
                skip_existing_file: true,
                organize_by_artist_album: true,
                rewrite_headers_enabled: true,
                preroll_ms: 180,
                gap_seconds: 5.0,
                standby_seconds: 900.0,
                duration_tolerance_seconds: 3.0,
                finish_tail_ms: 200,
            },
        }
    }
}
