// Shared test doubles: a scripted remote playback service and a capture
// backend that fabricates output files instead of spawning processes.

#![allow(dead_code)]

use anyhow::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use aurora::capture::{CaptureBackend, CaptureHandle, CaptureSpec};
use aurora::playback::{
    RemotePlayback, SourceRef, TrackId, TrackMetadata, TrackPage, TrackSnapshot,
};
use aurora::Settings;

/// Remote playback double driven by a snapshot script: entries are consumed
/// in order and the last one repeats forever.
pub struct MockRemote {
    script: Mutex<VecDeque<Option<TrackSnapshot>>>,
    previews: Mutex<HashMap<String, TrackMetadata>>,
    pages: Mutex<VecDeque<TrackPage>>,
    fail_start: Mutex<HashSet<String>>,
    pub started: Mutex<Vec<String>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            previews: Mutex::new(HashMap::new()),
            pages: Mutex::new(VecDeque::new()),
            fail_start: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn push_snapshot(&self, snapshot: Option<TrackSnapshot>) {
        self.script.lock().unwrap().push_back(snapshot);
    }

    pub fn add_preview(&self, meta: TrackMetadata) {
        self.previews
            .lock()
            .unwrap()
            .insert(meta.id.as_str().to_string(), meta);
    }

    pub fn push_page(&self, items: &[&str], has_more: bool) {
        self.pages.lock().unwrap().push_back(TrackPage {
            items: items.iter().map(|id| TrackId::new(*id)).collect(),
            has_more,
        });
    }

    pub fn fail_start_for(&self, id: &str) {
        self.fail_start.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait::async_trait]
impl RemotePlayback for MockRemote {
    async fn current_playback(&self) -> Result<Option<TrackSnapshot>> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap())
        } else {
            Ok(script.front().cloned().flatten())
        }
    }

    async fn start_playback(&self, track: &TrackId) -> Result<()> {
        self.started
            .lock()
            .unwrap()
            .push(track.as_str().to_string());
        if self.fail_start.lock().unwrap().contains(track.as_str()) {
            anyhow::bail!("player rejected the play command");
        }
        Ok(())
    }

    async fn track(&self, id: &TrackId) -> Result<Option<TrackMetadata>> {
        Ok(self.previews.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn source_page(&self, source: &SourceRef, offset: usize) -> Result<TrackPage> {
        if let SourceRef::Track(id) = source {
            return Ok(TrackPage {
                items: if offset == 0 { vec![id.clone()] } else { Vec::new() },
                has_more: false,
            });
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TrackPage {
                items: Vec::new(),
                has_more: false,
            }))
    }
}

/// Capture backend double: "arming" writes `file_bytes` zeros to the output
/// path immediately, standing in for a recording process.
pub struct MockCaptureBackend {
    pub spawned: AtomicUsize,
    file_bytes: usize,
}

impl MockCaptureBackend {
    pub fn new(file_bytes: usize) -> Self {
        Self {
            spawned: AtomicUsize::new(0),
            file_bytes,
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MockCaptureBackend {
    async fn arm(&self, spec: CaptureSpec) -> Result<Box<dyn CaptureHandle>> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        std::fs::write(&spec.output_path, vec![0u8; self.file_bytes])?;
        Ok(Box::new(MockHandle { running: true }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockHandle {
    running: bool,
}

#[async_trait::async_trait]
impl CaptureHandle for MockHandle {
    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.running
    }
}

/// A handle for tasks built directly in tests, already exited.
pub struct IdleHandle;

#[async_trait::async_trait]
impl CaptureHandle for IdleHandle {
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        false
    }
}

/// Defaults shrunk to test timescales: fast polling, no preroll, tiny gap.
pub fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.recording.output_directory = root.to_path_buf();
    settings.recording.polling_interval_seconds = 0.01;
    settings.recording.preroll_ms = 0;
    settings.recording.gap_seconds = 0.05;
    settings.recording.rewrite_headers_enabled = false;
    settings.recording.finish_tail_ms = 100;
    settings
}

pub fn track_meta(id: &str, title: &str, artist: &str, duration_ms: u64) -> TrackMetadata {
    TrackMetadata {
        id: TrackId::new(id),
        title: title.to_string(),
        artists: vec![artist.to_string()],
        album: "Test Album".to_string(),
        album_artists: Vec::new(),
        release_date: Some("2021-05-01".to_string()),
        track_number: Some(1),
        duration_ms,
        cover_url: None,
    }
}

pub fn playing(meta: &TrackMetadata, progress_ms: u64) -> Option<TrackSnapshot> {
    Some(TrackSnapshot {
        metadata: meta.clone(),
        is_playing: true,
        progress_ms,
    })
}

pub fn paused(meta: &TrackMetadata, progress_ms: u64) -> Option<TrackSnapshot> {
    Some(TrackSnapshot {
        metadata: meta.clone(),
        is_playing: false,
        progress_ms,
    })
}

/// Minimal valid FLAC container: magic plus an empty STREAMINFO block, then
/// `pad` bytes standing in for audio frames.
pub fn write_min_flac(path: &Path, pad: usize) -> Result<()> {
    let mut data = Vec::with_capacity(42 + pad);
    data.extend_from_slice(b"fLaC");
    data.push(0x80); // last-metadata-block flag, type 0 (STREAMINFO)
    data.extend_from_slice(&[0, 0, 34]);
    data.extend_from_slice(&[0u8; 34]);
    data.extend(std::iter::repeat(0u8).take(pad));
    std::fs::write(path, data)?;
    Ok(())
}

/// Parsed lines of the jsonl metadata log; empty if the log was never written.
pub fn read_log_entries(root: &Path) -> Vec<serde_json::Value> {
    let path = root.join("aurora_metadata.jsonl");
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("valid jsonl entry"))
        .collect()
}

pub fn read_failures(root: &Path) -> Vec<String> {
    let path = root.join("failed_tracks.txt");
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content.lines().map(str::to_string).collect()
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
