// Integration tests for the finalization pipeline: scratch-to-final moves,
// plausibility and duration validation, tagging, and drain-aware shutdown.

mod common;

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use aurora::{
    CaptureTask, FailureLog, FinalizationPipeline, StopReason, TrackId,
};
use common::*;

fn scratch_task(
    root: &Path,
    name: &str,
    track: &str,
    duration_ms: u64,
    armed_secs_ago: i64,
) -> Result<CaptureTask> {
    let arming = root.join("__arming__");
    std::fs::create_dir_all(&arming)?;
    let audio_path = arming.join(format!("{name}.flac"));
    write_min_flac(&audio_path, 200 * 1024)?;

    let meta = track_meta(track, "Song One", "Artist", duration_ms);
    let final_path = root
        .join("Artist")
        .join("Test Album")
        .join("01 Song One.flac");

    Ok(CaptureTask {
        handle: Box::new(IdleHandle),
        audio_path,
        final_path,
        metadata: meta,
        armed_at: Utc::now() - chrono::Duration::seconds(armed_secs_ago),
        expected_duration_secs: duration_ms as f64 / 1000.0,
        stop_reason: StopReason::TrackFinished,
        rewrite_enabled: false,
    })
}

#[tokio::test]
async fn completed_capture_is_moved_tagged_and_logged_once() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    // 10s recorded against a 5s track: comfortably complete.
    let task = scratch_task(&root, "arming_001", "t1", 5_000, 10)?;
    let final_path = task.final_path.clone();
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    assert!(final_path.exists(), "file should be moved to its final path");
    assert!(!root.join("__arming__").join("arming_001.flac").exists());

    // Tags landed in the container, including the durable identity tag.
    let tag = metaflac::Tag::read_from_path(&final_path)?;
    let title: Vec<_> = tag.get_vorbis("TITLE").unwrap().collect();
    assert_eq!(title, ["Song One"]);
    let year: Vec<_> = tag.get_vorbis("YEAR").unwrap().collect();
    assert_eq!(year, ["2021"]);
    assert!(aurora::finalize::is_already_recorded(
        &final_path,
        &TrackId::new("t1"),
        1024,
    ));

    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1, "exactly one entry per capture");
    assert_eq!(entries[0]["outcome"], "completed");
    assert_eq!(entries[0]["stop_reason"], "track_finished");
    assert!(read_failures(&root).is_empty());
    Ok(())
}

#[tokio::test]
async fn short_capture_is_discarded_and_never_tagged() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    // 10s recorded against a 200s track: incomplete beyond tolerance.
    let task = scratch_task(&root, "arming_001", "t1", 200_000, 10)?;
    let final_path = task.final_path.clone();
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    assert!(!final_path.exists(), "short capture must be deleted");

    let failures = read_failures(&root);
    assert_eq!(failures, ["Artist - Song One"]);

    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "discarded_short");
    Ok(())
}

#[tokio::test]
async fn capture_exactly_within_tolerance_is_kept() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    // 178s recorded against a 180s track: inside the 3s tolerance.
    let task = scratch_task(&root, "arming_001", "t1", 180_000, 178)?;
    let final_path = task.final_path.clone();
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    assert!(final_path.exists());
    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "completed");
    Ok(())
}

#[tokio::test]
async fn missing_output_is_discarded_with_failure_entry() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    let meta = track_meta("t1", "Song One", "Artist", 5_000);
    let task = CaptureTask {
        handle: Box::new(IdleHandle),
        audio_path: root.join("__arming__").join("never_written.flac"),
        final_path: root.join("01 Song One.flac"),
        metadata: meta,
        armed_at: Utc::now(),
        expected_duration_secs: 5.0,
        stop_reason: StopReason::Stopped,
        rewrite_enabled: false,
    };
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "discarded_missing");
    assert_eq!(read_failures(&root).len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_duration_uses_minimum_duration_floor() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let mut settings = test_settings(&root);
    settings.recording.min_duration_seconds = 30.0;
    let settings = Arc::new(settings);
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    // Upstream never reported a duration; 10s is below the 30s floor.
    let task = scratch_task(&root, "arming_001", "t1", 0, 10)?;
    let final_path = task.final_path.clone();
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    assert!(!final_path.exists());
    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "discarded_short");
    Ok(())
}

#[tokio::test]
async fn shutdown_drains_every_enqueued_task() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    let sender = pipeline.sender();
    for i in 0..3 {
        let mut task = scratch_task(&root, &format!("arming_{i:03}"), &format!("t{i}"), 5_000, 10)?;
        task.final_path = root.join(format!("{i:02} Song One.flac"));
        sender.enqueue(task);
    }
    drop(sender);
    pipeline.shutdown().await?;

    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 3, "all queued tasks processed before exit");
    for entry in &entries {
        assert_eq!(entry["outcome"], "completed");
    }
    Ok(())
}

#[tokio::test]
async fn a_file_outside_scratch_is_finalized_in_place() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().to_path_buf();
    let settings = Arc::new(test_settings(&root));
    let failures = FailureLog::new(root.join("failed_tracks.txt"));
    let pipeline = FinalizationPipeline::spawn(settings, failures)?;

    // Already at its final destination, e.g. after a manual move.
    let audio_path = root.join("01 Song One.flac");
    write_min_flac(&audio_path, 200 * 1024)?;
    let task = CaptureTask {
        handle: Box::new(IdleHandle),
        audio_path: audio_path.clone(),
        final_path: audio_path.clone(),
        metadata: track_meta("t1", "Song One", "Artist", 5_000),
        armed_at: Utc::now() - chrono::Duration::seconds(10),
        expected_duration_secs: 5.0,
        stop_reason: StopReason::TrackFinished,
        rewrite_enabled: false,
    };
    pipeline.sender().enqueue(task);
    pipeline.shutdown().await?;

    assert!(audio_path.exists());
    let entries = read_log_entries(&root);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "completed");
    Ok(())
}
