// Settings loading: file values layer over defaults.

use anyhow::Result;
use aurora::Settings;
use std::io::Write;
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() -> Result<()> {
    let settings = Settings::load("does/not/exist/aurora")?;
    assert_eq!(settings.recording.default_format, "flac");
    assert_eq!(settings.recording.polling_interval_seconds, 0.35);
    assert_eq!(settings.recording.duration_tolerance_seconds, 3.0);
    assert_eq!(settings.recording.finish_tail_ms, 200);
    assert!(settings.recording.skip_existing_file);
    Ok(())
}

#[test]
fn file_values_override_defaults() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("aurora.toml");
    let mut file = std::fs::File::create(&path)?;
    writeln!(
        file,
        r#"
[upstream]
access_token = "secret"

[recording]
polling_interval_seconds = 0.1
gap_seconds = 1.5
organize_by_artist_album = false
"#
    )?;

    let settings = Settings::load(path.to_str().unwrap())?;
    assert_eq!(settings.upstream.access_token, "secret");
    assert_eq!(settings.recording.polling_interval_seconds, 0.1);
    assert_eq!(settings.recording.gap_seconds, 1.5);
    assert!(!settings.recording.organize_by_artist_album);
    // Untouched keys keep their defaults.
    assert_eq!(settings.recording.default_format, "flac");
    assert_eq!(settings.recording.standby_seconds, 900.0);
    Ok(())
}
