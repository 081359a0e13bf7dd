// Integration tests for configuration loading

use anyhow::Result;
use camrec::{AudioSource, Config};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_bundled_config_loads() -> Result<()> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/camrec");
    let cfg = Config::load(path)?;

    assert_eq!(cfg.video.width, 1280);
    assert_eq!(cfg.video.height, 720);
    assert_eq!(cfg.video.bitrate, 6_000_000);
    assert_eq!(cfg.audio.sample_rate, 44_100);
    assert_eq!(cfg.audio.channels, 1);
    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        r#"
[recorder]
output_dir = "/tmp/camrec-out"
drain_timeout_ms = 250

[audio]
sample_rate = 48000
source = "/tmp/mic.wav"
"#,
    )?;

    let cfg = Config::load(path.to_str().unwrap_or_default())?;
    let settings = cfg.settings();

    assert_eq!(settings.output_dir.to_str(), Some("/tmp/camrec-out"));
    assert_eq!(settings.file_prefix, "VIDEO");
    assert_eq!(settings.drain_timeout, Duration::from_millis(250));
    assert_eq!(settings.input_timeout, Duration::from_millis(10));
    assert_eq!(settings.audio.sample_rate, 48_000);
    assert_eq!(settings.audio.channels, 1);
    assert_eq!(settings.audio_source, AudioSource::File("/tmp/mic.wav".to_string()));
    assert_eq!(settings.video.frame_rate, 30);
    Ok(())
}

#[test]
fn test_default_config_matches_default_settings() {
    let settings = Config::default().settings();

    assert_eq!(settings.video.mime, "video/raw");
    assert_eq!(settings.video.key_frame_interval_secs, 1);
    assert_eq!(settings.audio.bitrate, 128_000);
    assert_eq!(settings.audio_source, AudioSource::Tone);
    assert_eq!(settings.audio_join_timeout, Duration::from_millis(500));
}

#[test]
fn test_missing_config_file_is_an_error() {
    assert!(Config::load("/nonexistent/camrec").is_err());
}
