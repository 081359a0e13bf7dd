// Integration tests for the muxer track registry and the container format
//
// The registry must start the container only once both tracks exist, refuse late or
// duplicate registrations, and discard files that never received video.

use anyhow::Result;
use camrec::media::{MediaFormat, TrackRole};
use camrec::muxer::{ContainerReader, FileContainerWriter, MuxerTrackRegistry};
use camrec::{EncodedSample, Orientation, RecorderError, SampleFlags};
use std::path::PathBuf;
use tempfile::TempDir;

fn video_format() -> MediaFormat {
    MediaFormat::Video {
        mime: "video/raw".to_string(),
        width: 32,
        height: 24,
        frame_rate: 30,
        bitrate: 6_000_000,
    }
}

fn audio_format() -> MediaFormat {
    MediaFormat::Audio {
        mime: "audio/raw".to_string(),
        sample_rate: 8_000,
        channels: 1,
        bitrate: 128_000,
    }
}

fn sample(pts_us: i64, len: usize) -> EncodedSample {
    EncodedSample {
        data: vec![0xAB; len],
        pts_us,
        flags: SampleFlags::KEY_FRAME,
    }
}

fn registry(dir: &TempDir, orientation: Orientation) -> Result<(MuxerTrackRegistry, PathBuf)> {
    let path = dir.path().join("nested").join("VIDEO_1.cam");
    let writer = FileContainerWriter::create(&path, orientation)?;
    Ok((MuxerTrackRegistry::new(Box::new(writer)), path))
}

#[test]
fn test_muxer_starts_after_both_tracks() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, _) = registry(&dir, Orientation::Deg0)?;

    let video = registry.register_track(TrackRole::Video, &video_format())?;
    assert!(!registry.is_started());
    assert!(!registry.write_sample(video, &sample(0, 16))?);

    let audio = registry.register_track(TrackRole::Audio, &audio_format())?;
    assert!(registry.is_started());
    assert_ne!(video, audio);
    assert_eq!(registry.track_index(TrackRole::Audio), Some(audio));
    assert!(registry.write_sample(video, &sample(0, 16))?);

    let stats = registry.stats();
    assert_eq!(stats.video_samples, 1);
    assert_eq!(stats.dropped_before_start, 1);
    Ok(())
}

#[test]
fn test_duplicate_role_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, _) = registry(&dir, Orientation::Deg0)?;

    registry.register_track(TrackRole::Audio, &audio_format())?;
    let result = registry.register_track(TrackRole::Audio, &audio_format());

    assert!(matches!(
        result,
        Err(RecorderError::DuplicateTrackRegistration(TrackRole::Audio))
    ));
    Ok(())
}

#[test]
fn test_registration_after_start_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, _) = registry(&dir, Orientation::Deg0)?;

    registry.register_track(TrackRole::Video, &video_format())?;
    registry.register_track(TrackRole::Audio, &audio_format())?;
    let result = registry.register_track(TrackRole::Video, &video_format());

    assert!(matches!(result, Err(RecorderError::MuxerAlreadyStarted)));
    Ok(())
}

#[test]
fn test_finish_without_start_removes_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg0)?;
    assert!(path.exists());

    registry.register_track(TrackRole::Video, &video_format())?;

    assert!(registry.finish()?.is_none());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_finish_without_video_removes_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg0)?;

    registry.register_track(TrackRole::Video, &video_format())?;
    let audio = registry.register_track(TrackRole::Audio, &audio_format())?;
    registry.write_sample(audio, &sample(0, 320))?;

    assert!(registry.finish()?.is_none());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_finish_is_final() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg0)?;
    let video = registry.register_track(TrackRole::Video, &video_format())?;
    registry.register_track(TrackRole::Audio, &audio_format())?;
    registry.write_sample(video, &sample(0, 16))?;

    let finished = registry.finish()?;
    assert_eq!(finished.map(|f| f.path), Some(path.clone()));
    assert!(registry.finish()?.is_none());
    // Writes after finish are ignored
    assert!(!registry.write_sample(video, &sample(33_000, 16))?);
    assert!(path.exists());
    Ok(())
}

#[test]
fn test_container_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg90)?;
    let video = registry.register_track(TrackRole::Video, &video_format())?;
    let audio = registry.register_track(TrackRole::Audio, &audio_format())?;

    for i in 0..3 {
        registry.write_sample(video, &sample(i * 33_000, 1152))?;
    }
    // 8 kHz mono: 1600 bytes = 800 frames = 100ms per chunk
    registry.write_sample(audio, &sample(0, 1600))?;
    registry.write_sample(audio, &sample(100_000, 1600))?;
    registry.finish()?;

    let container = ContainerReader::open(&path)?;
    assert!(container.finalized);
    assert_eq!(container.header.orientation_degrees, 90);
    assert_eq!(container.header.tracks, vec![video_format(), audio_format()]);
    assert_eq!(container.samples.len(), 5);
    assert_eq!(container.timestamps(video), vec![0, 33_000, 66_000]);

    let video_track = container.track(TrackRole::Video).expect("video track");
    assert_eq!(video_track.samples, 3);
    assert_eq!(video_track.payload_bytes, 3 * 1152);
    assert_eq!(video_track.duration_us(), 66_000);

    let audio_track = container.track(TrackRole::Audio).expect("audio track");
    assert_eq!(audio_track.duration_us(), 200_000);
    Ok(())
}

#[test]
fn test_reader_rejects_foreign_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("not-a-container.cam");
    std::fs::write(&path, b"RIFF....WAVEfmt ")?;

    let result = ContainerReader::open(&path);

    assert!(matches!(result, Err(RecorderError::Container(_))));
    Ok(())
}

#[test]
fn test_reader_accepts_unfinalized_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg0)?;
    let video = registry.register_track(TrackRole::Video, &video_format())?;
    registry.register_track(TrackRole::Audio, &audio_format())?;
    registry.write_sample(video, &sample(0, 16))?;

    registry.finish()?;

    // Simulate a crash before the trailer was written
    let snapshot = dir.path().join("snapshot.cam");
    let bytes = std::fs::read(&path)?;
    let trailer_start = bytes.len() - trailer_len(&bytes);
    std::fs::write(&snapshot, &bytes[..trailer_start])?;

    let container = ContainerReader::open(&snapshot)?;
    assert!(!container.finalized);
    assert_eq!(container.samples.len(), 1);
    Ok(())
}

#[test]
fn test_reader_rejects_truncated_payload() -> Result<()> {
    let dir = TempDir::new()?;
    let (registry, path) = registry(&dir, Orientation::Deg0)?;
    let video = registry.register_track(TrackRole::Video, &video_format())?;
    registry.register_track(TrackRole::Audio, &audio_format())?;
    registry.write_sample(video, &sample(0, 64))?;
    registry.finish()?;

    // Cut the file in the middle of the sample payload
    let bytes = std::fs::read(&path)?;
    let end_of_sample = bytes.len() - trailer_len(&bytes);
    let cut = dir.path().join("cut.cam");
    std::fs::write(&cut, &bytes[..end_of_sample - 10])?;

    let result = ContainerReader::open(&cut);

    assert!(
        matches!(&result, Err(RecorderError::Container(msg)) if msg.contains("Truncated")),
        "unexpected result: {:?}",
        result.map(|c| c.samples)
    );
    Ok(())
}

/// Length of the trailer record at the end of a finalized container
fn trailer_len(bytes: &[u8]) -> usize {
    // Tag byte, u32 length, JSON. The JSON ends the file, so scan back for the tag.
    (0..bytes.len())
        .rev()
        .find(|&i| {
            bytes[i] == 0xFF
                && i + 5 <= bytes.len()
                && u32::from_le_bytes([bytes[i + 1], bytes[i + 2], bytes[i + 3], bytes[i + 4]]) as usize
                    == bytes.len() - i - 5
        })
        .map(|i| bytes.len() - i)
        .unwrap_or(0)
}
