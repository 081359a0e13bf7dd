use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use super::container::ContainerWriter;
use crate::error::{RecorderError, RecorderResult};
use crate::media::{EncodedSample, MediaFormat, TrackRole};

/// A container that was started, received video and was closed cleanly
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedContainer {
    pub path: PathBuf,
    pub video_samples: u64,
    pub audio_samples: u64,
}

/// Snapshot of the registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxerStats {
    pub started: bool,
    pub video_samples: u64,
    pub audio_samples: u64,
    /// Writes that arrived before both tracks were registered
    pub dropped_before_start: u64,
}

struct RegistryInner {
    writer: Option<Box<dyn ContainerWriter>>,
    video_track: Option<usize>,
    audio_track: Option<usize>,
    stats: MuxerStats,
}

/// Owns the container writer and gates it on both tracks being registered
///
/// Registration and sample writes from the worker and the audio thread go through a
/// single lock, so the writer starts exactly once and writes never interleave.
pub struct MuxerTrackRegistry {
    path: PathBuf,
    inner: Mutex<RegistryInner>,
}

impl MuxerTrackRegistry {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            path: writer.path().to_path_buf(),
            inner: Mutex::new(RegistryInner {
                writer: Some(writer),
                video_track: None,
                audio_track: None,
                stats: MuxerStats::default(),
            }),
        }
    }

    /// Add the track for `role`; starts the writer once both tracks exist
    pub fn register_track(&self, role: TrackRole, format: &MediaFormat) -> RecorderResult<usize> {
        let mut inner = self.inner.lock();

        if inner.stats.started {
            return Err(RecorderError::MuxerAlreadyStarted);
        }
        let already_registered = match role {
            TrackRole::Video => inner.video_track.is_some(),
            TrackRole::Audio => inner.audio_track.is_some(),
        };
        if already_registered {
            return Err(RecorderError::DuplicateTrackRegistration(role));
        }

        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| RecorderError::Container("Muxer already released".to_string()))?;
        let index = writer.add_track(format)?;

        match role {
            TrackRole::Video => inner.video_track = Some(index),
            TrackRole::Audio => inner.audio_track = Some(index),
        }
        info!("Added track {} for {} ({})", index, role, format.mime());

        if inner.video_track.is_some() && inner.audio_track.is_some() {
            if let Some(writer) = inner.writer.as_mut() {
                writer.start()?;
            }
            inner.stats.started = true;
            info!("Muxer started");
        }

        Ok(index)
    }

    /// Append a sample. Returns `false` when the writer has not started yet.
    pub fn write_sample(&self, track_index: usize, sample: &EncodedSample) -> RecorderResult<bool> {
        let mut inner = self.inner.lock();

        if !inner.stats.started {
            inner.stats.dropped_before_start += 1;
            return Ok(false);
        }

        let role = if inner.video_track == Some(track_index) {
            TrackRole::Video
        } else if inner.audio_track == Some(track_index) {
            TrackRole::Audio
        } else {
            return Err(RecorderError::Container(format!(
                "Unknown track index {}",
                track_index
            )));
        };

        let Some(writer) = inner.writer.as_mut() else {
            return Ok(false);
        };
        writer.write_sample(track_index, sample)?;

        match role {
            TrackRole::Video => inner.stats.video_samples += 1,
            TrackRole::Audio => inner.stats.audio_samples += 1,
        }
        Ok(true)
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().stats.started
    }

    pub fn track_index(&self, role: TrackRole) -> Option<usize> {
        let inner = self.inner.lock();
        match role {
            TrackRole::Video => inner.video_track,
            TrackRole::Audio => inner.audio_track,
        }
    }

    pub fn stats(&self) -> MuxerStats {
        self.inner.lock().stats
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Stop and release the writer.
    ///
    /// The file is kept only if the writer started and at least one video sample was
    /// written; otherwise it is removed and `None` is returned. Later calls return `None`.
    pub fn finish(&self) -> RecorderResult<Option<FinishedContainer>> {
        let (writer, stats) = {
            let mut inner = self.inner.lock();
            (inner.writer.take(), inner.stats)
        };

        let Some(mut writer) = writer else {
            return Ok(None);
        };

        let stopped = writer.stop();
        drop(writer);

        if let Err(e) = stopped {
            error!("Failed to finalize container {}: {}", self.path.display(), e);
            self.discard();
            return Err(e);
        }

        if !stats.started || stats.video_samples == 0 {
            info!(
                "Discarding container {} (started={}, video samples={})",
                self.path.display(),
                stats.started,
                stats.video_samples
            );
            self.discard();
            return Ok(None);
        }

        info!(
            "Container finished: {} ({} video, {} audio samples)",
            self.path.display(),
            stats.video_samples,
            stats.audio_samples
        );

        Ok(Some(FinishedContainer {
            path: self.path.clone(),
            video_samples: stats.video_samples,
            audio_samples: stats.audio_samples,
        }))
    }

    fn discard(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for MuxerTrackRegistry {
    fn drop(&mut self) {
        if self.inner.get_mut().writer.is_some() {
            if let Err(e) = self.finish() {
                warn!("Failed to finish muxer on drop: {}", e);
            }
        }
    }
}
