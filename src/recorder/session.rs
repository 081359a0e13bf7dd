use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::settings::RecorderSettings;
use super::stats::RecordingOutput;
use crate::audio::{AudioCaptureThread, MicrophoneFactory};
use crate::codec::CodecFactory;
use crate::encoder::{EncoderSession, InputStatus};
use crate::error::RecorderError;
use crate::media::{AudioTimestamps, MediaParameters, Orientation, SampleFlags, VideoTimestamps};
use crate::muxer::{FileContainerWriter, MuxerTrackRegistry, CONTAINER_EXTENSION};

/// Everything that belongs to one recording, owned by the recorder worker
///
/// Built by [`RecordingSession::open`] and consumed by [`RecordingSession::close`].
/// Dropping a partially built session releases the encoders and removes the
/// container target through the same `release` / `finish` calls `close` uses.
pub(crate) struct RecordingSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    orientation: Orientation,
    video: EncoderSession,
    audio: Arc<Mutex<EncoderSession>>,
    registry: Arc<MuxerTrackRegistry>,
    audio_thread: Option<AudioCaptureThread>,
    audio_sample_rate: u32,
    video_timestamps: VideoTimestamps,
    frames_submitted: u64,
    frames_dropped: u64,
}

impl RecordingSession {
    /// Allocate the container, configure and start both encoders, then start capture
    pub(crate) fn open(
        settings: &RecorderSettings,
        codecs: &dyn CodecFactory,
        orientation: Orientation,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let path = container_path(settings, started_at);

        info!("Opening recording session {} -> {}", id, path.display());

        let writer = FileContainerWriter::create(&path, orientation)
            .with_context(|| format!("Failed to create container {}", path.display()))?;
        let registry = Arc::new(MuxerTrackRegistry::new(Box::new(writer)));

        let mut video = EncoderSession::configure(codecs, MediaParameters::Video(settings.video.clone()))
            .context("Failed to configure video encoder")?
            .with_input_timeout(settings.input_timeout);
        let mut audio = EncoderSession::configure(codecs, MediaParameters::Audio(settings.audio.clone()))
            .context("Failed to configure audio encoder")?
            .with_input_timeout(settings.input_timeout);

        let mut microphone = MicrophoneFactory::create(&settings.audio_source, &settings.audio)
            .context("Failed to create microphone")?;

        video.start().context("Failed to start video encoder")?;
        audio.start().context("Failed to start audio encoder")?;

        // Register both tracks before the first frame so early samples are not
        // dropped while the muxer waits for the second format.
        video
            .await_format(&registry, settings.format_timeout)
            .context("Video format negotiation failed")?;
        audio
            .await_format(&registry, settings.format_timeout)
            .context("Audio format negotiation failed")?;

        microphone.start().context("Failed to start microphone")?;

        let audio = Arc::new(Mutex::new(audio));
        let audio_thread = AudioCaptureThread::spawn(
            Arc::clone(&audio),
            Arc::clone(&registry),
            microphone,
            AudioTimestamps::new(settings.audio.sample_rate, settings.audio.channels),
        )
        .context("Failed to start audio capture")?;

        info!(
            "Recording session {} started ({}x{}, {} degrees, muxer started: {})",
            id,
            settings.video.width,
            settings.video.height,
            orientation.degrees(),
            registry.is_started()
        );

        Ok(Self {
            id,
            started_at,
            orientation,
            video,
            audio,
            registry,
            audio_thread: Some(audio_thread),
            audio_sample_rate: settings.audio.sample_rate,
            video_timestamps: VideoTimestamps::new(),
            frames_submitted: 0,
            frames_dropped: 0,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Encode one filtered NV12 frame. Failures only affect this frame.
    pub(crate) fn on_frame(&mut self, frame: &[u8], raw_timestamp_ns: i64) {
        if frame.is_empty() {
            debug!("Ignoring empty frame at {}ns", raw_timestamp_ns);
            return;
        }

        match self.video.acquire_input() {
            Some(mut slot) => {
                let pts_us = self.video_timestamps.normalize(raw_timestamp_ns);
                let copied = slot.fill(frame);
                if copied < frame.len() {
                    warn!("Frame truncated: {} of {} bytes", copied, frame.len());
                }
                match self.video.queue_input(slot, pts_us, SampleFlags::NONE) {
                    Ok(()) => self.frames_submitted += 1,
                    Err(e) => {
                        self.frames_dropped += 1;
                        warn!("Failed to queue video frame: {}", e);
                    }
                }
            }
            None => {
                self.frames_dropped += 1;
                debug!(
                    "Dropping frame at {}ns: {}",
                    raw_timestamp_ns,
                    RecorderError::InputSlotUnavailable
                );
            }
        }

        if let Err(e) = self.video.drain_available(&self.registry) {
            error!("Failed to drain video encoder: {}", e);
        }
    }

    /// Flush and release everything, returning the finished container if one was kept.
    ///
    /// Every step is attempted even if an earlier one failed.
    pub(crate) fn close(mut self, settings: &RecorderSettings) -> Option<RecordingOutput> {
        info!("Stopping recording session {}", self.id);

        let audio_report = self
            .audio_thread
            .take()
            .and_then(|thread| thread.stop(settings.audio_join_timeout));

        end_stream(&mut self.video);
        let mut audio = self.audio.try_lock_for(settings.audio_join_timeout);
        match audio.as_deref_mut() {
            Some(audio) => end_stream(audio),
            None => warn!("Audio encoder still busy; skipping its end-of-stream"),
        }

        if let Err(e) = self
            .video
            .drain_until_end_of_stream(&self.registry, settings.drain_timeout)
        {
            error!("Error draining video encoder: {}", e);
        }
        if let Some(audio) = audio.as_deref_mut() {
            if let Err(e) = audio.drain_until_end_of_stream(&self.registry, settings.drain_timeout) {
                error!("Error draining audio encoder: {}", e);
            }
        }

        self.video.release();
        if let Some(audio) = audio.as_deref_mut() {
            audio.release();
        }
        drop(audio);

        let finished = match self.registry.finish() {
            Ok(finished) => finished,
            Err(e) => {
                error!("Failed to finish container: {}", e);
                None
            }
        };

        let Some(finished) = finished else {
            info!("Recording session {} produced no container", self.id);
            return None;
        };

        let audio_duration_secs = audio_report
            .map(|r| r.frames_submitted as f64 / self.audio_sample_rate.max(1) as f64)
            .unwrap_or(0.0);

        info!(
            "Recording session {} saved to {} ({} frames, {} dropped, orientation {})",
            self.id,
            finished.path.display(),
            self.frames_submitted,
            self.frames_dropped,
            self.orientation.degrees()
        );

        Some(RecordingOutput {
            session_id: self.id.to_string(),
            path: finished.path,
            started_at: self.started_at,
            finished_at: Utc::now(),
            video_samples: finished.video_samples,
            audio_samples: finished.audio_samples,
            frames_submitted: self.frames_submitted,
            frames_dropped: self.frames_dropped,
            audio_duration_secs,
        })
    }
}

fn end_stream(encoder: &mut EncoderSession) {
    match encoder.signal_end_of_stream() {
        Ok(InputStatus::Queued) => {}
        Ok(InputStatus::WouldBlock) => warn!(
            "No input slot for {} end-of-stream; drain will time out",
            encoder.role()
        ),
        Err(e) => error!("Failed to signal {} end-of-stream: {}", encoder.role(), e),
    }
}

fn container_path(settings: &RecorderSettings, started_at: DateTime<Utc>) -> PathBuf {
    settings.output_dir.join(format!(
        "{}_{}.{}",
        settings.file_prefix,
        started_at.timestamp_millis(),
        CONTAINER_EXTENSION
    ))
}
