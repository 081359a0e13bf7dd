// Shared helpers for integration tests

#![allow(dead_code)]

use camrec::error::RecorderResult;
use camrec::media::{AudioParameters, EncodedSample, MediaParameters, VideoParameters, MIME_AUDIO_RAW, MIME_VIDEO_RAW};
use camrec::{Codec, CodecFactory, InputSlot, OutputEvent, RecorderSettings, SampleFlags, SoftwareCodecFactory};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

pub fn video_params() -> VideoParameters {
    VideoParameters {
        mime: MIME_VIDEO_RAW.to_string(),
        width: WIDTH,
        height: HEIGHT,
        bitrate: 6_000_000,
        frame_rate: 30,
        key_frame_interval_secs: 1,
    }
}

pub fn audio_params() -> AudioParameters {
    AudioParameters {
        mime: MIME_AUDIO_RAW.to_string(),
        sample_rate: 44_100,
        channels: 1,
        bitrate: 128_000,
        input_buffer_size: 4096,
    }
}

/// Small frames and short timeouts, writing into `output_dir`
pub fn test_settings(output_dir: &Path) -> RecorderSettings {
    RecorderSettings {
        output_dir: output_dir.to_path_buf(),
        video: video_params(),
        audio: audio_params(),
        drain_timeout: Duration::from_millis(500),
        ..RecorderSettings::default()
    }
}

/// One NV12 frame filled with `value`
pub fn frame(value: u8) -> Vec<u8> {
    vec![value; video_params().frame_size()]
}

/// Container files currently in `dir`
pub fn containers_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|e| e == "cam").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default()
}

/// Which output events a [`FaultyCodec`] swallows
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub hide_format: bool,
    pub hide_end_of_stream: bool,
    pub start_delay: Option<Duration>,
}

/// Software codecs with injectable faults on the video encoder
pub struct FaultyCodecFactory {
    pub video: Faults,
}

impl CodecFactory for FaultyCodecFactory {
    fn create(&self, params: &MediaParameters) -> RecorderResult<Box<dyn Codec>> {
        let inner = SoftwareCodecFactory.create(params)?;
        match params {
            MediaParameters::Video(_) => Ok(Box::new(FaultyCodec {
                inner,
                faults: self.video,
            })),
            MediaParameters::Audio(_) => Ok(inner),
        }
    }
}

pub struct FaultyCodec {
    inner: Box<dyn Codec>,
    faults: Faults,
}

impl Codec for FaultyCodec {
    fn name(&self) -> &str {
        "faulty"
    }

    fn start(&mut self) -> RecorderResult<()> {
        if let Some(delay) = self.faults.start_delay {
            std::thread::sleep(delay);
        }
        self.inner.start()
    }

    fn dequeue_input(&mut self, timeout: Duration) -> Option<InputSlot> {
        self.inner.dequeue_input(timeout)
    }

    fn queue_input(&mut self, slot: InputSlot, pts_us: i64, flags: SampleFlags) -> RecorderResult<()> {
        self.inner.queue_input(slot, pts_us, flags)
    }

    fn dequeue_output(&mut self, timeout: Duration) -> RecorderResult<OutputEvent> {
        let event = self.inner.dequeue_output(timeout)?;
        match &event {
            OutputEvent::FormatChanged(_) if self.faults.hide_format => Ok(OutputEvent::TryAgainLater),
            OutputEvent::Sample(EncodedSample { flags, .. })
                if self.faults.hide_end_of_stream && flags.contains(SampleFlags::END_OF_STREAM) =>
            {
                Ok(OutputEvent::TryAgainLater)
            }
            _ => Ok(event),
        }
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.inner.stop()
    }

    fn release(&mut self) {
        self.inner.release()
    }
}
