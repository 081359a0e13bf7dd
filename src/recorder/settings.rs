use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioSource, AUDIO_JOIN_TIMEOUT};
use crate::encoder::INPUT_TIMEOUT;
use crate::media::{AudioParameters, VideoParameters, MIME_AUDIO_RAW, MIME_VIDEO_RAW};

/// Configuration for the recorder and every session it creates
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Directory the containers are written to
    pub output_dir: PathBuf,

    /// File name prefix (files are named `<prefix>_<unix millis>.cam`)
    pub file_prefix: String,

    pub video: VideoParameters,

    pub audio: AudioParameters,

    /// Microphone used by the audio capture thread
    pub audio_source: AudioSource,

    /// Bounded wait for encoder input slots and output
    pub input_timeout: Duration,

    /// Upper bound for each encoder's end-of-stream drain on stop
    pub drain_timeout: Duration,

    /// Upper bound for joining the audio capture thread on stop
    pub audio_join_timeout: Duration,

    /// Upper bound for each encoder to announce its format on start
    pub format_timeout: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            file_prefix: "VIDEO".to_string(),
            video: VideoParameters {
                mime: MIME_VIDEO_RAW.to_string(),
                width: 1280,
                height: 720,
                bitrate: 6_000_000,
                frame_rate: 30,
                key_frame_interval_secs: 1,
            },
            audio: AudioParameters {
                mime: MIME_AUDIO_RAW.to_string(),
                sample_rate: 44_100,
                channels: 1, // Mono
                bitrate: 128_000,
                input_buffer_size: 4096,
            },
            audio_source: AudioSource::Tone,
            input_timeout: INPUT_TIMEOUT,
            drain_timeout: Duration::from_secs(5),
            audio_join_timeout: AUDIO_JOIN_TIMEOUT,
            format_timeout: Duration::from_secs(1),
        }
    }
}
