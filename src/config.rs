use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::media::{AudioParameters, VideoParameters};
use crate::recorder::RecorderSettings;

/// File-backed configuration, see `config/camrec.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub output_dir: String,
    pub file_prefix: String,
    pub input_timeout_ms: u64,
    pub drain_timeout_ms: u64,
    pub audio_join_timeout_ms: u64,
    pub format_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub key_frame_interval_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub mime: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
    pub input_buffer_size: usize,
    /// "tone" or a path to a 16-bit PCM WAV file
    pub source: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        let defaults = RecorderSettings::default();
        Self {
            output_dir: defaults.output_dir.to_string_lossy().into_owned(),
            file_prefix: defaults.file_prefix,
            input_timeout_ms: defaults.input_timeout.as_millis() as u64,
            drain_timeout_ms: defaults.drain_timeout.as_millis() as u64,
            audio_join_timeout_ms: defaults.audio_join_timeout.as_millis() as u64,
            format_timeout_ms: defaults.format_timeout.as_millis() as u64,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        let video = RecorderSettings::default().video;
        Self {
            mime: video.mime,
            width: video.width,
            height: video.height,
            bitrate: video.bitrate,
            frame_rate: video.frame_rate,
            key_frame_interval_secs: video.key_frame_interval_secs,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        let audio = RecorderSettings::default().audio;
        Self {
            mime: audio.mime,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            bitrate: audio.bitrate,
            input_buffer_size: audio.input_buffer_size,
            source: "tone".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (extension optional), then apply `CAMREC__SECTION__KEY` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("CAMREC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Recorder settings described by this configuration
    pub fn settings(&self) -> RecorderSettings {
        RecorderSettings {
            output_dir: PathBuf::from(&self.recorder.output_dir),
            file_prefix: self.recorder.file_prefix.clone(),
            video: VideoParameters {
                mime: self.video.mime.clone(),
                width: self.video.width,
                height: self.video.height,
                bitrate: self.video.bitrate,
                frame_rate: self.video.frame_rate,
                key_frame_interval_secs: self.video.key_frame_interval_secs,
            },
            audio: AudioParameters {
                mime: self.audio.mime.clone(),
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                bitrate: self.audio.bitrate,
                input_buffer_size: self.audio.input_buffer_size,
            },
            audio_source: AudioSource::parse(&self.audio.source),
            input_timeout: Duration::from_millis(self.recorder.input_timeout_ms),
            drain_timeout: Duration::from_millis(self.recorder.drain_timeout_ms),
            audio_join_timeout: Duration::from_millis(self.recorder.audio_join_timeout_ms),
            format_timeout: Duration::from_millis(self.recorder.format_timeout_ms),
        }
    }
}
