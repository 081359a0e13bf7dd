//! Media types shared by the encoders, the muxer and the recorder
//!
//! - Track roles and negotiated output formats
//! - Encoder configuration parameters
//! - Encoded samples and their flags
//! - Timestamp normalization (see [`timestamp`])

pub mod timestamp;

pub use timestamp::{AudioTimestamps, VideoTimestamps};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mime of the built-in NV12 video codec
pub const MIME_VIDEO_RAW: &str = "video/raw";
/// Mime of the built-in 16-bit PCM audio codec
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Which of the two container tracks a stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackRole {
    Video,
    Audio,
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRole::Video => write!(f, "video"),
            TrackRole::Audio => write!(f, "audio"),
        }
    }
}

/// Display rotation stored in the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    /// Snap an arbitrary rotation hint to the nearest quarter turn
    pub fn from_degrees(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        match (normalized + 45) / 90 % 4 {
            1 => Orientation::Deg90,
            2 => Orientation::Deg180,
            3 => Orientation::Deg270,
            _ => Orientation::Deg0,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 90,
            Orientation::Deg180 => 180,
            Orientation::Deg270 => 270,
        }
    }
}

/// Video encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParameters {
    /// Codec mime (e.g. "video/raw")
    pub mime: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Nominal frame rate
    pub frame_rate: u32,
    /// Seconds between key frames
    pub key_frame_interval_secs: u32,
}

impl VideoParameters {
    /// Size of one packed NV12 frame (full-size luma + half-size interleaved chroma)
    pub fn frame_size(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        luma + luma / 2
    }
}

/// Audio encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParameters {
    /// Codec mime (e.g. "audio/raw")
    pub mime: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Size of one encoder input slot in bytes
    pub input_buffer_size: usize,
}

impl AudioParameters {
    /// Bytes per interleaved 16-bit sample-frame
    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels.max(1) as usize
    }
}

/// Parameters handed to a codec factory
#[derive(Debug, Clone, PartialEq)]
pub enum MediaParameters {
    Video(VideoParameters),
    Audio(AudioParameters),
}

impl MediaParameters {
    pub fn role(&self) -> TrackRole {
        match self {
            MediaParameters::Video(_) => TrackRole::Video,
            MediaParameters::Audio(_) => TrackRole::Audio,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            MediaParameters::Video(p) => &p.mime,
            MediaParameters::Audio(p) => &p.mime,
        }
    }
}

/// Output format announced by an encoder's format-change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaFormat {
    Video {
        mime: String,
        width: u32,
        height: u32,
        frame_rate: u32,
        bitrate: u32,
    },
    Audio {
        mime: String,
        sample_rate: u32,
        channels: u16,
        bitrate: u32,
    },
}

impl MediaFormat {
    pub fn role(&self) -> TrackRole {
        match self {
            MediaFormat::Video { .. } => TrackRole::Video,
            MediaFormat::Audio { .. } => TrackRole::Audio,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            MediaFormat::Video { mime, .. } | MediaFormat::Audio { mime, .. } => mime,
        }
    }
}

/// Bit flags attached to an encoded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleFlags(u8);

impl SampleFlags {
    pub const NONE: SampleFlags = SampleFlags(0);
    pub const KEY_FRAME: SampleFlags = SampleFlags(0x01);
    pub const CODEC_CONFIG: SampleFlags = SampleFlags(0x02);
    pub const END_OF_STREAM: SampleFlags = SampleFlags(0x04);

    pub fn from_bits(bits: u8) -> Self {
        SampleFlags(bits & 0x07)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn with(self, other: SampleFlags) -> Self {
        SampleFlags(self.0 | other.0)
    }
}

/// One chunk of encoder output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSample {
    /// Encoded payload
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds, track-relative
    pub pts_us: i64,
    pub flags: SampleFlags,
}

impl EncodedSample {
    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(SampleFlags::CODEC_CONFIG)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(SampleFlags::END_OF_STREAM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_snaps_to_quarter_turns() {
        assert_eq!(Orientation::from_degrees(0), Orientation::Deg0);
        assert_eq!(Orientation::from_degrees(89), Orientation::Deg90);
        assert_eq!(Orientation::from_degrees(180), Orientation::Deg180);
        assert_eq!(Orientation::from_degrees(-90), Orientation::Deg270);
        assert_eq!(Orientation::from_degrees(350), Orientation::Deg0);
    }

    #[test]
    fn test_sample_flags() {
        let flags = SampleFlags::KEY_FRAME.with(SampleFlags::END_OF_STREAM);
        assert!(flags.contains(SampleFlags::KEY_FRAME));
        assert!(flags.contains(SampleFlags::END_OF_STREAM));
        assert!(!flags.contains(SampleFlags::CODEC_CONFIG));
        assert!(!SampleFlags::NONE.contains(SampleFlags::NONE));
        assert_eq!(SampleFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_nv12_frame_size() {
        let params = VideoParameters {
            mime: MIME_VIDEO_RAW.to_string(),
            width: 4,
            height: 2,
            bitrate: 1,
            frame_rate: 30,
            key_frame_interval_secs: 1,
        };
        assert_eq!(params.frame_size(), 12);
    }
}
