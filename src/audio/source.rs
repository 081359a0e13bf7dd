use anyhow::Result;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::RecorderResult;
use crate::media::AudioParameters;

/// Microphone device
///
/// Implementations:
/// - [`super::CpalMicrophone`]: host default input device
/// - [`ToneSource`]: synthetic sine wave (testing / demo)
/// - [`super::WavFileSource`]: 16-bit PCM read from a WAV file
///
/// `read` is called from the audio capture thread and blocks at the device's natural
/// pace, returning interleaved little-endian 16-bit PCM.
pub trait MicrophoneSource: Send {
    /// Start capturing
    fn start(&mut self) -> RecorderResult<()>;

    /// Read PCM into `buf`, returning the number of bytes written (whole sample-frames).
    /// Zero means the device had nothing to deliver this cycle.
    fn read(&mut self, buf: &mut [u8]) -> RecorderResult<usize>;

    /// Stop capturing
    fn stop(&mut self) -> RecorderResult<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Microphone source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Host default input device ("mic")
    Microphone,
    /// Generated sine tone
    Tone,
    /// Sine tone that goes silent after the given duration ("tone:<seconds>")
    TimedTone(Duration),
    /// WAV file input (for testing/batch processing)
    File(String),
}

impl AudioSource {
    /// "mic" selects the input device, "tone" or "tone:<seconds>" the generator,
    /// anything else is a WAV path
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "mic" | "microphone" => AudioSource::Microphone,
            "" | "tone" => AudioSource::Tone,
            other => {
                let limit = other
                    .strip_prefix("tone:")
                    .and_then(|secs| secs.parse::<f64>().ok())
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
                match limit {
                    Some(limit) => AudioSource::TimedTone(limit),
                    None => AudioSource::File(other.to_string()),
                }
            }
        }
    }
}

/// Microphone factory
pub struct MicrophoneFactory;

impl MicrophoneFactory {
    /// Create a microphone matching the audio encoder's format
    pub fn create(source: &AudioSource, params: &AudioParameters) -> Result<Box<dyn MicrophoneSource>> {
        match source {
            AudioSource::Microphone => Ok(Box::new(super::CpalMicrophone::new(
                params.sample_rate,
                params.channels,
            ))),
            AudioSource::Tone => Ok(Box::new(ToneSource::new(params.sample_rate, params.channels))),
            AudioSource::TimedTone(limit) => Ok(Box::new(
                ToneSource::new(params.sample_rate, params.channels).with_limit(*limit),
            )),
            AudioSource::File(path) => {
                let wav = super::WavFileSource::open(path)?;
                if wav.sample_rate() != params.sample_rate || wav.channels() != params.channels {
                    anyhow::bail!(
                        "WAV format {}Hz/{}ch does not match the audio encoder ({}Hz/{}ch)",
                        wav.sample_rate(),
                        wav.channels(),
                        params.sample_rate,
                        params.channels
                    );
                }
                Ok(Box::new(wav))
            }
        }
    }
}

/// Paces reads to real time so a source behaves like a capture device
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    sample_rate: u32,
    started_at: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            started_at: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Sleep until `frames` sample-frames worth of time has elapsed since start
    pub(crate) fn wait_until(&self, frames: u64) {
        let Some(started_at) = self.started_at else {
            return;
        };
        let due = started_at + self.duration_of(frames);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }

    pub(crate) fn duration_of(&self, frames: u64) -> Duration {
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }
}

/// Sine generator standing in for a microphone
pub struct ToneSource {
    sample_rate: u32,
    channels: u16,
    frequency_hz: f32,
    amplitude: f32,
    position: u64,
    limit: Option<u64>,
    pacer: Pacer,
    capturing: bool,
}

impl ToneSource {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frequency_hz: 440.0,
            amplitude: 0.25,
            position: 0,
            limit: None,
            pacer: Pacer::new(sample_rate),
            capturing: false,
        }
    }

    /// Stop producing samples after `duration`; later reads return 0 bytes
    pub fn with_limit(mut self, duration: Duration) -> Self {
        self.limit = Some(duration.as_micros() as u64 * self.sample_rate as u64 / 1_000_000);
        self
    }

    /// Sample-frames produced so far
    pub fn frames_produced(&self) -> u64 {
        self.position
    }
}

impl MicrophoneSource for ToneSource {
    fn start(&mut self) -> RecorderResult<()> {
        self.pacer.start();
        self.capturing = true;
        info!(
            "Tone source started ({}Hz, {} channels, {}Hz tone)",
            self.sample_rate, self.channels, self.frequency_hz
        );
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> RecorderResult<usize> {
        let bytes_per_frame = 2 * self.channels as usize;
        let mut frames = (buf.len() / bytes_per_frame) as u64;

        if let Some(limit) = self.limit {
            frames = frames.min(limit.saturating_sub(self.position));
            if frames == 0 {
                // Exhausted: behave like a device delivering nothing for one buffer period
                std::thread::sleep(self.pacer.duration_of((buf.len() / bytes_per_frame) as u64));
                return Ok(0);
            }
        }

        for (i, frame) in buf
            .chunks_exact_mut(bytes_per_frame)
            .take(frames as usize)
            .enumerate()
        {
            let t = (self.position + i as u64) as f32 / self.sample_rate as f32;
            let value = (TAU * self.frequency_hz * t).sin() * self.amplitude * i16::MAX as f32;
            let sample = (value as i16).to_le_bytes();
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample);
            }
        }

        self.position += frames;
        self.pacer.wait_until(self.position);

        Ok(frames as usize * bytes_per_frame)
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.capturing = false;
        info!("Tone source stopped after {} frames", self.position);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_source_parse() {
        assert_eq!(AudioSource::parse("mic"), AudioSource::Microphone);
        assert_eq!(AudioSource::parse(" microphone "), AudioSource::Microphone);
        assert_eq!(AudioSource::parse("tone"), AudioSource::Tone);
        assert_eq!(
            AudioSource::parse("tone:1.5"),
            AudioSource::TimedTone(Duration::from_millis(1500))
        );
        assert_eq!(
            AudioSource::parse("tone:-1"),
            AudioSource::File("tone:-1".to_string())
        );
        assert_eq!(AudioSource::parse(""), AudioSource::Tone);
        assert_eq!(
            AudioSource::parse("/tmp/mic.wav"),
            AudioSource::File("/tmp/mic.wav".to_string())
        );
    }

    #[test]
    fn test_factory_selects_source() {
        let params = AudioParameters {
            mime: crate::media::MIME_AUDIO_RAW.to_string(),
            sample_rate: 8000,
            channels: 1,
            bitrate: 128_000,
            input_buffer_size: 400,
        };

        let mic = MicrophoneFactory::create(&AudioSource::Microphone, &params).unwrap();
        assert_eq!(mic.name(), "microphone");
        assert!(!mic.is_capturing());

        let tone = MicrophoneFactory::create(&AudioSource::TimedTone(Duration::from_millis(10)), &params)
            .unwrap();
        assert_eq!(tone.name(), "tone");

        assert!(MicrophoneFactory::create(&AudioSource::File("/nonexistent.wav".into()), &params).is_err());
    }

    #[test]
    fn test_tone_source_respects_limit() {
        let mut tone = ToneSource::new(8000, 1).with_limit(Duration::from_millis(10));
        // Unstarted pacer never sleeps
        let mut buf = vec![0u8; 400];

        assert_eq!(tone.read(&mut buf).unwrap(), 160);
        assert_eq!(tone.frames_produced(), 80);
        assert_eq!(tone.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_tone_source_fills_every_channel() {
        let mut tone = ToneSource::new(8000, 2);
        let mut buf = vec![0u8; 16];

        assert_eq!(tone.read(&mut buf).unwrap(), 16);
        for frame in buf.chunks_exact(4) {
            assert_eq!(frame[0..2], frame[2..4]);
        }
    }
}
