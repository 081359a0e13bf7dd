use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

use super::source::{MicrophoneSource, Pacer};
use crate::error::RecorderResult;

/// Microphone backed by a 16-bit PCM WAV file, delivered at real-time pace
pub struct WavFileSource {
    pub path: String,
    pub duration_seconds: f64,
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
    position: usize,
    pacer: Pacer,
    capturing: bool,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening WAV microphone input: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "Unsupported WAV format: {} bits {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "WAV input loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
            position: 0,
            pacer: Pacer::new(spec.sample_rate),
            capturing: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples (not frames) not yet delivered
    pub fn remaining_samples(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl MicrophoneSource for WavFileSource {
    fn start(&mut self) -> RecorderResult<()> {
        self.pacer.start();
        self.capturing = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> RecorderResult<usize> {
        let channels = self.channels.max(1) as usize;
        let frames_requested = buf.len() / (2 * channels);

        if self.remaining_samples() == 0 {
            std::thread::sleep(self.pacer.duration_of(frames_requested as u64));
            return Ok(0);
        }

        let count = (frames_requested * channels).min(self.remaining_samples());
        let chunk = &self.samples[self.position..self.position + count];
        for (dst, sample) in buf.chunks_exact_mut(2).zip(chunk) {
            dst.copy_from_slice(&sample.to_le_bytes());
        }
        self.position += count;

        self.pacer.wait_until((self.position / channels) as u64);
        Ok(count * 2)
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
