//! Presentation timestamp normalization.
//!
//! Video and audio deliberately use different policies:
//! - Video follows the capture clock. The first frame becomes the zero point and every
//!   emitted timestamp is strictly greater than the previous one.
//! - Audio ignores capture time entirely. Its timeline is derived from the number of
//!   sample-frames submitted so far, which keeps it linear and drift-free even when the
//!   device delivers uneven bursts.

/// Smallest timestamp step, in microseconds
pub const TICK_US: i64 = 1;

/// Video timestamp state for one recording
#[derive(Debug, Default, Clone)]
pub struct VideoTimestamps {
    baseline_us: Option<i64>,
    last_us: Option<i64>,
}

impl VideoTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a raw capture timestamp (nanoseconds) into a track-relative PTS (microseconds)
    pub fn normalize(&mut self, raw_timestamp_ns: i64) -> i64 {
        let raw_us = raw_timestamp_ns / 1_000;
        let baseline = *self.baseline_us.get_or_insert(raw_us);

        let mut normalized = raw_us - baseline;
        if let Some(last) = self.last_us {
            if normalized <= last {
                normalized = last + TICK_US;
            }
        }

        self.last_us = Some(normalized);
        normalized
    }

    /// Last emitted PTS, if any frame has been normalized
    pub fn last_us(&self) -> Option<i64> {
        self.last_us
    }
}

/// Audio timestamp state derived from the cumulative sample count
#[derive(Debug, Clone)]
pub struct AudioTimestamps {
    sample_rate: u32,
    bytes_per_frame: usize,
    frames_submitted: u64,
    pending_bytes: usize,
}

impl AudioTimestamps {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            bytes_per_frame: 2 * channels.max(1) as usize,
            frames_submitted: 0,
            pending_bytes: 0,
        }
    }

    /// PTS of the next chunk to submit
    pub fn next_pts_us(&self) -> i64 {
        (self.frames_submitted as u128 * 1_000_000 / self.sample_rate as u128) as i64
    }

    /// Account for `bytes` of 16-bit PCM that were just submitted.
    ///
    /// Partial sample-frames are carried over to the next call.
    pub fn advance(&mut self, bytes: usize) {
        let total = self.pending_bytes + bytes;
        self.frames_submitted += (total / self.bytes_per_frame) as u64;
        self.pending_bytes = total % self.bytes_per_frame;
    }

    /// Sample-frames submitted so far
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
