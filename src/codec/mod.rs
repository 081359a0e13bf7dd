//! Codec abstraction
//!
//! A [`Codec`] is one encoder instance with a pool of input slots and an output queue,
//! modelled on platform media codecs: input is borrowed as a slot, filled, then queued
//! with a timestamp; output is retrieved as a stream of [`OutputEvent`]s where the
//! negotiated format is announced once before any data sample.

pub mod software;

pub use software::{SoftwareCodec, SoftwareCodecFactory};

use std::time::Duration;

use crate::error::RecorderResult;
use crate::media::{EncodedSample, MediaFormat, MediaParameters, SampleFlags};

/// Raw input buffer lent out by a codec
#[derive(Debug)]
pub struct InputSlot {
    index: usize,
    buffer: Vec<u8>,
    len: usize,
}

impl InputSlot {
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            buffer: vec![0; capacity],
            len: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Filled portion of the slot
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whole backing buffer, for readers that fill the slot in place
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Mark the first `len` bytes as filled (clamped to capacity)
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buffer.len());
    }

    /// Copy `data` into the slot, returning how many bytes fit
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.buffer.len());
        self.buffer[..n].copy_from_slice(&data[..n]);
        self.len = n;
        n
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

/// One result of polling a codec's output queue
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// The codec negotiated its output format
    FormatChanged(MediaFormat),
    /// An encoded sample (may carry codec-config or end-of-stream flags)
    Sample(EncodedSample),
    /// Nothing became available within the wait
    TryAgainLater,
}

/// Encoder instance
///
/// Implementations:
/// - [`SoftwareCodec`]: built-in passthrough encoder running on its own thread
pub trait Codec: Send {
    /// Codec name for logging
    fn name(&self) -> &str;

    /// Start accepting input
    fn start(&mut self) -> RecorderResult<()>;

    /// Borrow a free input slot, waiting at most `timeout`
    fn dequeue_input(&mut self, timeout: Duration) -> Option<InputSlot>;

    /// Queue a filled slot for encoding
    fn queue_input(&mut self, slot: InputSlot, pts_us: i64, flags: SampleFlags) -> RecorderResult<()>;

    /// Retrieve the next output event, waiting at most `timeout`
    fn dequeue_output(&mut self, timeout: Duration) -> RecorderResult<OutputEvent>;

    /// Stop encoding; pending output is discarded
    fn stop(&mut self) -> RecorderResult<()>;

    /// Free all codec resources. Must be safe to call more than once.
    fn release(&mut self);
}

/// Constructs codecs for the requested parameters
pub trait CodecFactory: Send + Sync {
    /// Fails with `CodecUnavailable` when no encoder handles the mime
    fn create(&self, params: &MediaParameters) -> RecorderResult<Box<dyn Codec>>;
}
