use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::codec::{Codec, CodecFactory, InputSlot, OutputEvent};
use crate::error::{RecorderError, RecorderResult};
use crate::media::{EncodedSample, MediaFormat, MediaParameters, SampleFlags, TrackRole};
use crate::muxer::MuxerTrackRegistry;

/// Bounded wait for encoder input slots and output retrieval
pub const INPUT_TIMEOUT: Duration = Duration::from_millis(10);

/// Outcome of submitting raw input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Queued,
    /// No input slot became free within the wait
    WouldBlock,
}

/// One codec instance bound to one container track
pub struct EncoderSession {
    role: TrackRole,
    codec: Option<Box<dyn Codec>>,
    output_format: Option<MediaFormat>,
    track_index: Option<usize>,
    input_timeout: Duration,
    started: bool,
    end_of_stream: bool,
}

impl EncoderSession {
    /// Build the codec for `params`
    pub fn configure(factory: &dyn CodecFactory, params: MediaParameters) -> RecorderResult<Self> {
        let role = params.role();
        let codec = factory.create(&params)?;

        info!("Configured {} encoder: {} ({})", role, codec.name(), params.mime());

        Ok(Self {
            role,
            codec: Some(codec),
            output_format: None,
            track_index: None,
            input_timeout: INPUT_TIMEOUT,
            started: false,
            end_of_stream: false,
        })
    }

    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    pub fn output_format(&self) -> Option<&MediaFormat> {
        self.output_format.as_ref()
    }

    pub fn track_index(&self) -> Option<usize> {
        self.track_index
    }

    pub fn is_released(&self) -> bool {
        self.codec.is_none()
    }

    pub fn reached_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    fn codec(&mut self) -> RecorderResult<&mut Box<dyn Codec>> {
        let role = self.role;
        self.codec
            .as_mut()
            .ok_or_else(|| RecorderError::Codec(format!("{} encoder already released", role)))
    }

    pub fn start(&mut self) -> RecorderResult<()> {
        self.codec()?.start()?;
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) -> RecorderResult<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.codec()?.stop()
    }

    /// Stop (if needed) and free the codec. Safe to call repeatedly.
    pub fn release(&mut self) {
        let Some(mut codec) = self.codec.take() else {
            return;
        };
        if self.started {
            self.started = false;
            if let Err(e) = codec.stop() {
                warn!("Failed to stop {} encoder: {}", self.role, e);
            }
        }
        codec.release();
        debug!("{} encoder released", self.role);
    }

    /// Borrow an input slot, waiting at most the input timeout
    pub fn acquire_input(&mut self) -> Option<InputSlot> {
        let timeout = self.input_timeout;
        self.codec.as_mut()?.dequeue_input(timeout)
    }

    pub fn queue_input(&mut self, slot: InputSlot, pts_us: i64, flags: SampleFlags) -> RecorderResult<()> {
        self.codec()?.queue_input(slot, pts_us, flags)
    }

    /// Copy `data` into a free slot and queue it.
    ///
    /// With `end_of_stream` the submission is flagged so the codec flushes everything
    /// it still holds.
    pub fn submit_input(
        &mut self,
        data: &[u8],
        pts_us: i64,
        end_of_stream: bool,
    ) -> RecorderResult<InputStatus> {
        let Some(mut slot) = self.acquire_input() else {
            return Ok(InputStatus::WouldBlock);
        };

        let copied = slot.fill(data);
        if copied < data.len() {
            warn!(
                "{} input truncated: {} of {} bytes fit the slot",
                self.role,
                copied,
                data.len()
            );
        }

        let flags = if end_of_stream {
            SampleFlags::END_OF_STREAM
        } else {
            SampleFlags::NONE
        };
        self.queue_input(slot, pts_us, flags)?;
        Ok(InputStatus::Queued)
    }

    /// Queue a zero-length end-of-stream input
    pub fn signal_end_of_stream(&mut self) -> RecorderResult<InputStatus> {
        self.submit_input(&[], 0, true)
    }

    /// Non-blocking drain: forward whatever output is ready and return.
    ///
    /// Returns `true` once the end-of-stream sample has been drained.
    pub fn drain_available(&mut self, registry: &MuxerTrackRegistry) -> RecorderResult<bool> {
        if self.end_of_stream {
            return Ok(true);
        }
        loop {
            let timeout = self.input_timeout;
            match self.codec()?.dequeue_output(timeout)? {
                OutputEvent::TryAgainLater => return Ok(false),
                event => {
                    if self.handle_output(registry, event)? {
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// Blocking drain: forward output until end-of-stream or until `timeout` elapses.
    ///
    /// Returns `false` if the deadline passed first.
    pub fn drain_until_end_of_stream(
        &mut self,
        registry: &MuxerTrackRegistry,
        timeout: Duration,
    ) -> RecorderResult<bool> {
        if self.end_of_stream {
            return Ok(true);
        }
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let wait = self.input_timeout;
            let event = self.codec()?.dequeue_output(wait)?;
            if event == OutputEvent::TryAgainLater {
                continue;
            }
            if self.handle_output(registry, event)? {
                return Ok(true);
            }
        }

        warn!(
            "{} encoder did not reach end-of-stream within {:?}",
            self.role, timeout
        );
        Ok(false)
    }

    /// Drain until the format-change event registered this session's track.
    ///
    /// Returns `false` if no format was announced within `timeout`.
    pub fn await_format(&mut self, registry: &MuxerTrackRegistry, timeout: Duration) -> RecorderResult<bool> {
        let deadline = Instant::now() + timeout;

        while self.track_index.is_none() && Instant::now() < deadline {
            let wait = self.input_timeout;
            let event = self.codec()?.dequeue_output(wait)?;
            if event == OutputEvent::TryAgainLater {
                continue;
            }
            if self.handle_output(registry, event)? {
                break;
            }
        }

        if self.track_index.is_none() {
            warn!("{} encoder announced no output format within {:?}", self.role, timeout);
        }
        Ok(self.track_index.is_some())
    }

    /// Returns `true` for the end-of-stream sample
    fn handle_output(&mut self, registry: &MuxerTrackRegistry, event: OutputEvent) -> RecorderResult<bool> {
        match event {
            OutputEvent::FormatChanged(format) => {
                self.register_format(registry, format)?;
                Ok(false)
            }
            OutputEvent::Sample(sample) => {
                self.forward(registry, &sample)?;
                if sample.is_end_of_stream() {
                    self.end_of_stream = true;
                    debug!("{} encoder reached end-of-stream", self.role);
                    return Ok(true);
                }
                Ok(false)
            }
            OutputEvent::TryAgainLater => Ok(false),
        }
    }

    fn register_format(&mut self, registry: &MuxerTrackRegistry, format: MediaFormat) -> RecorderResult<()> {
        if self.output_format.is_some() {
            return Err(RecorderError::DuplicateTrackRegistration(self.role));
        }
        let index = registry.register_track(self.role, &format)?;
        self.output_format = Some(format);
        self.track_index = Some(index);
        Ok(())
    }

    fn forward(&mut self, registry: &MuxerTrackRegistry, sample: &EncodedSample) -> RecorderResult<()> {
        if sample.is_codec_config() || sample.data.is_empty() {
            return Ok(());
        }
        match self.track_index {
            Some(index) => {
                registry.write_sample(index, sample)?;
            }
            None => debug!(
                "Dropping {} sample at {}us: track not registered",
                self.role, sample.pts_us
            ),
        }
        Ok(())
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.release();
    }
}
