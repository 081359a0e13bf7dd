// Built-in software codec
//
// Runs encoding on a dedicated thread so that input and output are decoupled the same
// way they are for platform encoders. "Encoding" is a passthrough: NV12 frames and
// 16-bit PCM are copied into samples unchanged. The codec still goes through the full
// protocol: format change first, one codec-config sample, data samples, end-of-stream.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::{Codec, CodecFactory, InputSlot, OutputEvent};
use crate::error::{RecorderError, RecorderResult};
use crate::media::{
    EncodedSample, MediaFormat, MediaParameters, SampleFlags, MIME_AUDIO_RAW, MIME_VIDEO_RAW,
};

/// Input slots per video codec
pub const VIDEO_INPUT_SLOTS: usize = 4;
/// Input slots per audio codec
pub const AUDIO_INPUT_SLOTS: usize = 8;

/// Factory for the built-in passthrough codecs ("video/raw", "audio/raw")
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCodecFactory;

impl CodecFactory for SoftwareCodecFactory {
    fn create(&self, params: &MediaParameters) -> RecorderResult<Box<dyn Codec>> {
        Ok(Box::new(SoftwareCodec::new(params.clone())?))
    }
}

struct CodecInput {
    slot: InputSlot,
    pts_us: i64,
    flags: SampleFlags,
}

struct CodecOutput {
    event: OutputEvent,
    /// Slot to recycle once the output has been dequeued
    slot: Option<InputSlot>,
}

/// Passthrough encoder with a bounded pool of input slots
pub struct SoftwareCodec {
    name: String,
    params: MediaParameters,
    free_tx: Sender<InputSlot>,
    free_rx: Receiver<InputSlot>,
    input_tx: Option<Sender<CodecInput>>,
    output_rx: Option<Receiver<CodecOutput>>,
    thread: Option<JoinHandle<()>>,
    released: bool,
}

impl SoftwareCodec {
    pub fn new(params: MediaParameters) -> RecorderResult<Self> {
        let (slot_count, slot_capacity) = match &params {
            MediaParameters::Video(p) if p.mime == MIME_VIDEO_RAW => {
                (VIDEO_INPUT_SLOTS, p.frame_size().max(1))
            }
            MediaParameters::Audio(p) if p.mime == MIME_AUDIO_RAW => {
                (AUDIO_INPUT_SLOTS, p.input_buffer_size.max(p.bytes_per_frame()))
            }
            other => return Err(RecorderError::CodecUnavailable(other.mime().to_string())),
        };

        let (free_tx, free_rx) = bounded(slot_count);
        for index in 0..slot_count {
            // Capacity equals slot_count, so this never blocks
            let _ = free_tx.send(InputSlot::new(index, slot_capacity));
        }

        let name = format!("software-{}", params.role());
        debug!(
            "{} codec configured ({} slots x {} bytes)",
            name, slot_count, slot_capacity
        );

        Ok(Self {
            name,
            params,
            free_tx,
            free_rx,
            input_tx: None,
            output_rx: None,
            thread: None,
            released: false,
        })
    }

    fn output_format(&self) -> MediaFormat {
        match &self.params {
            MediaParameters::Video(p) => MediaFormat::Video {
                mime: p.mime.clone(),
                width: p.width,
                height: p.height,
                frame_rate: p.frame_rate,
                bitrate: p.bitrate,
            },
            MediaParameters::Audio(p) => MediaFormat::Audio {
                mime: p.mime.clone(),
                sample_rate: p.sample_rate,
                channels: p.channels,
                bitrate: p.bitrate,
            },
        }
    }

    fn key_frame_interval(&self) -> u64 {
        match &self.params {
            MediaParameters::Video(p) => (p.frame_rate as u64 * p.key_frame_interval_secs as u64).max(1),
            // Every PCM chunk is independently decodable
            MediaParameters::Audio(_) => 1,
        }
    }

    fn encode_loop(
        format: MediaFormat,
        key_frame_interval: u64,
        input_rx: Receiver<CodecInput>,
        output_tx: Sender<CodecOutput>,
        free_tx: Sender<InputSlot>,
    ) {
        let codec_config = serde_json::to_vec(&format).unwrap_or_default();

        let _ = output_tx.send(CodecOutput {
            event: OutputEvent::FormatChanged(format),
            slot: None,
        });
        let _ = output_tx.send(CodecOutput {
            event: OutputEvent::Sample(EncodedSample {
                data: codec_config,
                pts_us: 0,
                flags: SampleFlags::CODEC_CONFIG,
            }),
            slot: None,
        });

        let mut encoded = 0u64;
        let mut last_pts_us = 0i64;

        while let Ok(CodecInput { mut slot, pts_us, flags }) = input_rx.recv() {
            let end_of_stream = flags.contains(SampleFlags::END_OF_STREAM);

            if slot.is_empty() {
                if end_of_stream {
                    let _ = output_tx.send(CodecOutput {
                        event: OutputEvent::Sample(EncodedSample {
                            data: Vec::new(),
                            pts_us: last_pts_us,
                            flags: SampleFlags::END_OF_STREAM,
                        }),
                        slot: Some(slot),
                    });
                    break;
                }
                let _ = free_tx.send(slot);
                continue;
            }

            let mut sample_flags = SampleFlags::NONE;
            if encoded % key_frame_interval == 0 {
                sample_flags = sample_flags.with(SampleFlags::KEY_FRAME);
            }
            if end_of_stream {
                sample_flags = sample_flags.with(SampleFlags::END_OF_STREAM);
            }

            let data = slot.data().to_vec();
            slot.clear();
            encoded += 1;
            last_pts_us = pts_us;

            let _ = output_tx.send(CodecOutput {
                event: OutputEvent::Sample(EncodedSample {
                    data,
                    pts_us,
                    flags: sample_flags,
                }),
                slot: Some(slot),
            });

            if end_of_stream {
                break;
            }
        }
    }
}

impl Codec for SoftwareCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> RecorderResult<()> {
        if self.released {
            return Err(RecorderError::Codec(format!("{} already released", self.name)));
        }
        if self.thread.is_some() {
            return Ok(());
        }

        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let format = self.output_format();
        let key_frame_interval = self.key_frame_interval();
        let free_tx = self.free_tx.clone();

        let thread = std::thread::Builder::new()
            .name(format!("camrec-{}", self.name))
            .spawn(move || {
                Self::encode_loop(format, key_frame_interval, input_rx, output_tx, free_tx)
            })
            .map_err(|e| RecorderError::Codec(format!("Failed to spawn codec thread: {}", e)))?;

        self.input_tx = Some(input_tx);
        self.output_rx = Some(output_rx);
        self.thread = Some(thread);

        info!("{} codec started", self.name);
        Ok(())
    }

    fn dequeue_input(&mut self, timeout: Duration) -> Option<InputSlot> {
        self.input_tx.as_ref()?;
        self.free_rx.recv_timeout(timeout).ok()
    }

    fn queue_input(&mut self, mut slot: InputSlot, pts_us: i64, flags: SampleFlags) -> RecorderResult<()> {
        let Some(input_tx) = &self.input_tx else {
            return Err(RecorderError::Codec(format!("{} is not started", self.name)));
        };

        if let Err(e) = input_tx.send(CodecInput { slot, pts_us, flags }) {
            // Encoder thread is gone (end-of-stream already seen); hand the slot back
            slot = e.into_inner().slot;
            slot.clear();
            let _ = self.free_tx.send(slot);
            return Err(RecorderError::Codec(format!("{} no longer accepts input", self.name)));
        }

        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> RecorderResult<OutputEvent> {
        let Some(output_rx) = &self.output_rx else {
            return Err(RecorderError::Codec(format!("{} is not started", self.name)));
        };

        match output_rx.recv_timeout(timeout) {
            Ok(CodecOutput { event, slot }) => {
                if let Some(slot) = slot {
                    let _ = self.free_tx.send(slot);
                }
                Ok(event)
            }
            Err(RecvTimeoutError::Timeout) => Ok(OutputEvent::TryAgainLater),
            Err(RecvTimeoutError::Disconnected) => {
                // Encoder thread finished; honor the wait so callers don't spin
                std::thread::sleep(timeout);
                Ok(OutputEvent::TryAgainLater)
            }
        }
    }

    fn stop(&mut self) -> RecorderResult<()> {
        // Closing the input queue lets the encode loop run to completion
        self.input_tx = None;
        self.output_rx = None;

        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| RecorderError::Codec(format!("{} thread panicked", self.name)))?;
            info!("{} codec stopped", self.name);
        }

        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop {} during release: {}", self.name, e);
        }
        self.released = true;
        debug!("{} codec released", self.name);
    }
}

impl Drop for SoftwareCodec {
    fn drop(&mut self) {
        self.release();
    }
}
