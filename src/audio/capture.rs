// Audio capture thread
//
// Pulls PCM from the microphone straight into audio encoder input slots at the
// device's pace, independent of the video frame cadence. The encoder lock is held
// only around encoder calls, never across the device read.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{debug, error, info, warn};

use super::source::MicrophoneSource;
use crate::encoder::EncoderSession;
use crate::error::{RecorderError, RecorderResult};
use crate::media::{AudioTimestamps, SampleFlags};
use crate::muxer::MuxerTrackRegistry;

/// Default bound on waiting for the capture thread to exit
pub const AUDIO_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// What the capture thread did before it exited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioCaptureReport {
    /// Sample-frames submitted to the encoder
    pub frames_submitted: u64,
    /// PTS the next chunk would have carried (equals frames / rate)
    pub end_pts_us: i64,
    /// Cycles where the device delivered nothing
    pub empty_reads: u64,
    /// Cycles where the device read failed
    pub read_errors: u64,
    /// Cycles where no encoder input slot became free
    pub slot_timeouts: u64,
}

/// Signals the controller when the thread body exits, including on panic
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Handle to the running capture thread
pub struct AudioCaptureThread {
    cancel: Arc<AtomicBool>,
    exited: Receiver<()>,
    handle: Option<JoinHandle<AudioCaptureReport>>,
}

impl AudioCaptureThread {
    /// Spawn the capture loop at raised priority. The microphone must already be started.
    pub fn spawn(
        encoder: Arc<Mutex<EncoderSession>>,
        registry: Arc<MuxerTrackRegistry>,
        microphone: Box<dyn MicrophoneSource>,
        timestamps: AudioTimestamps,
    ) -> RecorderResult<Self> {
        if !microphone.is_capturing() {
            return Err(RecorderError::Device(format!(
                "{} microphone is not capturing",
                microphone.name()
            )));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (exit_tx, exited) = bounded(1);

        let thread_cancel = Arc::clone(&cancel);
        let handle = std::thread::Builder::new()
            .name("camrec-audio".to_string())
            .spawn(move || {
                let _exit = ExitSignal(exit_tx);
                raise_priority();
                capture_loop(encoder, registry, microphone, timestamps, thread_cancel)
            })
            .map_err(|e| RecorderError::Device(format!("Failed to spawn audio thread: {}", e)))?;

        info!("Audio capture thread started");

        Ok(Self {
            cancel,
            exited,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Request cancellation and wait at most `timeout` for the thread to exit.
    ///
    /// Returns `None` if the thread did not exit in time; it is then detached and will
    /// finish on its own once its current device read returns.
    pub fn stop(mut self, timeout: Duration) -> Option<AudioCaptureReport> {
        self.cancel.store(true, Ordering::SeqCst);

        let handle = self.handle.take()?;
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match handle.join() {
                Ok(report) => {
                    info!(
                        "Audio capture thread stopped ({} frames, {:.3}s)",
                        report.frames_submitted,
                        report.end_pts_us as f64 / 1_000_000.0
                    );
                    Some(report)
                }
                Err(_) => {
                    error!("Audio capture thread panicked");
                    None
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Audio capture thread did not exit within {:?}; detaching",
                    timeout
                );
                None
            }
        }
    }
}

impl Drop for AudioCaptureThread {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Best effort: unprivileged processes are often not allowed to raise priority
fn raise_priority() {
    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => debug!("Audio capture thread priority raised"),
        Err(e) => warn!("Audio capture thread keeps default priority: {:?}", e),
    }
}

fn capture_loop(
    encoder: Arc<Mutex<EncoderSession>>,
    registry: Arc<MuxerTrackRegistry>,
    mut microphone: Box<dyn MicrophoneSource>,
    mut timestamps: AudioTimestamps,
    cancel: Arc<AtomicBool>,
) -> AudioCaptureReport {
    let mut report = AudioCaptureReport::default();

    while !cancel.load(Ordering::SeqCst) {
        let slot = encoder.lock().acquire_input();

        match slot {
            Some(mut slot) => {
                let bytes = match microphone.read(slot.as_mut_slice()) {
                    Ok(n) => n,
                    Err(e) => {
                        if report.read_errors == 0 {
                            warn!("Microphone read failed, submitting silence: {}", e);
                        } else {
                            debug!("Microphone read failed: {}", e);
                        }
                        report.read_errors += 1;
                        0
                    }
                };
                if bytes == 0 {
                    report.empty_reads += 1;
                }
                slot.set_len(bytes);

                // Zero-length inputs keep the encoder pipeline moving
                let pts_us = if bytes > 0 { timestamps.next_pts_us() } else { 0 };
                match encoder.lock().queue_input(slot, pts_us, SampleFlags::NONE) {
                    Ok(()) => timestamps.advance(bytes),
                    Err(e) => warn!("Failed to queue audio input: {}", e),
                }
            }
            None => report.slot_timeouts += 1,
        }

        if let Err(e) = encoder.lock().drain_available(&registry) {
            error!("Failed to drain audio encoder: {}", e);
        }
    }

    if let Err(e) = microphone.stop() {
        warn!("Failed to stop {} microphone: {}", microphone.name(), e);
    }

    report.frames_submitted = timestamps.frames_submitted();
    report.end_pts_us = timestamps.next_pts_us();
    report
}
