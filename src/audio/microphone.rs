// Default input device via cpal
//
// cpal streams are not `Send` on every platform, so the stream is built, played and
// dropped on a helper thread. Its callback converts to 16-bit PCM and hands buffers
// over a bounded channel; `read` takes from that channel with a bounded wait.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::source::MicrophoneSource;
use crate::error::{RecorderError, RecorderResult};

/// Callback buffers held before the capture thread picks them up
const CALLBACK_QUEUE_DEPTH: usize = 32;
/// Upper bound for the device to open and start streaming
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound for a single `read` to wait for the device
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Host default microphone
pub struct CpalMicrophone {
    sample_rate: u32,
    channels: u16,
    buffers: Option<Receiver<Vec<i16>>>,
    pending: Vec<u8>,
    shutdown: Option<Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
    overruns: Arc<AtomicU64>,
    name: String,
}

impl CpalMicrophone {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            buffers: None,
            pending: Vec::new(),
            shutdown: None,
            stream_thread: None,
            overruns: Arc::new(AtomicU64::new(0)),
            name: "microphone".to_string(),
        }
    }

    /// Callback buffers dropped because the capture thread fell behind
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Default,
        }
    }

    /// Open the default input device and keep its stream alive until `shutdown` fires
    fn run_stream(
        config: StreamConfig,
        buffers: Sender<Vec<i16>>,
        overruns: Arc<AtomicU64>,
        ready: Sender<Result<String, String>>,
        shutdown: Receiver<()>,
    ) {
        let host = cpal::default_host();
        let Some(device) = host.default_input_device() else {
            let _ = ready.send(Err("No microphone available".to_string()));
            return;
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let sample_format = match device.default_input_config() {
            Ok(supported) => supported.sample_format(),
            Err(e) => {
                let _ = ready.send(Err(format!("Failed to get input config: {}", e)));
                return;
            }
        };

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, buffers, overruns),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, buffers, overruns),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, buffers, overruns),
            other => Err(format!("Unsupported sample format: {:?}", other)),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready.send(Err(format!("Failed to start microphone stream: {}", e)));
            return;
        }
        let _ = ready.send(Ok(device_name));

        // Returns on an explicit stop or once the owner is dropped
        let _ = shutdown.recv();
        drop(stream);
        debug!("Microphone stream closed");
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffers: Sender<Vec<i16>>,
    overruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, String>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let pcm: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                match buffers.try_send(pcm) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        overruns.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(|e| format!("Failed to build input stream: {}", e))
}

impl MicrophoneSource for CpalMicrophone {
    fn start(&mut self) -> RecorderResult<()> {
        if self.stream_thread.is_some() {
            return Ok(());
        }

        let (buffer_tx, buffer_rx) = bounded(CALLBACK_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let config = self.stream_config();
        let overruns = Arc::clone(&self.overruns);

        let handle = std::thread::Builder::new()
            .name("camrec-mic-stream".to_string())
            .spawn(move || Self::run_stream(config, buffer_tx, overruns, ready_tx, shutdown_rx))
            .map_err(|e| RecorderError::Device(format!("Failed to spawn microphone thread: {}", e)))?;

        let device_name = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(RecorderError::Device(e));
            }
            Err(_) => {
                drop(shutdown_tx);
                return Err(RecorderError::Device(
                    "Microphone did not start in time".to_string(),
                ));
            }
        };

        info!(
            "Microphone started: {} ({}Hz, {} channels)",
            device_name, self.sample_rate, self.channels
        );
        self.name = device_name;
        self.buffers = Some(buffer_rx);
        self.shutdown = Some(shutdown_tx);
        self.stream_thread = Some(handle);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> RecorderResult<usize> {
        let Some(buffers) = &self.buffers else {
            return Err(RecorderError::Device("Microphone is not started".to_string()));
        };

        if self.pending.is_empty() {
            match buffers.recv_timeout(READ_TIMEOUT) {
                Ok(pcm) => self.pending = pcm.iter().flat_map(|s| s.to_le_bytes()).collect(),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecorderError::Device("Microphone stream ended".to_string()))
                }
            }
        }

        // Whole sample-frames only
        let frame_bytes = 2 * self.channels as usize;
        let n = self.pending.len().min(buf.len() / frame_bytes * frame_bytes);
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.shutdown = None;
        self.buffers = None;
        self.pending.clear();

        if let Some(handle) = self.stream_thread.take() {
            handle
                .join()
                .map_err(|_| RecorderError::Device("Microphone thread panicked".to_string()))?;
            let overruns = self.overruns();
            if overruns > 0 {
                warn!("Microphone dropped {} buffers while capturing", overruns);
            }
            info!("Microphone stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream_thread.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop microphone: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unstarted_microphone() {
        let mut mic = CpalMicrophone::new(44_100, 0);
        let mut buf = [0u8; 8];

        assert!(!mic.is_capturing());
        assert_eq!(mic.stream_config().channels, 1);
        assert!(matches!(mic.read(&mut buf), Err(RecorderError::Device(_))));
        assert!(mic.stop().is_ok());
    }
}
