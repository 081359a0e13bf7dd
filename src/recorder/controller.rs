use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::session::RecordingSession;
use super::settings::RecorderSettings;
use super::state::{RecorderState, StateCell};
use super::stats::RecordingOutput;
use crate::codec::{CodecFactory, SoftwareCodecFactory};
use crate::error::{RecorderError, RecorderResult};
use crate::media::Orientation;

/// Frames waiting for the worker before new ones are dropped
pub const FRAME_QUEUE_DEPTH: usize = 8;

type StopCallback = Box<dyn FnOnce(Option<RecordingOutput>) + Send + 'static>;

/// Lifecycle requests posted to the recorder worker, executed in arrival order
enum Command {
    Start { orientation: Orientation },
    Stop { reply: StopCallback },
}

struct Frame {
    data: Vec<u8>,
    timestamp_ns: i64,
}

/// Completion of a `stop` request; resolves exactly once
///
/// Await it from async code or call [`StopHandle::wait`] from a plain thread.
pub struct StopHandle {
    rx: oneshot::Receiver<Option<RecordingOutput>>,
}

impl StopHandle {
    /// Block the current (non-async) thread until teardown completes
    pub fn wait(self) -> Option<RecordingOutput> {
        self.rx.blocking_recv().ok().flatten()
    }
}

impl Future for StopHandle {
    type Output = Option<RecordingOutput>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| result.ok().flatten())
    }
}

/// Camera recorder: the caller-facing side of the recording pipeline
///
/// All methods return immediately and are safe to call from any thread. Work is
/// posted to a single worker thread that owns the active [`RecordingSession`] and is
/// the only place encoders are driven from (apart from the audio capture thread).
/// Frames travel on a bounded queue; when the worker falls behind they are dropped.
pub struct Recorder {
    state: Arc<StateCell>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    frames: Option<mpsc::Sender<Frame>>,
    frames_rejected: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Create a recorder using the built-in software codecs
    pub fn new(settings: RecorderSettings) -> RecorderResult<Self> {
        Self::with_codecs(settings, Arc::new(SoftwareCodecFactory))
    }

    /// Create a recorder with a custom codec factory
    pub fn with_codecs(settings: RecorderSettings, codecs: Arc<dyn CodecFactory>) -> RecorderResult<Self> {
        let state = Arc::new(StateCell::new());
        let frames_rejected = Arc::new(AtomicU64::new(0));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (frames, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);

        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let worker = Worker {
            settings,
            codecs,
            state: Arc::clone(&state),
            frames_rejected: Arc::clone(&frames_rejected),
            session: None,
        };
        let handle = std::thread::Builder::new()
            .name("camrec-worker".to_string())
            .spawn(move || runtime.block_on(worker.run(command_rx, frame_rx)))?;

        Ok(Self {
            state,
            commands: Some(commands),
            frames: Some(frames),
            frames_rejected,
            worker: Some(handle),
        })
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    pub fn is_recording(&self) -> bool {
        self.state.get() != RecorderState::Idle
    }

    /// Begin a new recording. Returns `false` if one is already in progress.
    pub fn start(&self, orientation: Orientation) -> bool {
        if let Err(current) = self
            .state
            .transition(&[RecorderState::Idle], RecorderState::Starting)
        {
            warn!("Recording is already in progress ({:?})", current);
            return false;
        }
        self.frames_rejected.store(0, Ordering::Relaxed);

        if let Err(e) = self.send(Command::Start { orientation }) {
            error!("Failed to start recording: {}", e);
            self.state.set(RecorderState::Idle);
            return false;
        }
        true
    }

    /// Submit one filtered NV12 frame with its raw capture timestamp (nanoseconds).
    ///
    /// Ignored unless a recording is starting or running. Dropped (and counted in
    /// [`RecordingOutput::frames_dropped`]) when [`FRAME_QUEUE_DEPTH`] frames are already
    /// waiting.
    pub fn on_frame_available(&self, frame: Vec<u8>, timestamp_ns: i64) {
        if !self.state.get().accepts_frames() {
            return;
        }
        let Some(frames) = &self.frames else {
            return;
        };
        match frames.try_send(Frame {
            data: frame,
            timestamp_ns,
        }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.frames_rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Frame queue full; frame at {}ns dropped", timestamp_ns);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Recorder worker gone; frame at {}ns dropped", timestamp_ns);
            }
        }
    }

    /// Stop the active recording. Redundant calls resolve immediately with `None`.
    pub fn stop(&self) -> StopHandle {
        let (tx, rx) = oneshot::channel();
        self.stop_with(move |output| {
            let _ = tx.send(output);
        });
        StopHandle { rx }
    }

    /// Stop the active recording and invoke `callback` exactly once with the result
    pub fn stop_with<F>(&self, callback: F)
    where
        F: FnOnce(Option<RecordingOutput>) + Send + 'static,
    {
        if let Err(current) = self.state.transition(
            &[RecorderState::Starting, RecorderState::Recording],
            RecorderState::Stopping,
        ) {
            debug!("Stop requested while {:?}; nothing to stop", current);
            callback(None);
            return;
        }

        let command = Command::Stop {
            reply: Box::new(callback),
        };
        let Some(commands) = &self.commands else {
            self.state.set(RecorderState::Idle);
            if let Command::Stop { reply } = command {
                reply(None);
            }
            return;
        };
        if let Err(mpsc::error::SendError(Command::Stop { reply })) = commands.send(command) {
            error!("Recorder worker gone; reporting no result");
            self.state.set(RecorderState::Idle);
            reply(None);
        }
    }

    fn send(&self, command: Command) -> RecorderResult<()> {
        self.commands
            .as_ref()
            .ok_or(RecorderError::WorkerUnavailable)?
            .send(command)
            .map_err(|_| RecorderError::WorkerUnavailable)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.state.get() != RecorderState::Idle {
            // Teardown runs on the worker; the result has nobody left to receive it
            let _ = self.stop();
        }
        self.commands = None;
        self.frames = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Recorder worker panicked");
            }
        }
    }
}

/// Owns the active session; runs on the dedicated worker thread
struct Worker {
    settings: RecorderSettings,
    codecs: Arc<dyn CodecFactory>,
    state: Arc<StateCell>,
    frames_rejected: Arc<AtomicU64>,
    session: Option<RecordingSession>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut frames: mpsc::Receiver<Frame>,
    ) {
        debug!("Recorder worker started");

        loop {
            tokio::select! {
                // Lifecycle first, so a session exists before its first frame is taken
                biased;
                command = commands.recv() => match command {
                    Some(Command::Start { orientation }) => self.begin(orientation),
                    Some(Command::Stop { reply }) => {
                        // Frames queued ahead of the stop still belong to this recording
                        while let Ok(frame) = frames.try_recv() {
                            self.frame(frame);
                        }
                        let output = self.finish();
                        reply(output);
                    }
                    None => break,
                },
                Some(frame) = frames.recv() => self.frame(frame),
            }
        }

        // Recorder dropped without a final stop
        if self.session.is_some() {
            let _ = self.finish();
        }
        debug!("Recorder worker exiting");
    }

    fn frame(&mut self, frame: Frame) {
        if let Some(session) = self.session.as_mut() {
            session.on_frame(&frame.data, frame.timestamp_ns);
        }
    }

    /// Starting -> Recording, or back to Idle if setup fails
    fn begin(&mut self, orientation: Orientation) {
        if let Some(session) = &self.session {
            warn!("Start ignored: session {} still active", session.id());
            return;
        }
        match RecordingSession::open(&self.settings, self.codecs.as_ref(), orientation) {
            Ok(session) => {
                let id = session.id();
                self.session = Some(session);
                if self
                    .state
                    .transition(&[RecorderState::Starting], RecorderState::Recording)
                    .is_ok()
                {
                    info!("Recording {} in progress", id);
                }
            }
            Err(e) => {
                error!("Failed to start recording: {:#}", e);
                // A stop may already be queued; it will move the state to Idle itself
                let _ = self
                    .state
                    .transition(&[RecorderState::Starting], RecorderState::Idle);
            }
        }
    }

    /// Stopping -> Idle
    fn finish(&mut self) -> Option<RecordingOutput> {
        let rejected = self.frames_rejected.swap(0, Ordering::Relaxed);
        let output = self
            .session
            .take()
            .and_then(|session| session.close(&self.settings))
            .map(|mut output| {
                output.frames_dropped += rejected;
                output
            });
        self.state.set(RecorderState::Idle);
        info!("Recorder idle");
        output
    }
}
