//! Recording session controller
//!
//! This module provides the [`Recorder`] that manages:
//! - The `Idle -> Starting -> Recording -> Stopping -> Idle` lifecycle
//! - A single worker thread that serializes all encoder work
//! - Per-recording sessions (container, encoders, audio capture thread)
//! - Exactly-once stop completion

mod controller;
mod session;
mod settings;
mod state;
mod stats;

pub use controller::{Recorder, StopHandle, FRAME_QUEUE_DEPTH};
pub use settings::RecorderSettings;
pub use state::RecorderState;
pub use stats::RecordingOutput;
