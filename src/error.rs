//! Error types for the recording pipeline.

use thiserror::Error;

use crate::media::TrackRole;

/// Errors raised by the encode-and-mux pipeline
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No encoder available for {0}")]
    CodecUnavailable(String),

    #[error("Track already registered for {0}")]
    DuplicateTrackRegistration(TrackRole),

    #[error("Muxer already started")]
    MuxerAlreadyStarted,

    #[error("No encoder input slot available")]
    InputSlotUnavailable,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Recorder worker is not running")]
    WorkerUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
