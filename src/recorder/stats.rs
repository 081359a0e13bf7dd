use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result handed to the stop callback for a recording that produced a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingOutput {
    /// Recording session identifier
    pub session_id: String,

    /// Finished container file
    pub path: PathBuf,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// When the container was closed
    pub finished_at: DateTime<Utc>,

    /// Video samples written to the container
    pub video_samples: u64,

    /// Audio samples written to the container
    pub audio_samples: u64,

    /// Frames accepted by the video encoder
    pub frames_submitted: u64,

    /// Frames dropped because the frame queue was full or no encoder input slot was free
    pub frames_dropped: u64,

    /// Audio captured, in seconds, derived from the sample count
    pub audio_duration_secs: f64,
}
