pub mod audio;
pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod media;
pub mod muxer;
pub mod recorder;

pub use audio::{AudioCaptureThread, AudioSource, CpalMicrophone, MicrophoneFactory, MicrophoneSource, ToneSource, WavFileSource};
pub use codec::{Codec, CodecFactory, InputSlot, OutputEvent, SoftwareCodecFactory};
pub use config::Config;
pub use encoder::{EncoderSession, InputStatus};
pub use error::{RecorderError, RecorderResult};
pub use media::{
    AudioParameters, AudioTimestamps, EncodedSample, MediaFormat, MediaParameters, Orientation,
    SampleFlags, TrackRole, VideoParameters, VideoTimestamps,
};
pub use muxer::{ContainerReader, FileContainerWriter, MuxerTrackRegistry, RecordedContainer};
pub use recorder::{Recorder, RecorderSettings, RecorderState, RecordingOutput, StopHandle, FRAME_QUEUE_DEPTH};
