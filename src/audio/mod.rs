pub mod capture;
pub mod file;
pub mod microphone;
pub mod source;

pub use capture::{AudioCaptureReport, AudioCaptureThread, AUDIO_JOIN_TIMEOUT};
pub use file::WavFileSource;
pub use microphone::CpalMicrophone;
pub use source::{AudioSource, MicrophoneFactory, MicrophoneSource, ToneSource};
