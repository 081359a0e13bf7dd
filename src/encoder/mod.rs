mod session;

pub use session::{EncoderSession, InputStatus, INPUT_TIMEOUT};
