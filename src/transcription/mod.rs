mod process;
pub mod whisper;

pub use whisper::{TranscriptionRequest, WhisperCli, DEFAULT_LANGUAGE};
