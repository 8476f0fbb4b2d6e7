//! Backend for a whisper.cpp subtitle generator.
//!
//! Catalogs the downloadable GGML models, downloads them with throttled progress
//! events, persists the active model and drives `whisper-cli` to produce SubRip text.

pub mod config;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod models;
pub mod service;
pub mod settings;
pub mod transcription;

pub use config::AppConfig;
pub use error::{Result, SubmagicError};
pub use models::{
    DownloadProgress, ModelCatalog, ModelDescriptor, ModelDownloader, ModelListing, NullSink,
    ProgressSink, PROGRESS_EVENT,
};
pub use service::Submagic;
pub use settings::{Settings, SettingsStore, DEFAULT_MODEL};
pub use transcription::{TranscriptionRequest, WhisperCli, DEFAULT_LANGUAGE};
