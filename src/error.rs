use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = SubmagicError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SubmagicError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model registered twice: {0}")]
    DuplicateModel(String),

    #[error("cannot write to {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialise HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("download of {id} interrupted: {reason}")]
    CopyFailed { id: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to remove {}: {source}", path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read settings at {}: {source}", path.display())]
    SettingsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings at {} are malformed: {source}", path.display())]
    SettingsCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model {id} is not downloaded yet, download it in the settings first")]
    ModelNotDownloaded { id: String },

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("audio extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("invalid time range: start {start}s must be before end {end}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("transcriber reported success but {} was not produced", .0.display())]
    OutputMissing(PathBuf),
}

// Commands hand errors to the webview as plain strings.
impl Serialize for SubmagicError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
