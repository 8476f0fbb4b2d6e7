use directories::ProjectDirs;
use std::path::PathBuf;

pub const MODELS_DIR_ENV: &str = "SUBMAGIC_MODELS_DIR";
pub const SETTINGS_ENV: &str = "SUBMAGIC_SETTINGS";
pub const WHISPER_CLI_ENV: &str = "SUBMAGIC_WHISPER_CLI";
pub const FFMPEG_ENV: &str = "SUBMAGIC_FFMPEG";

/// Filesystem locations and external tools used by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub models_dir: PathBuf,
    pub settings_path: PathBuf,
    pub whisper_cli: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            settings_path: PathBuf::from("settings.json"),
            whisper_cli: PathBuf::from("./whisper-cli"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `SUBMAGIC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty()).map(PathBuf::from);

        if let Some(dir) = non_empty(MODELS_DIR_ENV) {
            config.models_dir = dir;
        }
        if let Some(path) = non_empty(SETTINGS_ENV) {
            config.settings_path = path;
        }
        if let Some(path) = non_empty(WHISPER_CLI_ENV) {
            config.whisper_cli = path;
        }
        if let Some(path) = non_empty(FFMPEG_ENV) {
            config.ffmpeg = path;
        }
        config
    }
}

/// Per-user data directory, or `./models` when the platform has none.
pub fn default_models_dir() -> PathBuf {
    ProjectDirs::from("com", "submagic", "Submagic")
        .map(|dirs| dirs.data_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}
