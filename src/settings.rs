use crate::error::{Result, SubmagicError};
use crate::models::ModelCatalog;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Model used when nothing has been chosen yet.
pub const DEFAULT_MODEL: &str = "base";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_active_model")]
    pub active_model: String,
}

fn default_active_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_model: default_active_model(),
        }
    }
}

/// JSON settings document, always read and written as a whole.
pub struct SettingsStore {
    path: PathBuf,
    catalog: Arc<ModelCatalog>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            path: path.into(),
            catalog,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file yields the defaults.
    pub async fn load(&self) -> Result<Settings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(SubmagicError::SettingsUnreadable {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| SubmagicError::SettingsCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the document. Written beside it and renamed, so readers never see a
    /// half-written file.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let persist_failed = |source| SubmagicError::PersistFailed {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(settings)
            .map_err(|err| persist_failed(std::io::Error::new(ErrorKind::InvalidData, err)))?;

        let staged = self.staged_path();
        if let Err(err) = tokio::fs::write(&staged, json).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(persist_failed(err));
        }
        tokio::fs::rename(&staged, &self.path)
            .await
            .map_err(persist_failed)
    }

    fn staged_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Validate `model_id` against the catalog, then persist it.
    pub async fn set_active_model(&self, model_id: &str) -> Result<()> {
        self.catalog.resolve(model_id)?;

        let _writer = self.write_lock.lock().await;
        let mut settings = self.load().await?;
        settings.active_model = model_id.to_string();
        self.save(&settings).await?;

        info!(model = model_id, "active model set");
        Ok(())
    }

    /// Currently selected model. Never fails: unreadable settings fall back to the default.
    pub async fn get_active_model(&self) -> String {
        match self.load().await {
            Ok(settings) => settings.active_model,
            Err(err) => {
                warn!(error = %err, "using default model");
                DEFAULT_MODEL.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> SettingsStore {
        SettingsStore::new(dir.join("settings.json"), Arc::new(ModelCatalog::whisper()))
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.load().await.unwrap(), Settings::default());
        assert_eq!(store.get_active_model().await, "base");
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.set_active_model("small.en").await.unwrap();

        assert_eq!(store.get_active_model().await, "small.en");
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "{\n  \"activeModel\": \"small.en\"\n}");
    }

    #[tokio::test]
    async fn unknown_model_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.set_active_model("tiny").await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let err = store.set_active_model("nonexistent").await.unwrap_err();
        assert!(matches!(err, SubmagicError::UnknownModel(_)));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_model_does_not_create_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.set_active_model("nonexistent").await.is_err());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_document_fails_load_but_not_getter() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            SubmagicError::SettingsCorrupt { .. }
        ));
        assert_eq!(store.get_active_model().await, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn missing_field_defaults_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.path(), "{}").unwrap();
        assert_eq!(store.load().await.unwrap().active_model, "base");
    }

    #[tokio::test]
    async fn concurrent_writers_leave_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path()));

        let writers: Vec<_> = ["tiny", "base", "small", "medium"]
            .into_iter()
            .map(|id| {
                let store = store.clone();
                tokio::spawn(async move { store.set_active_model(id).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let active = store.load().await.unwrap().active_model;
        assert!(["tiny", "base", "small", "medium"].contains(&active.as_str()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_never_see_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path()));
        store.set_active_model("tiny").await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 0..200 {
                    let id = if round % 2 == 0 { "small" } else { "medium" };
                    store.set_active_model(id).await.unwrap();
                }
            })
        };
        while !writer.is_finished() {
            let active = store.load().await.unwrap().active_model;
            assert!(["tiny", "small", "medium"].contains(&active.as_str()), "{active}");
        }
        writer.await.unwrap();

        assert_eq!(store.get_active_model().await, "medium");
        assert!(!store.staged_path().exists());
    }
}
