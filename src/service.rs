use crate::config::AppConfig;
use crate::error::{Result, SubmagicError};
use crate::models::{ModelCatalog, ModelDownloader, ModelListing, ProgressSink};
use crate::settings::SettingsStore;
use crate::transcription::{TranscriptionRequest, WhisperCli};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Operations exposed to the UI layer.
///
/// Long-running operations register a cancellation token so that a later
/// `cancel_*` call can abort them.
pub struct Submagic {
    config: AppConfig,
    catalog: Arc<ModelCatalog>,
    downloader: ModelDownloader,
    settings: SettingsStore,
    whisper: WhisperCli,
    downloads: CancelRegistry<String>,
    transcriptions: CancelRegistry<PathBuf>,
}

impl Submagic {
    pub fn new(config: AppConfig, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        Self::with_catalog(config, ModelCatalog::whisper(), sink)
    }

    pub fn with_catalog(
        config: AppConfig,
        catalog: ModelCatalog,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.models_dir).map_err(|source| {
            SubmagicError::DestinationUnwritable {
                path: config.models_dir.clone(),
                source,
            }
        })?;
        info!(models_dir = %config.models_dir.display(), "backend ready");

        let catalog = Arc::new(catalog);
        let downloader = ModelDownloader::new(catalog.clone(), &config.models_dir, sink)?;
        let settings = SettingsStore::new(&config.settings_path, catalog.clone());
        let whisper = WhisperCli::new(
            &config.whisper_cli,
            &config.ffmpeg,
            catalog.clone(),
            &config.models_dir,
        );

        Ok(Self {
            config,
            catalog,
            downloader,
            settings,
            whisper,
            downloads: CancelRegistry::new(),
            transcriptions: CancelRegistry::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn list_models(&self) -> Vec<ModelListing> {
        self.catalog.list(&self.config.models_dir)
    }

    pub async fn download_model(&self, model_id: &str) -> Result<PathBuf> {
        let ticket = self.downloads.register(model_id.to_string());
        self.downloader.download(model_id, &ticket.token).await
    }

    /// Abort a running download. Returns `false` if none was running for `model_id`.
    pub fn cancel_download(&self, model_id: &str) -> bool {
        self.downloads.cancel(model_id)
    }

    pub async fn delete_model(&self, model_id: &str) -> Result<bool> {
        self.downloader.delete(model_id).await
    }

    pub async fn set_active_model(&self, model_id: &str) -> Result<()> {
        self.settings.set_active_model(model_id).await
    }

    pub async fn get_active_model(&self) -> String {
        self.settings.get_active_model().await
    }

    pub async fn generate_subtitles(&self, request: &TranscriptionRequest) -> Result<String> {
        let ticket = self.transcriptions.register(request.file_path.clone());
        self.whisper.transcribe(request, &ticket.token).await
    }

    pub async fn generate_subtitles_range(
        &self,
        request: &TranscriptionRequest,
        start_sec: f64,
        end_sec: f64,
    ) -> Result<String> {
        let ticket = self.transcriptions.register(request.file_path.clone());
        self.whisper
            .transcribe_range(request, start_sec, end_sec, &ticket.token)
            .await
    }

    /// Abort the transcription running for `file_path`, if any.
    pub fn cancel_transcription(&self, file_path: &Path) -> bool {
        self.transcriptions.cancel(file_path)
    }

    pub async fn save_subtitles(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|source| SubmagicError::PersistFailed {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), "subtitles saved");
        Ok(())
    }
}

/// Cancellation tokens for running operations, keyed by model id or media path.
///
/// Concurrent requests for one key share a token and the entry lives until the
/// last of them finishes, so `cancel` reaches every request still running.
struct CancelRegistry<K> {
    entries: Mutex<HashMap<K, Registration>>,
}

struct Registration {
    token: CancellationToken,
    users: usize,
}

impl<K: Hash + Eq + Clone> CancelRegistry<K> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, key: K) -> Ticket<'_, K> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let registration = entries.entry(key.clone()).or_insert_with(|| Registration {
            token: CancellationToken::new(),
            users: 0,
        });
        registration.users += 1;
        Ticket {
            token: registration.token.clone(),
            registry: self,
            key,
        }
    }

    /// Cancel every request registered under `key`. Requests arriving afterwards get a
    /// fresh token.
    fn cancel<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(key) {
            Some(registration) => {
                let cancelled = std::mem::take(&mut registration.token);
                cancelled.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registration) = entries.get_mut(key) {
            registration.users -= 1;
            if registration.users == 0 {
                entries.remove(key);
            }
        }
    }
}

/// One request's hold on a registry entry, released on drop.
struct Ticket<'a, K: Hash + Eq + Clone> {
    token: CancellationToken,
    registry: &'a CancelRegistry<K>,
    key: K,
}

impl<K: Hash + Eq + Clone> Drop for Ticket<'_, K> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
