use super::registry::ModelCatalog;
use super::tracker::{DownloadTracker, ProgressSink};
use crate::error::{Result, SubmagicError};
use futures_util::StreamExt;
use reqwest::{redirect, Client, Response};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_REDIRECTS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ModelDownloader {
    client: Client,
    catalog: Arc<ModelCatalog>,
    models_dir: PathBuf,
    sink: Arc<dyn ProgressSink>,
    // One guard per model id, shared by downloads and deletes of that id.
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ModelDownloader {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        models_dir: impl Into<PathBuf>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(SubmagicError::HttpClient)?;

        Ok(Self {
            client,
            catalog,
            models_dir: models_dir.into(),
            sink,
            guards: Mutex::new(HashMap::new()),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Make sure the model file is on disk and return its path.
    ///
    /// Returns immediately when the file already exists. A second call for an id
    /// that is still downloading waits for the first one and then reuses its file.
    /// Bytes go to `<file>.part` and are renamed into place only once complete.
    pub async fn download(&self, model_id: &str, cancel: &CancellationToken) -> Result<PathBuf> {
        let model = self.catalog.resolve(model_id)?;
        let model_path = ModelCatalog::local_path(model, &self.models_dir);

        let guard = self.guard(model_id);
        let _held = guard.lock().await;

        if is_file(&model_path).await {
            info!(model = model_id, path = %model_path.display(), "model already present");
            return Ok(model_path);
        }

        info!(model = model_id, url = %model.url, "downloading model");

        tokio::fs::create_dir_all(&self.models_dir)
            .await
            .map_err(|source| SubmagicError::DestinationUnwritable {
                path: self.models_dir.clone(),
                source,
            })?;

        let staging = Staging::new(&model_path);
        let mut file = File::create(&staging.path).await.map_err(|source| {
            SubmagicError::DestinationUnwritable {
                path: staging.path.clone(),
                source,
            }
        })?;

        let response = match self.fetch(&model.url, cancel).await {
            Ok(response) => response,
            Err(err) => {
                drop(file);
                staging.discard().await;
                return Err(err);
            }
        };
        let total = response.content_length().unwrap_or(0);

        let mut tracker = DownloadTracker::new(model_id, total, self.sink.as_ref());
        let copied = copy_body(model_id, response, &mut file, &mut tracker, cancel).await;
        drop(file);
        if let Err(err) = copied {
            warn!(model = model_id, error = %err, "download aborted, discarding partial file");
            staging.discard().await;
            return Err(err);
        }

        staging.commit(&model_path).await?;
        let written = tracker.finish();

        info!(model = model_id, bytes = written, path = %model_path.display(), "model downloaded");
        Ok(model_path)
    }

    /// Remove a downloaded model. Returns `false` when there was nothing to remove.
    pub async fn delete(&self, model_id: &str) -> Result<bool> {
        let model = self.catalog.resolve(model_id)?;
        let model_path = ModelCatalog::local_path(model, &self.models_dir);

        let guard = self.guard(model_id);
        let _held = guard.lock().await;

        match tokio::fs::remove_file(&model_path).await {
            Ok(()) => {
                info!(model = model_id, path = %model_path.display(), "model deleted");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(model = model_id, "model not on disk, nothing to delete");
                Ok(false)
            }
            Err(source) => Err(SubmagicError::RemoveFailed {
                path: model_path,
                source,
            }),
        }
    }

    fn guard(&self, model_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        guards.entry(model_id.to_string()).or_default().clone()
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Response> {
        let failed = |reason: String| SubmagicError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmagicError::Cancelled),
            response = self.client.get(url).send() => response.map_err(|e| failed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {status}")));
        }
        Ok(response)
    }
}

async fn copy_body(
    model_id: &str,
    response: Response,
    file: &mut File,
    tracker: &mut DownloadTracker<'_>,
    cancel: &CancellationToken,
) -> Result<()> {
    let failed = |reason: String| SubmagicError::CopyFailed {
        id: model_id.to_string(),
        reason,
    };

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmagicError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| failed(e.to_string()))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| failed(e.to_string()))?;
        tracker.observe(chunk.len());
    }

    file.flush().await.map_err(|e| failed(e.to_string()))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Partially written download. Error paths call `discard`; drop removes whatever an
/// aborted task left behind.
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    fn new(model_path: &Path) -> Self {
        let mut name = model_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        Self {
            path: model_path.with_file_name(name),
            committed: false,
        }
    }

    async fn commit(mut self, model_path: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, model_path)
            .await
            .map_err(|source| SubmagicError::DestinationUnwritable {
                path: model_path.to_path_buf(),
                source,
            })?;
        self.committed = true;
        Ok(())
    }

    async fn discard(mut self) {
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove partial download");
            }
        }
        self.committed = true;
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Only reached when the download future is dropped mid-transfer; a single
        // unlink is short enough to do inline.
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove partial download");
            }
        }
    }
}
