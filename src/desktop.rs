//! Tauri plugin exposing the backend to the webview.
//!
//! Register with `tauri::Builder::default().plugin(submagic::desktop::init())`; the
//! frontend calls `plugin:submagic|download_model` etc. and listens for
//! `modelDownloadProgress` events.

use crate::config::AppConfig;
use crate::error::SubmagicError;
use crate::models::{DownloadProgress, ModelListing, ProgressSink};
use crate::service::Submagic;
use crate::transcription::TranscriptionRequest;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

/// Forwards progress to every window through the app event bus.
pub struct WindowEvents<R: Runtime>(AppHandle<R>);

impl<R: Runtime> ProgressSink for WindowEvents<R> {
    fn publish(&self, event: &str, progress: &DownloadProgress) -> anyhow::Result<()> {
        self.0.emit(event, progress)?;
        Ok(())
    }
}

#[tauri::command]
fn list_models(state: State<'_, Submagic>) -> Vec<ModelListing> {
    state.list_models()
}

#[tauri::command]
async fn download_model(state: State<'_, Submagic>, name: String) -> Result<PathBuf, SubmagicError> {
    state.download_model(&name).await
}

#[tauri::command]
fn cancel_download(state: State<'_, Submagic>, name: String) -> bool {
    state.cancel_download(&name)
}

#[tauri::command]
async fn delete_model(state: State<'_, Submagic>, name: String) -> Result<bool, SubmagicError> {
    state.delete_model(&name).await
}

#[tauri::command]
async fn set_active_model(state: State<'_, Submagic>, name: String) -> Result<(), SubmagicError> {
    state.set_active_model(&name).await
}

#[tauri::command]
async fn get_active_model(state: State<'_, Submagic>) -> Result<String, SubmagicError> {
    Ok(state.get_active_model().await)
}

#[tauri::command]
async fn generate_subtitles(
    state: State<'_, Submagic>,
    request: TranscriptionRequest,
) -> Result<String, SubmagicError> {
    state.generate_subtitles(&request).await
}

#[tauri::command]
async fn generate_subtitles_range(
    state: State<'_, Submagic>,
    request: TranscriptionRequest,
    start_sec: f64,
    end_sec: f64,
) -> Result<String, SubmagicError> {
    state
        .generate_subtitles_range(&request, start_sec, end_sec)
        .await
}

#[tauri::command]
fn cancel_transcription(state: State<'_, Submagic>, file_path: PathBuf) -> bool {
    state.cancel_transcription(&file_path)
}

#[tauri::command]
async fn save_subtitles(
    state: State<'_, Submagic>,
    path: PathBuf,
    content: String,
) -> Result<(), SubmagicError> {
    state.save_subtitles(&path, &content).await
}

pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("submagic")
        .invoke_handler(tauri::generate_handler![
            list_models,
            download_model,
            cancel_download,
            delete_model,
            set_active_model,
            get_active_model,
            generate_subtitles,
            generate_subtitles_range,
            cancel_transcription,
            save_subtitles
        ])
        .setup(|app, _api| {
            let sink = Arc::new(WindowEvents(app.clone()));
            let service = Submagic::new(AppConfig::from_env(), sink)?;
            app.manage(service);
            Ok(())
        })
        .build()
}
