use super::process::{remove_if_exists, run_tool, with_suffix};
use crate::error::{Result, SubmagicError};
use crate::models::ModelCatalog;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Language passed to whisper-cli when the caller leaves it empty.
pub const DEFAULT_LANGUAGE: &str = "ru";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRequest {
    pub file_path: PathBuf,
    #[serde(default)]
    pub lang: String,
    pub model_id: String,
}

impl TranscriptionRequest {
    pub fn new(
        file_path: impl Into<PathBuf>,
        lang: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            lang: lang.into(),
            model_id: model_id.into(),
        }
    }

    pub fn language(&self) -> &str {
        if self.lang.trim().is_empty() {
            DEFAULT_LANGUAGE
        } else {
            self.lang.trim()
        }
    }
}

/// Runs whisper.cpp's command line tool and reads back the SubRip output.
pub struct WhisperCli {
    program: PathBuf,
    ffmpeg: PathBuf,
    catalog: Arc<ModelCatalog>,
    models_dir: PathBuf,
}

impl WhisperCli {
    pub fn new(
        program: impl Into<PathBuf>,
        ffmpeg: impl Into<PathBuf>,
        catalog: Arc<ModelCatalog>,
        models_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            ffmpeg: ffmpeg.into(),
            catalog,
            models_dir: models_dir.into(),
        }
    }

    /// Subtitle text for the whole media file.
    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let model_path = self.model_path(&request.model_id).await?;
        info!(
            file = %request.file_path.display(),
            lang = request.language(),
            model = %request.model_id,
            "generating subtitles"
        );

        let srt = self
            .run(&model_path, &request.file_path, request.language(), cancel)
            .await?;

        info!(file = %request.file_path.display(), "subtitles generated");
        Ok(srt)
    }

    /// Subtitle text for `[start_sec, end_sec]` of the media file.
    ///
    /// The range is cut to a 16 kHz mono WAV next to the input with ffmpeg; the chunk and
    /// its outputs are removed afterwards. Timestamps are relative to the chunk.
    pub async fn transcribe_range(
        &self,
        request: &TranscriptionRequest,
        start_sec: f64,
        end_sec: f64,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !(start_sec >= 0.0 && start_sec < end_sec) {
            return Err(SubmagicError::InvalidRange {
                start: start_sec,
                end: end_sec,
            });
        }
        let model_path = self.model_path(&request.model_id).await?;

        let chunk = with_suffix(
            &request.file_path,
            &format!("_chunk_{start_sec}_{end_sec}.wav"),
        );
        info!(
            file = %request.file_path.display(),
            start = start_sec,
            end = end_sec,
            model = %request.model_id,
            "generating subtitles for range"
        );

        let result = async {
            self.extract(&request.file_path, start_sec, end_sec, &chunk, cancel)
                .await?;
            self.run(&model_path, &chunk, request.language(), cancel)
                .await
        }
        .await;

        for leftover in [chunk.clone(), with_suffix(&chunk, ".srt"), with_suffix(&chunk, ".txt")] {
            remove_if_exists(&leftover).await;
        }
        result
    }

    async fn model_path(&self, model_id: &str) -> Result<PathBuf> {
        let model = self.catalog.resolve(model_id)?;
        let path = ModelCatalog::local_path(model, &self.models_dir);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(SubmagicError::ModelNotDownloaded {
                id: model_id.to_string(),
            }),
        }
    }

    async fn run(
        &self,
        model_path: &Path,
        input: &Path,
        lang: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let srt_path = with_suffix(input, ".srt");
        remove_if_exists(&srt_path).await;

        let args: Vec<OsString> = vec![
            "-m".into(),
            model_path.into(),
            "-f".into(),
            input.into(),
            "-otxt".into(),
            "-osrt".into(),
            "-l".into(),
            lang.into(),
        ];

        if let Err(err) = run_tool(&self.program, &args, cancel, SubmagicError::TranscriptionFailed).await {
            if matches!(err, SubmagicError::Cancelled) {
                remove_if_exists(&srt_path).await;
                remove_if_exists(&with_suffix(input, ".txt")).await;
            }
            return Err(err);
        }

        match tokio::fs::read_to_string(&srt_path).await {
            Ok(srt) => Ok(srt),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SubmagicError::OutputMissing(srt_path))
            }
            Err(err) => Err(SubmagicError::TranscriptionFailed(format!(
                "cannot read {}: {err}",
                srt_path.display()
            ))),
        }
    }

    async fn extract(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        chunk: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args: Vec<OsString> = vec![
            "-i".into(),
            input.into(),
            "-ss".into(),
            start_sec.to_string().into(),
            "-to".into(),
            end_sec.to_string().into(),
            "-vn".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            "16000".into(),
            "-ac".into(),
            "1".into(),
            chunk.into(),
            "-y".into(),
        ];
        run_tool(&self.ffmpeg, &args, cancel, SubmagicError::ExtractionFailed).await?;
        Ok(())
    }
}
