use super::types::{ModelDescriptor, ModelListing};
use crate::error::{Result, SubmagicError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const MIB: u64 = 1024 * 1024;

const WHISPER_CPP: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

// (id, url, size in MiB)
const WHISPER_MODELS: &[(&str, &str, u64)] = &[
    ("tiny", "ggml-tiny.bin", 75),
    ("tiny.en", "ggml-tiny.en.bin", 75),
    ("base", "ggml-base.bin", 142),
    ("base.en", "ggml-base.en.bin", 142),
    ("small", "ggml-small.bin", 466),
    ("small.en", "ggml-small.en.bin", 466),
    ("medium", "ggml-medium.bin", 1531),
    ("medium.en", "ggml-medium.en.bin", 1531),
    ("large-v1", "ggml-large-v1.bin", 2900),
    ("large-v2", "ggml-large-v2.bin", 2900),
    ("large-v3", "ggml-large-v3.bin", 2902),
];

const DISTIL_MODELS: &[(&str, &str, u64)] = &[
    (
        "distil-medium.en",
        "https://huggingface.co/distil-whisper/distil-medium.en/resolve/main/ggml-distil-medium.en.bin",
        418,
    ),
    (
        "distil-large-v2",
        "https://huggingface.co/distil-whisper/distil-large-v2/resolve/main/ggml-distil-large-v2.bin",
        1100,
    ),
];

/// Fixed registry of downloadable models.
///
/// The table is handed in at construction and never changes afterwards.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(SubmagicError::DuplicateModel(model.id.clone()));
            }
        }
        Ok(Self { models })
    }

    /// The whisper.cpp GGML models published on Hugging Face.
    pub fn whisper() -> Self {
        let ggml = WHISPER_MODELS
            .iter()
            .map(|(id, file, mib)| ModelDescriptor::new(*id, format!("{WHISPER_CPP}/{file}"), mib * MIB));
        let distil = DISTIL_MODELS
            .iter()
            .map(|(id, url, mib)| ModelDescriptor::new(*id, *url, mib * MIB));

        Self {
            models: ggml.chain(distil).collect(),
        }
    }

    pub fn resolve(&self, id: &str) -> Result<&ModelDescriptor> {
        self.models
            .iter()
            .find(|model| model.id == id)
            .ok_or_else(|| SubmagicError::UnknownModel(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.iter().any(|model| model.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Where a model lives once downloaded.
    pub fn local_path(model: &ModelDescriptor, models_dir: &Path) -> PathBuf {
        models_dir.join(model.filename())
    }

    /// Every model with its on-disk state, smallest first.
    ///
    /// Equal sizes are ordered by id. The filesystem is checked on each call.
    pub fn list(&self, models_dir: &Path) -> Vec<ModelListing> {
        let mut models: Vec<&ModelDescriptor> = self.models.iter().collect();
        models.sort_by(|a, b| {
            a.expected_size
                .cmp(&b.expected_size)
                .then_with(|| a.id.cmp(&b.id))
        });

        models
            .into_iter()
            .map(|model| {
                let metadata = std::fs::metadata(Self::local_path(model, models_dir))
                    .ok()
                    .filter(|meta| meta.is_file());
                ModelListing {
                    id: model.id.clone(),
                    url: model.url.clone(),
                    filename: model.filename(),
                    expected_size: model.expected_size,
                    local_size: metadata.as_ref().map_or(0, |meta| meta.len()),
                    is_present: metadata.is_some(),
                }
            })
            .collect()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::whisper()
    }
}
