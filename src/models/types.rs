use reqwest::Url;
use serde::{Deserialize, Serialize};

/// A downloadable model file in the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub url: String,
    pub expected_size: u64,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, expected_size: u64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            expected_size,
        }
    }

    /// Last path segment of the source URL, used as the on-disk filename.
    ///
    /// Falls back to the model id when the URL has no usable segment.
    pub fn filename(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_owned))
            })
            .or_else(|| {
                let path = self.url.split(['?', '#']).next().unwrap_or_default();
                path.rsplit('/').next().map(str::to_owned)
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Catalog row with the local state of the model file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelListing {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub expected_size: u64,
    pub local_size: u64,
    pub is_present: bool,
}

/// Snapshot published while a model downloads.
///
/// `total` is 0 when the server did not report a length.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DownloadProgress {
    pub name: String,
    pub percent: u8,
    pub written: u64,
    pub total: u64,
}
