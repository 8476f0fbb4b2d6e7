pub mod downloader;
pub mod registry;
pub mod tracker;
pub mod types;

pub use downloader::ModelDownloader;
pub use registry::ModelCatalog;
pub use tracker::{DownloadTracker, NullSink, ProgressSink, PROGRESS_EVENT};
pub use types::{DownloadProgress, ModelDescriptor, ModelListing};
