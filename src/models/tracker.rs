use super::types::DownloadProgress;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Event name the UI listens on for download progress.
pub const PROGRESS_EVENT: &str = "modelDownloadProgress";

const EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for progress events, usually the window event bus.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &str, progress: &DownloadProgress) -> anyhow::Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&str, &DownloadProgress) -> anyhow::Result<()> + Send + Sync,
{
    fn publish(&self, event: &str, progress: &DownloadProgress) -> anyhow::Result<()> {
        self(event, progress)
    }
}

/// Sink that drops every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _event: &str, _progress: &DownloadProgress) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Counts bytes as they are copied and publishes throttled progress.
pub struct DownloadTracker<'a> {
    model_id: String,
    total: u64,
    written: u64,
    last_emit: Option<Instant>,
    sink: &'a dyn ProgressSink,
}

impl<'a> DownloadTracker<'a> {
    pub fn new(model_id: impl Into<String>, total: u64, sink: &'a dyn ProgressSink) -> Self {
        Self {
            model_id: model_id.into(),
            total,
            written: 0,
            last_emit: None,
            sink,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Record `len` more bytes; publishes if the last event is at least 100ms old.
    pub fn observe(&mut self, len: usize) {
        self.written += len as u64;

        let now = Instant::now();
        let due = self
            .last_emit
            .map_or(true, |last| now.duration_since(last) >= EMIT_INTERVAL);
        if !due {
            return;
        }
        self.last_emit = Some(now);

        debug!(
            model = %self.model_id,
            written = self.written,
            total = self.total,
            "download progress"
        );
        self.publish(self.in_flight_percent(), self.written, self.total);
    }

    /// Publish the closing 100% event and return the byte count.
    pub fn finish(self) -> u64 {
        self.publish(100, self.written, self.written);
        self.written
    }

    // Only the closing event reports 100; an unknown total reports 0.
    fn in_flight_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = self.written.saturating_mul(100) / self.total;
        percent.min(99) as u8
    }

    fn publish(&self, percent: u8, written: u64, total: u64) {
        let progress = DownloadProgress {
            name: self.model_id.clone(),
            percent,
            written,
            total,
        };
        if let Err(err) = self.sink.publish(PROGRESS_EVENT, &progress) {
            debug!(model = %self.model_id, error = %err, "progress sink rejected event");
        }
    }
}
