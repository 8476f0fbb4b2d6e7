#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use submagic::{DownloadProgress, ProgressSink};

/// Local stand-in for the model host.
///
/// Routes:
/// - `/x-file`: 1000 bytes in one response
/// - `/slow-file`: 1000 bytes in ten delayed chunks
/// - `/broken-file`: announces 1000 bytes, sends 500, then drops the connection
/// - `/flaky-file`: 500 on the first request to the host, then behaves like `/slow-file`
/// - anything else: 404
pub struct ModelHost {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl ModelHost {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/x-file", get(whole_file))
            .route("/slow-file", get(slow_file))
            .route("/broken-file", get(broken_file))
            .route("/flaky-file", get(flaky_file))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path)
    }

    /// Requests served by the file routes so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn whole_file(State(hits): State<Arc<AtomicUsize>>) -> Vec<u8> {
    hits.fetch_add(1, Ordering::SeqCst);
    vec![42u8; 1000]
}

async fn slow_file(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    slow_body()
}

async fn flaky_file(State(hits): State<Arc<AtomicUsize>>) -> axum::response::Response {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    slow_body().into_response()
}

fn slow_body() -> impl IntoResponse {
    let chunks = futures_util::stream::iter(0..10).then(|_| async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 100]))
    });
    ([(header::CONTENT_LENGTH, "1000")], Body::from_stream(chunks))
}

async fn broken_file(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let chunks = futures_util::stream::iter(0..2).then(|i| async move {
        if i == 0 {
            Ok(Bytes::from(vec![1u8; 500]))
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "host went away",
            ))
        }
    });
    ([(header::CONTENT_LENGTH, "1000")], Body::from_stream(chunks))
}

/// Sink that keeps every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DownloadProgress>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DownloadProgress> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, event: &str, progress: &DownloadProgress) -> anyhow::Result<()> {
        assert_eq!(event, submagic::PROGRESS_EVENT);
        self.events.lock().unwrap().push(progress.clone());
        Ok(())
    }
}
