#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use logsearch::config::{self, Config};
use logsearch::event::Event;
use logsearch::handlers::AppState;
use logsearch::query::SearchQuery;
use logsearch::server::create_router;
use logsearch::storage::{EventStore, ResultSink, StoreError, SweepStats};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const INGEST_TOKEN: &str = "ingest-token-0001";
pub const QUERY_TOKEN: &str = "query-token-0002";

/// Store stub recording every call it receives
#[derive(Default)]
pub struct RecordingStore {
    pub inserted: Mutex<Vec<Event>>,
    pub searches: Mutex<Vec<SearchQuery>>,
    pub fail_insert: bool,
    /// Delay applied before every insert
    pub insert_delay: Option<Duration>,
    /// Chunks written by `search` before it returns
    pub search_chunks: Vec<&'static str>,
    /// When set, `search` fails with this message after writing its chunks
    pub search_error: Option<&'static str>,
    /// Delay applied before `search` writes anything
    pub search_delay: Option<Duration>,
    /// Searches that ran to the end
    pub searches_completed: AtomicUsize,
}

impl RecordingStore {
    pub fn insert_count(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    pub fn completed_search_count(&self) -> usize {
        self.searches_completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for RecordingStore {
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_indices(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_insert {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inserted.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, sink: &mut ResultSink) -> Result<(), StoreError> {
        self.searches.lock().unwrap().push(query.clone());
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        for chunk in &self.search_chunks {
            sink.write(*chunk).await?;
        }
        self.searches_completed.fetch_add(1, Ordering::SeqCst);
        match self.search_error {
            Some(message) => Err(StoreError::Backend(message.to_string())),
            None => Ok(()),
        }
    }

    async fn sweep_retention(&self, _capacity_gb: u64) -> Result<SweepStats, StoreError> {
        Ok(SweepStats::default())
    }

    async fn maintain_partitions(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        (config::DB_CONN_STR_ENV, "sqlite::memory:"),
        (config::AUDIT_AUTH_TOKEN_ENV, INGEST_TOKEN),
        (config::QUERY_AUTH_TOKEN_ENV, QUERY_TOKEN),
        (config::DISK_CAPACITY_ENV, "0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    config::load_config_from(vars).unwrap()
}

pub fn test_router(config: Config, store: Arc<dyn EventStore>) -> Router {
    create_router(AppState::new(Arc::new(config), store))
}

pub async fn send(router: Router, method: &str, uri: &str, body: impl Into<Body>) -> Response {
    router
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn audit_event(api_name: &str, time: &str) -> String {
    serde_json::json!({
        "version": "1",
        "deploymentid": "6faeded5-5cf3-4133-8a37-07c5d500207c",
        "time": time,
        "api": {
            "name": api_name,
            "bucket": "photos",
            "object": "2024/cat.png",
            "status": "OK",
            "statusCode": 200,
            "rx": 512,
            "tx": 2048,
            "timeToResponse": "1234567ns"
        },
        "remotehost": "10.0.0.7",
        "requestID": "17C0B2A7E3F1D2A0",
        "userAgent": "MinIO (linux; amd64) minio-go/v7.0.0"
    })
    .to_string()
}

/// Collects formatted log output from the current thread
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's `tracing` output into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
