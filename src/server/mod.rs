//! HTTP variant: upload a PDF, compress it server-side, download the result.
//!
//! Endpoints:
//! - GET  /health
//! - POST /upload              - multipart field `file`
//! - POST /compress            - JSON `{"fileId": "..."}`
//! - GET  /download/:file_id   - compressed PDF as an attachment

pub mod error;
pub mod routes;
pub mod storage;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{CompressionConfig, ServerConfig};
use crate::types::{CompressionStats, StrategyKind};

pub use error::AppError;
pub use storage::{FileKind, FileStore};

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// What the server remembers about one upload.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub original_name: String,
    pub result: Option<CompressionSummary>,
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionSummary {
    pub strategy: StrategyKind,
    pub stats: CompressionStats,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    compression: CompressionConfig,
    store: FileStore,
    uploads: RwLock<HashMap<Uuid, UploadRecord>>,
}

impl AppState {
    pub fn new(config: ServerConfig, compression: CompressionConfig) -> std::io::Result<Self> {
        let store = FileStore::new(&config.temp_dir)?;
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                compression,
                store,
                uploads: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn compression(&self) -> &CompressionConfig {
        &self.inner.compression
    }

    pub fn store(&self) -> &FileStore {
        &self.inner.store
    }

    pub async fn upload(&self, id: Uuid) -> Option<UploadRecord> {
        self.inner.uploads.read().await.get(&id).cloned()
    }

    pub async fn insert_upload(&self, id: Uuid, record: UploadRecord) {
        self.inner.uploads.write().await.insert(id, record);
    }

    pub async fn set_result(&self, id: Uuid, summary: CompressionSummary) {
        if let Some(record) = self.inner.uploads.write().await.get_mut(&id) {
            record.result = Some(summary);
        }
    }

    /// Drops expired files, then the records none of whose files remain.
    /// File modification time is the only clock, so a compressed file keeps
    /// its record alive after the original has gone.
    pub async fn cleanup(&self) -> usize {
        let removed = self
            .inner
            .store
            .cleanup_older_than(self.inner.config.retention)
            .await;

        let ids: Vec<Uuid> = self.inner.uploads.read().await.keys().copied().collect();
        let mut orphaned = Vec::new();
        for id in ids {
            if !self.inner.store.exists(id, FileKind::Original).await
                && !self.inner.store.exists(id, FileKind::Compressed).await
            {
                orphaned.push(id);
            }
        }
        if !orphaned.is_empty() {
            let mut uploads = self.inner.uploads.write().await;
            for id in &orphaned {
                uploads.remove(id);
            }
        }
        removed
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = (state.config().max_upload_bytes + MULTIPART_OVERHEAD) as usize;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/upload", post(routes::upload))
        .route("/compress", post(routes::compress))
        .route("/download/:file_id", get(routes::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Periodically sweeps the temp directory.
pub fn spawn_cleanup(state: AppState) -> JoinHandle<()> {
    let every = state.config().cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.cleanup().await;
            if removed > 0 {
                tracing::info!(removed, "Removed expired temp files");
            }
        }
    })
}
