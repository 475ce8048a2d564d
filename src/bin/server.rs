//! pdf-shrink HTTP server
//!
//! Accepts PDF uploads, compresses them with the strategy chain and serves
//! the result for download. Temporary files are swept periodically.

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_shrink::engine::ImageRecompression;
use pdf_shrink::server::{self, AppState};
use pdf_shrink::{CompressionConfig, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_shrink=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();
    let compression = CompressionConfig::default()
        .with_image_recompression(ImageRecompression::default())
        .apply_env();

    tracing::info!("Starting pdf-shrink server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Temp directory: {}", config.temp_dir.display());
    tracing::info!(
        "Upload limit: {} MB, retention: {} min",
        config.max_upload_bytes / (1024 * 1024),
        config.retention.as_secs() / 60
    );

    let state = AppState::new(config.clone(), compression)
        .with_context(|| format!("Failed to create {}", config.temp_dir.display()))?;

    let removed = state.cleanup().await;
    if removed > 0 {
        tracing::info!("Removed {} stale temp files", removed);
    }
    let cleanup = server::spawn_cleanup(state.clone());

    let app = server::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("pdf-shrink server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cleanup.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
