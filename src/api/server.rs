use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{Router, routing::any, routing::get};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tracing::{error, info, warn};

use super::{
    services::{health, serve_job},
    state::AppState,
};
use crate::config::{Config, StorageConfig, StorageProvider};
use crate::handlers::HandlerRegistry;
use crate::handlers::archive::{self, ArchiveJob};
use crate::http::{HttpConfig, build_client};
use crate::storage::{Credentials, ObjectBackend, ObjectStoreBackend};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(config_path: &Path) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let http = build_client(&HttpConfig::from(config.http.clone()))?;
    let backend = build_backend(&config.storage);
    let registry = build_registry(&config, backend, &http);
    if registry.is_empty() {
        warn!("No job handler could be registered, every job will be rejected");
    } else {
        info!(ops = ?registry.ops().collect::<Vec<_>>(), "Job handlers ready");
    }

    let address = config.server.bind_addr();
    let app = router(AppState::new(config, registry, http));

    let listener = TcpListener::bind(&address).await?;
    info!(%address, "fopbox listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let read_timeout = Duration::from_secs(state.config.server.read_timeout_secs);
    let max_form_bytes = usize::try_from(state.config.server.max_form_bytes.as_u64())
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/handler", any(serve_job))
        .route("/health", get(health))
        .with_state(state)
        // Bounds form extraction only; raw bodies are streamed to handlers
        .layer(DefaultBodyLimit::max(max_form_bytes))
        // Transparently inflate gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(RequestBodyTimeoutLayer::new(read_timeout))
}

pub fn build_backend(storage: &StorageConfig) -> Arc<dyn ObjectBackend> {
    let credentials = Credentials::new(&storage.access_key, &storage.secret_key);
    match storage.provider {
        StorageProvider::Memory => {
            info!("Using in-memory object storage");
            Arc::new(ObjectStoreBackend::in_memory(credentials))
        }
        StorageProvider::Local => {
            info!(root = %storage.root.display(), "Using local object storage");
            Arc::new(ObjectStoreBackend::local(&storage.root, credentials))
        }
    }
}

/// Register every configured operation. A handler whose own configuration
/// fails to load is left out; the others still serve.
pub fn build_registry(
    config: &Config,
    backend: Arc<dyn ObjectBackend>,
    http: &reqwest::Client,
) -> HandlerRegistry {
    let prefix = config.server.op_prefix.as_str();
    let mut registry = HandlerRegistry::new();

    for (name, handler) in &config.handlers {
        let registered = match name.as_str() {
            archive::OP_NAME => registry.register(
                prefix,
                &handler.config,
                ArchiveJob::new(backend.clone(), http.clone())
                    .with_spool_dir(config.server.spool_dir()),
            ),
            other => {
                warn!(handler = other, "Unknown handler in configuration, skipped");
                continue;
            }
        };

        if let Err(e) = registered {
            error!(error = %e, "Job handler not registered");
        }
    }

    registry
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
