use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{services, state::AppState};
use crate::catalog::{Catalog, FjallCatalog};
use crate::config::Config;
use crate::ingest::UploadCoordinator;
use crate::ledger::JobLedger;
use crate::staging::StagingStore;
use crate::storage::StorageRegistry;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Room for multipart framing and text fields on top of the archive limit
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Open every store named in `config` and build the coordinator
pub fn open_coordinator(config: Config) -> Result<UploadCoordinator, AnyError> {
    info!(path = %config.server.catalog_path.display(), "Opening catalog");
    let catalog: Arc<dyn Catalog> = Arc::new(FjallCatalog::open(&config.server.catalog_path)?);

    info!(path = %config.server.ledger_path.display(), "Opening job ledger");
    let ledger = JobLedger::open(&config.server.ledger_path)?;

    info!(path = %config.server.staging_path.display(), "Opening staging store");
    let staging = Arc::new(StagingStore::open(&config.server.staging_path)?);

    let storage = StorageRegistry::from_config(&config)?;
    info!(active = storage.active(), backups = ?storage.backups(), "Storage ready");

    Ok(UploadCoordinator::builder()
        .config(config)
        .catalog(catalog)
        .ledger(ledger)
        .staging(staging)
        .storage(storage)
        .build())
}

/// All routes with their layers
pub fn router(state: AppState) -> Router {
    let config = state.coordinator.config();
    let body_limit = usize::try_from(config.upload.max_archive_bytes.as_u64())
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let max_requests = config.server.max_concurrent_requests.max(1);

    Router::new()
        .route("/uploads/chapter", post(services::upload_chapter))
        .route("/uploads/bulk", post(services::upload_bulk))
        .route("/uploads/metadata", post(services::upload_metadata))
        .route("/uploads/multi", post(services::upload_multi))
        .route("/uploads/smart", post(services::upload_smart))
        .route("/uploads/validate", post(services::validate))
        .route("/uploads/resume", post(services::resume))
        .route("/uploads/health", get(services::upload_health))
        .route("/uploads/{job_id}/progress", get(services::progress))
        .route("/uploads/{job_id}/cancel", post(services::cancel))
        .route("/health", get(services::health))
        .fallback(services::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(max_requests))
        // Decompress gzip request bodies before any extractor sees them
        .layer(RequestDecompressionLayer::new())
}

/// Periodically drop expired jobs, their tokens and staged pages
fn spawn_pruner(coordinator: Arc<UploadCoordinator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = coordinator.prune_expired() {
                warn!(error = %e, "Job pruning failed");
            }
        }
    })
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.server.bind_addr;
    let prune_every = Duration::from_secs(config.retention.prune_interval_secs.max(1));

    let state = AppState::new(open_coordinator(config)?);

    let recovered = state.coordinator.recover_orphans()?;
    if recovered.interrupted + recovered.failed > 0 {
        info!(
            interrupted = recovered.interrupted,
            failed = recovered.failed,
            "Recovered jobs left by a previous run"
        );
    }

    let pruner = spawn_pruner(state.coordinator.clone(), prune_every);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mangabox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
