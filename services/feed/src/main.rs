use anyhow::{Context, Result};
use feed_service::api::{start_api_server, AppState};
use feed_service::config::{BlobBackend, Config};
use feed_service::{
    BlobStore, FeedLoader, InMemoryMetadataStore, LocalBlobStore, MetadataStore, PgMetadataStore,
    S3BlobStore, UploadPipeline,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Database URL that selects the process-local metadata store
const IN_MEMORY_DATABASE_URL: &str = "memory://";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Reelfeed Feed Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let metadata_store: Arc<dyn MetadataStore> = if config.database.url == IN_MEMORY_DATABASE_URL {
        warn!("Using in-memory metadata store, records are lost on restart");
        Arc::new(InMemoryMetadataStore::new())
    } else {
        let store = PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?;

        // Run migrations if enabled
        if config.database.run_migrations {
            store
                .run_migrations()
                .await
                .context("Failed to run database migrations")?;
        }

        Arc::new(store)
    };

    let (blob_store, uploads_dir) = match config.blob.backend {
        BlobBackend::Local => {
            let store = LocalBlobStore::new(&config.blob.directory, config.blob.public_base_url.clone())
                .await
                .context("Failed to initialize local blob store")?;
            let dir = store.directory().to_path_buf();
            let store: Arc<dyn BlobStore> = Arc::new(store);
            (store, Some(dir))
        }
        BlobBackend::S3 => {
            let store = S3BlobStore::new(&config.blob)
                .await
                .context("Failed to initialize S3 blob store")?;
            let store: Arc<dyn BlobStore> = Arc::new(store);
            (store, None)
        }
    };

    let api_state = AppState {
        pipeline: Arc::new(UploadPipeline::new(blob_store, metadata_store.clone())),
        feed_loader: Arc::new(FeedLoader::new(metadata_store.clone())),
        metadata_store,
        uploads_dir,
        playback: config.playback,
    };

    info!(
        swipe_threshold = config.playback.swipe_threshold,
        "Feed service started successfully"
    );

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("Feed service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
