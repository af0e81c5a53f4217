//! patent-api - HTTP API server and upload worker for patent-upload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patent_api::{router, AppConfig, AppState};
use patent_core::{defaults, PatentProvider, PatentStore};
use patent_db::{apply_schema, create_pool_with_config, PgPatentRepository};
use patent_jobs::{
    BrokerConfig, FilterService, IngestionPipeline, PatentExtractor, RedisBroker, UploadHandler,
    UploadWorker,
};
use patent_provider::HttpPatentProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "patent_api=debug,patent_jobs=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "patent_api=debug,patent_jobs=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("patent-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;

    // Database: fail fast
    let pool = create_pool_with_config(&config.database_url, config.pool.clone()).await?;
    apply_schema(&pool).await?;
    info!(subsystem = "db", "Database schema ready");

    let provider: Arc<dyn PatentProvider> =
        Arc::new(HttpPatentProvider::new(config.provider.clone())?);
    let extractor = PatentExtractor::new(config.provider.pdf_base_url.clone());
    let store: Arc<dyn PatentStore> = Arc::new(
        PgPatentRepository::new(pool.clone()).with_batch_size(config.persist_batch_size),
    );

    // Upload worker
    let broker = Arc::new(connect_broker(config.broker.clone()).await?);
    let pipeline = Arc::new(IngestionPipeline::new(
        provider.clone(),
        extractor.clone(),
        config.pipeline.clone(),
    ));
    let handler = Arc::new(UploadHandler::new(pipeline, store));
    let worker = UploadWorker::new(broker, handler, config.worker.clone()).start();

    // HTTP
    let state = AppState {
        filters: Arc::new(FilterService::new(provider, extractor)),
        pool,
    };
    let app = router(state);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down upload worker");
    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Upload worker already stopped");
    }
    worker.join().await;

    Ok(())
}

/// Connect to the broker, retrying with exponential backoff.
async fn connect_broker(config: BrokerConfig) -> anyhow::Result<RedisBroker> {
    let mut backoff = Duration::from_millis(defaults::BROKER_CONNECT_BACKOFF_MS);
    let mut attempt = 1;
    loop {
        match RedisBroker::connect(config.clone()).await {
            Ok(broker) => return Ok(broker),
            Err(e) if attempt < defaults::BROKER_CONNECT_ATTEMPTS => {
                warn!(
                    subsystem = "jobs",
                    component = "broker",
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Broker connection failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
