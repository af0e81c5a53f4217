//! Process configuration, read once at startup.

use patent_core::{defaults, Result};
use patent_db::PoolConfig;
use patent_jobs::{BrokerConfig, PipelineConfig, WorkerConfig};
use patent_provider::ProviderConfig;

/// Everything the binary needs, assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub pool: PoolConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    /// Records per batch inside one save transaction.
    pub persist_batch_size: usize,
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DATABASE_URL` | `postgres://localhost/patents` | PostgreSQL URL |
    /// | `HOST` | `0.0.0.0` | HTTP bind host |
    /// | `PORT` | `8080` | HTTP port |
    /// | `PERSIST_BATCH_SIZE` | `500` | Records per insert batch |
    ///
    /// Component variables are documented on `PoolConfig`, `ProviderConfig`,
    /// `PipelineConfig`, `BrokerConfig` and `WorkerConfig`. Fails only when a
    /// required provider variable is missing.
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
        let host = std::env::var("HOST").unwrap_or_else(|_| defaults::HOST.to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults::PORT);
        let persist_batch_size = std::env::var("PERSIST_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::PERSIST_BATCH_SIZE)
            .max(1);

        Ok(Self {
            database_url,
            host,
            port,
            pool: PoolConfig::from_env(),
            provider: ProviderConfig::from_env()?,
            pipeline: PipelineConfig::from_env(),
            persist_batch_size,
            broker: BrokerConfig::from_env(),
            worker: WorkerConfig::from_env(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
