//! Provider gateway configuration.

use patent_core::{defaults, Error, Result};

/// Connection settings for the upstream search provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL; requests go to `{base_url}/search`.
    pub base_url: String,
    /// API key sent in every request body.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Total attempts per call, first try included.
    pub max_attempts: u32,
    /// Base URL for rendered PDFs; `{pdf_base_url}/{publication_number}`.
    pub pdf_base_url: String,
}

impl ProviderConfig {
    /// Create a config with default timeout and retry settings.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let pdf_base_url = format!("{}/{}", base_url, defaults::PROVIDER_PDF_PATH);
        Self {
            base_url,
            api_key: api_key.into(),
            timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
            max_attempts: defaults::PROVIDER_MAX_ATTEMPTS,
            pdf_base_url,
        }
    }

    /// Load from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PROVIDER_URL` | required | Provider base URL |
    /// | `PROVIDER_API_KEY` | required | Provider API key |
    /// | `PROVIDER_TIMEOUT_SECS` | `1000` | Per-request timeout |
    /// | `PROVIDER_MAX_ATTEMPTS` | `3` | Attempts per call |
    /// | `PROVIDER_PDF_BASE_URL` | `{PROVIDER_URL}/patents/pdf` | PDF link prefix |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PROVIDER_URL")
            .map_err(|_| Error::Config("PROVIDER_URL is not set".to_string()))?;
        let api_key = std::env::var("PROVIDER_API_KEY")
            .map_err(|_| Error::Config("PROVIDER_API_KEY is not set".to_string()))?;

        let mut config = Self::new(base_url, api_key);

        if let Some(secs) = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout_secs = secs;
        }
        if let Some(attempts) = std::env::var("PROVIDER_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config = config.with_max_attempts(attempts);
        }
        if let Ok(pdf) = std::env::var("PROVIDER_PDF_BASE_URL") {
            config.pdf_base_url = pdf.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set attempts per call (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Endpoint every search and statistics call is posted to.
    pub fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}
