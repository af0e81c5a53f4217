//! HTTP implementation of [`PatentProvider`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use patent_core::{
    defaults, Error, Filter, FilterSet, PatentProvider, RawPage, Result, SearchStatistics,
};

use crate::config::ProviderConfig;

/// Request body of the provider `/search` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    filters: &'a [Filter],
    return_fields: Vec<String>,
    key: &'a str,
    sort_field: &'a str,
    sort_direction: &'a str,
    start: i64,
    count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_filter: Option<bool>,
}

/// Provider gateway over a shared `reqwest` connection pool.
///
/// Every call is one `POST {base}/search`, retried on transport errors and
/// non-2xx statuses up to `max_attempts` times with no backoff.
#[derive(Debug, Clone)]
pub struct HttpPatentProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpPatentProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(
            subsystem = "provider",
            component = "gateway",
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            max_attempts = config.max_attempts,
            "Initialized provider gateway"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn request<'a>(&'a self, filters: &'a FilterSet, start: i64, count: i64) -> SearchRequest<'a> {
        SearchRequest {
            filters: &filters.filters,
            return_fields: filters.return_fields.names(),
            key: &self.config.api_key,
            sort_field: defaults::PROVIDER_SORT_FIELD,
            sort_direction: defaults::PROVIDER_SORT_DIRECTION,
            start,
            count,
            pre_filter: filters.pre_filter,
        }
    }

    /// Post with bounded retry of transient failures; returns the body of the
/// first 2xx response.
    async fn post(&self, body: &SearchRequest<'_>) -> Result<String> {
        let mut last_err = Error::Internal("no provider attempt was made".to_string());

        for attempt in 1..=self.config.max_attempts {
            match self.post_once(body).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(
                        subsystem = "provider",
                        component = "gateway",
                        attempt,
                        max_attempts = self.config.max_attempts,
                        start = body.start,
                        error = %e,
                        "Provider request failed"
                    );
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn post_once(&self, body: &SearchRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(self.config.search_url())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Provider returned {}: {}",
                status, text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Request(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl PatentProvider for HttpPatentProvider {
    #[instrument(skip(self, filters), fields(subsystem = "provider", op = "search"))]
    async fn search(&self, filters: &FilterSet, offset: i64, count: i64) -> Result<RawPage> {
        let start = Instant::now();
        let body = self.post(&self.request(filters, offset, count)).await?;
        debug!(
            response_len = body.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search page fetched"
        );
        Ok(RawPage::new(body))
    }

    #[instrument(skip(self, filters), fields(subsystem = "provider", op = "statistics"))]
    async fn statistics(&self, filters: &FilterSet) -> Result<SearchStatistics> {
        let body = self.post(&self.request(filters, 0, 0)).await?;
        let stats = parse_statistics(&body)?;
        debug!(total_found = stats.total_found, "Statistics fetched");
        Ok(stats)
    }
}

/// Extract `aggregations` and `response.totalFound` from a search response.
pub fn parse_statistics(body: &str) -> Result<SearchStatistics> {
    let mut data: JsonValue = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("statistics is not JSON: {}", e)))?;

    let total_found = data
        .get("response")
        .ok_or_else(|| Error::MalformedResponse("missing or invalid 'response' field".into()))?
        .get("totalFound")
        .ok_or_else(|| Error::MalformedResponse("missing 'totalFound' in response".into()))?
        .as_f64()
        .ok_or_else(|| Error::MalformedResponse("'totalFound' is not a number".into()))?;

    let aggregations = match data.get_mut("aggregations").map(JsonValue::take) {
        Some(JsonValue::Object(map)) => map,
        _ => {
            return Err(Error::MalformedResponse(
                "missing or invalid 'aggregations' field".into(),
            ))
        }
    };

    Ok(SearchStatistics {
        aggregations,
        total_found: total_found as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use patent_core::{FilterOperator, ReturnFields};

    #[test]
    fn test_parse_statistics() {
        let stats = parse_statistics(
            r#"{"response": {"items": [], "totalFound": 42}, "aggregations": {"authority": {"US": 40}}}"#,
        )
        .unwrap();
        assert_eq!(stats.total_found, 42);
        assert!(stats.aggregations.contains_key("authority"));
    }

    #[test]
    fn test_parse_statistics_missing_aggregations() {
        let result = parse_statistics(r#"{"response": {"totalFound": 1}}"#);
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_statistics_total_not_number() {
        let result =
            parse_statistics(r#"{"response": {"totalFound": "many"}, "aggregations": {}}"#);
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let provider = HttpPatentProvider::new(ProviderConfig::new("http://x", "secret")).unwrap();
        let set = FilterSet {
            filters: vec![Filter::new("cpc", vec!["H01M".into()], Some(FilterOperator::Or))],
            pre_filter: None,
            return_fields: ReturnFields::All,
        };
        let json = serde_json::to_value(provider.request(&set, 40, 20)).unwrap();
        assert_eq!(json["returnFields"], serde_json::json!(["all"]));
        assert_eq!(json["key"], "secret");
        assert_eq!(json["sortField"], "docdb_document_number");
        assert_eq!(json["sortDirection"], "asc");
        assert_eq!(json["start"], 40);
        assert_eq!(json["count"], 20);
        assert!(json.get("preFilter").is_none());
        assert_eq!(json["filters"][0]["searchField"], "patent.cpc");
    }
}
