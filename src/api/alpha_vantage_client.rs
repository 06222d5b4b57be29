use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ApiRateLimiter, ProviderRow, StatementProvider};
use crate::error::{PipelineError, Result};
use crate::models::{Config, StatementKind};

/// Body keys Alpha Vantage uses instead of an HTTP error status
const PROVIDER_MESSAGE_KEYS: &[&str] = &["Error Message", "Information", "Note"];

/// Alpha Vantage fundamentals response (`INCOME_STATEMENT`, `BALANCE_SHEET`, `CASH_FLOW`)
#[derive(Debug, Deserialize)]
pub struct AlphaVantageStatementsResponse {
    pub symbol: Option<String>,
    #[serde(rename = "annualReports", default)]
    pub annual_reports: Vec<ProviderRow>,
    #[serde(rename = "quarterlyReports", default)]
    pub quarterly_reports: Vec<ProviderRow>,
}

/// Alpha Vantage API client
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: ApiRateLimiter,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, "https://www.alphavantage.co/query".to_string(), 5)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_base_url(
            config.require_api_key()?.to_string(),
            config.alpha_vantage_base_url.clone(),
            config.rate_limit_per_minute,
        )
    }

    pub fn with_base_url(api_key: String, base_url: String, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
            rate_limiter: ApiRateLimiter::new(requests_per_minute),
        })
    }

    /// Fetch and decode one fundamentals function for a symbol
    pub async fn get_statements(
        &self,
        kind: StatementKind,
        symbol: &str,
    ) -> Result<AlphaVantageStatementsResponse> {
        self.rate_limiter.wait().await;

        debug!("Fetching {} for {} from Alpha Vantage", kind.provider_function(), symbol);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", kind.provider_function()),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        parse_statements_response(&text)
    }
}

/// Decode a fundamentals body, surfacing Alpha Vantage's in-band error messages.
pub fn parse_statements_response(text: &str) -> Result<AlphaVantageStatementsResponse> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        PipelineError::Provider(format!(
            "Failed to parse statement data: {} | Response: {}",
            e,
            text.chars().take(200).collect::<String>()
        ))
    })?;

    if let Some(object) = value.as_object() {
        for key in PROVIDER_MESSAGE_KEYS {
            if let Some(message) = object.get(*key) {
                return Err(PipelineError::Provider(format!(
                    "Alpha Vantage API rate limit exceeded or error: {}",
                    message
                )));
            }
        }
    }

    serde_json::from_value(value)
        .map_err(|e| PipelineError::Provider(format!("Unexpected statement payload: {}", e)))
}

#[async_trait::async_trait]
impl StatementProvider for AlphaVantageClient {
    async fn fetch_statements(&self, kind: StatementKind, symbol: &str) -> Result<Vec<ProviderRow>> {
        Ok(self.get_statements(kind, symbol).await?.annual_reports)
    }
}
