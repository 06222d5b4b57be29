use std::time::Duration;

use crate::error::Result;
use crate::models::StatementKind;

pub mod alpha_vantage_client;
pub use alpha_vantage_client::AlphaVantageClient;

/// Raw provider row keyed by camelCase field names
pub type ProviderRow = serde_json::Map<String, serde_json::Value>;

/// Simple rate limiter for API requests
pub struct ApiRateLimiter {
    delay_ms: u64,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let delay_ms = if requests_per_minute > 0 {
            60_000 / requests_per_minute as u64
        } else {
            0
        };

        Self { delay_ms }
    }

    pub async fn wait(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

/// Upstream source of per-company statement rows
#[async_trait::async_trait]
pub trait StatementProvider: Send + Sync {
    /// Annual report rows for one statement kind, newest first as the provider returns them.
    async fn fetch_statements(&self, kind: StatementKind, symbol: &str) -> Result<Vec<ProviderRow>>;
}
