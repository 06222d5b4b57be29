use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::Result;
use crate::models::Config;

/// Fixed-attempt, fixed-delay retry settings
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            delay: config.retry_delay,
        }
    }
}

/// Run `operation`, retrying retryable failures with a fixed pause between attempts.
///
/// Non-retryable errors are returned immediately; the last error is returned
/// once attempts are exhausted.
pub async fn retry_operation<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                warn!(
                    "Operation failed, retrying in {:?}... (Attempt {}): {}",
                    policy.delay, attempts, e
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    error!("Operation failed after {} attempts: {}", attempts, e);
                }
                return Err(e);
            }
        }
    }
}
