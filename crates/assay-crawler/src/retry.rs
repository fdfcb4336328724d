use std::future::Future;
use std::time::Duration;

use assay_common::config::CrawlerConfig;
use log::debug;

use crate::error::{SourceError, SourceResult};

/// Limits applied to every individual call to an external source.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// A zero timeout disables the limit.
    pub timeout: Duration,
    pub max_retries: usize,
    /// The delay grows linearly with the attempt number.
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    fn delay(&self, attempt: usize) -> Duration {
        self.backoff
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Runs `call` under the timeout of `policy`, retrying transient failures.
/// Timeouts count as transient, so a slow call is retried like an unreachable source.
pub async fn call_with_retry<T, F, Fut>(
    policy: &CallPolicy,
    operation: &str,
    mut call: F,
) -> SourceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let mut attempt = 0;
    loop {
        let result = if policy.timeout.is_zero() {
            call().await
        } else {
            match tokio::time::timeout(policy.timeout, call()).await {
                Ok(x) => x,
                Err(_) => Err(SourceError::Timeout(policy.timeout)),
            }
        };
        match result {
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                debug!("{operation} failed on attempt {attempt}: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
