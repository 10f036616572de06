use std::future::Future;
use std::time::Duration;

use tracing::warn;

use common::{Config, Result};

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Bounded exponential backoff for ledger writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub attempts: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(200),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            attempts: config.ledger_retry_attempts.max(1),
            base: config.ledger_retry_base,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.base;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts = self.attempts,
                        backoff = ?backoff,
                        error = %e,
                        "Ledger call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
