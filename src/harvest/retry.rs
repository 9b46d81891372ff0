use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping `backoff * attempt`
/// between tries, and return the last error once attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(mut op: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < attempts {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    sleep(policy.backoff * attempt).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("at least one attempt was made"))
}
