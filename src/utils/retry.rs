use std::fmt::Display;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::utils::strip_html;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with full jitter, floored at the base delay
    /// https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
    pub fn next_delay(&self, current_ms: u64) -> u64 {
        let next_delay = current_ms as f64 * self.exponential;
        let jittered = (fastrand::f64() * next_delay) as u64;
        jittered.clamp(self.base_delay_ms, self.max_delay_ms.max(self.base_delay_ms))
    }
}

/// Run `operation` until it succeeds, `config.max_attempts` is reached, or it
/// fails with an error `retryable` rejects. Returns the last error.
pub async fn retry_when<F, Fut, T, E, P>(
    operation: F,
    config: &RetryConfig,
    context: &str,
    retryable: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    let mut delay = config.base_delay_ms;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !retryable(&e) {
                    warn!(
                        "Operation '{}' failed with a non-retryable error: {}",
                        context,
                        strip_html(&e.to_string())
                    );
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        context,
                        attempt,
                        strip_html(&e.to_string())
                    );
                    return Err(e);
                }

                warn!(
                    "Attempt {}/{} for '{}' failed: {}. Retrying in {}ms...",
                    attempt,
                    config.max_attempts,
                    context,
                    strip_html(&e.to_string()),
                    delay
                );

                sleep(Duration::from_millis(delay)).await;

                delay = config.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
