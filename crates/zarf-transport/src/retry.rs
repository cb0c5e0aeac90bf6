//! Bounded retries with exponential backoff
//!
//! Transport failures retry at the granularity of a single layer or
//! request. Backoff doubles per attempt with a little jitter so parallel
//! workers do not stampede.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Retry policy for transport operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let jitter = 1.0 + rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        Duration::from_millis((capped * jitter).max(0.0) as u64)
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the
/// retry budget is exhausted.
pub async fn with_retries<T, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transport error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&fast_config(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::Oci {
                        message: "flaky".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&fast_config(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransportError::Unsupported {
                    operation: "nope".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&fast_config(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransportError::Oci {
                    message: "down".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        // initial attempt + max_retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
