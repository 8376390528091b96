//! Exponential backoff with jitter, plus the retry classification table
//! (spec §4.C). Grounded on the boxed-future retry-loop shape used elsewhere
//! in the ecosystem for fallible async operations, generalized here to carry
//! a cancellation token instead of a plain deadline.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use repodocs_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// HTTP statuses the retry engine treats as transient.
pub fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504) || (520..=530).contains(&status)
}

/// Full classification: cancellation/deadline never retry; a `Retryable`
/// wrapper or `RateLimited` always does; a bare `Fetch` falls back to its
/// HTTP status (if any).
pub fn should_retry(err: &Error) -> bool {
    match err {
        Error::Cancelled | Error::DeadlineExceeded => false,
        Error::RateLimited | Error::Retryable { .. } => true,
        Error::Fetch { status: Some(s), .. } => should_retry_status(*s),
        _ => false,
    }
}

fn backoff_for_attempt(cfg: &RetryConfig, attempt: u32) -> Duration {
    let base = cfg.initial_interval.as_secs_f64() * cfg.multiplier.powi(attempt as i32);
    let capped = base.min(cfg.max_interval.as_secs_f64());
    let span = capped * cfg.jitter_factor;
    let jitter = if span > 0.0 {
        rand::thread_rng().gen_range(-span..=span)
    } else {
        0.0
    };
    Duration::from_secs_f64((capped + jitter).max(0.0))
}

pub struct RetryEngine {
    config: RetryConfig,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `op` up to `max_retries + 1` times. A `Retry-After` carried by a
    /// `Retryable` error overrides the computed backoff for that attempt.
    /// Cancellation is observed both before each attempt and while sleeping.
    pub async fn execute<T, F>(&self, cancel: CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Pin<Box<dyn Future<Output = Result<T>> + Send>>,
    {
        for attempt in 0..=self.config.max_retries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !should_retry(&err) {
                        return Err(err);
                    }
                    if attempt == self.config.max_retries {
                        return Err(Error::MaxRetriesExceeded {
                            inner: Box::new(err),
                        });
                    }
                    let wait = err
                        .retry_after()
                        .unwrap_or_else(|| backoff_for_attempt(&self.config, attempt));
                    tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                }
            }
        }
        unreachable!("loop always returns before exhausting its range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn retryable_503() -> Error {
        Error::Retryable {
            inner: Box::new(Error::Fetch {
                url: "https://example.com/".to_string(),
                status: Some(503),
                cause: "unavailable".to_string(),
            }),
            retry_after: None,
        }
    }

    #[test]
    fn classifies_status_table() {
        assert!(should_retry_status(503));
        assert!(should_retry_status(429));
        assert!(should_retry_status(525));
        assert!(!should_retry_status(404));
        assert!(!should_retry_status(401));
    }

    #[test]
    fn cancellation_and_deadline_never_retry() {
        assert!(!should_retry(&Error::Cancelled));
        assert!(!should_retry(&Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let engine = RetryEngine::new(RetryConfig {
            max_retries: 5,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 1.0,
            jitter_factor: 0.0,
        });
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let result = engine
            .execute(cancel, || {
                let calls = calls.clone();
                Box::pin(async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(retryable_503())
                    } else {
                        Ok(42)
                    }
                })
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_into_max_retries_exceeded() {
        let engine = RetryEngine::new(RetryConfig {
            max_retries: 2,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 1.0,
            jitter_factor: 0.0,
        });
        let cancel = CancellationToken::new();
        let result: Result<()> = engine.execute(cancel, || Box::pin(async { Err(retryable_503()) })).await;
        assert!(matches!(result, Err(Error::MaxRetriesExceeded { .. })));
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let engine = RetryEngine::new(RetryConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let result: Result<()> = engine
            .execute(cancel, || {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Fetch {
                        url: "https://example.com/".to_string(),
                        status: Some(404),
                        cause: "not found".to_string(),
                    })
                })
            })
            .await;
        assert!(matches!(result, Err(Error::Fetch { status: Some(404), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_first_attempt() {
        let engine = RetryEngine::new(RetryConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = engine.execute(cancel, || Box::pin(async { Ok(()) })).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
