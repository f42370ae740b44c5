//! Timeout and exponential-backoff retries for external calls.
//!
//! Every attempt is bounded by [`RequestConfig::timeout_ms`]. Attempt `n`
//! (counting retries from 1) waits `retry_delay_ms * 2^(n-1)`, capped at
//! [`MAX_RETRY_DELAY_MS`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RequestConfig;

/// Upper bound on a single backoff delay.
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation reported an error that retrying cannot fix.
    Permanent(E),
    /// Every attempt failed or timed out.
    Exhausted {
        /// Message of the last failure.
        last_error: String,
        /// Number of failed attempts.
        retries: u32,
    },
}

/// Delay before retry number `retry` (1-based). Never overflows.
pub fn backoff_delay(config: &RequestConfig, retry: u32) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }
    let factor = 2_u64.saturating_pow(retry - 1);
    let millis = config
        .retry_delay_ms
        .saturating_mul(factor)
        .min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(millis)
}

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
///
/// `operation` names the call in retry logs.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: &RequestConfig,
    operation: &str,
    mut attempt: F,
    is_permanent: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut last_error = None;

    for retry in 0..=config.max_retries {
        if retry > 0 {
            let delay = backoff_delay(config, retry);
            warn!(
                operation = %operation,
                retry,
                delay_ms = delay.as_millis(),
                "Retrying"
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(timeout, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if is_permanent(&e) => return Err(RetryError::Permanent(e)),
            Ok(Err(e)) => last_error = Some(e.to_string()),
            Err(_) => {
                last_error = Some(format!(
                    "{} timed out after {}ms",
                    operation, config.timeout_ms
                ))
            }
        }
    }

    Err(RetryError::Exhausted {
        last_error: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        retries: config.max_retries.saturating_add(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_retries: u32, retry_delay_ms: u64) -> RequestConfig {
        RequestConfig {
            timeout_ms: 50,
            max_retries,
            retry_delay_ms,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = config(3, 100);
        assert_eq!(backoff_delay(&config, 0), Duration::ZERO);
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates_at_cap() {
        let config = config(u32::MAX, 1_000);
        assert_eq!(
            backoff_delay(&config, 64),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );
        assert_eq!(
            backoff_delay(&config, u32::MAX),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );

        let huge = RequestConfig {
            retry_delay_ms: u64::MAX,
            ..config
        };
        assert_eq!(
            backoff_delay(&huge, 2),
            Duration::from_millis(MAX_RETRY_DELAY_MS)
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, RetryError<String>> = retry_with_backoff(
            &config(3, 1),
            "flaky",
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            },
            |_| false,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &config(5, 1),
            "strict",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("bad input".to_string())
            },
            |e| e.starts_with("bad"),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(ref e)) if e == "bad input"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_error_and_count() {
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &config(2, 1),
            "down",
            || async { Err("503".to_string()) },
            |_| false,
        )
        .await;

        match result {
            Err(RetryError::Exhausted {
                last_error,
                retries,
            }) => {
                assert_eq!(last_error, "503");
                assert_eq!(retries, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &config(0, 1),
            "slow call",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |_| false,
        )
        .await;

        match result {
            Err(RetryError::Exhausted { last_error, .. }) => {
                assert_eq!(last_error, "slow call timed out after 50ms")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
