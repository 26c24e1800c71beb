//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failure is transient (message matches a retryable pattern)
//! - Execute retries with exponential backoff + jitter
//! - Stop immediately on cancellation
//!
//! # Design Decisions
//! - `max_retries + 1` attempts in total, strictly sequential
//! - Non-matching failures fail fast after a single attempt
//! - Only backend failures are ever retried; local errors and breaker
//!   rejections are structurally non-retryable
//! - Cancellation is checked before every attempt and races every delay

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::schema::RetryConfig;
use crate::error::{RefineError, RefineResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Retry policy for a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Case-insensitive substrings of transient failure messages.
    pub retryable_patterns: Vec<String>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            retryable_patterns: config.retryable_patterns.clone(),
        }
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `error` is worth another attempt.
    pub fn is_retryable(&self, error: &RefineError) -> bool {
        match error {
            RefineError::Backend { message, .. } => self.matches(message),
            _ => false,
        }
    }

    /// Case-insensitive substring match of `message` against the patterns.
    pub fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .any(|p| message.contains(&p.to_lowercase()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Retry an async operation with exponential backoff.
///
/// `operation` receives the 1-indexed attempt number. The returned error of
/// an exhausted or fail-fast run carries the number of attempts made.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RefineResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RefineResult<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(attempt, "Cancelled before attempt");
            return Err(RefineError::Cancelled);
        }

        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(RefineError::Cancelled) => return Err(RefineError::Cancelled),
            Err(e) => e,
        };

        if !policy.is_retryable(&error) {
            tracing::debug!(attempt, error = %error, "Non-retryable error");
            return Err(error.with_attempts(attempt));
        }

        if attempt >= max_attempts {
            tracing::warn!(
                attempts = attempt,
                max_retries = policy.max_retries,
                error = %error,
                "Max retries exceeded"
            );
            return Err(error.with_attempts(attempt));
        }

        let delay = calculate_backoff(attempt, policy.base_delay, policy.max_delay);
        let backend_id = error.backend_id().unwrap_or("unknown");
        metrics::record_retry(backend_id);
        tracing::warn!(
            backend_id = %backend_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(attempt, "Cancelled during backoff");
                return Err(RefineError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            retryable_patterns: vec!["timeout".into(), "503".into(), "Rate Limit".into()],
        }
    }

    fn transient() -> RefineError {
        RefineError::backend("a", "503 Service Unavailable")
    }

    #[test]
    fn test_pattern_matching_is_case_insensitive() {
        let p = policy(3);
        assert!(p.matches("Request TIMEOUT"));
        assert!(p.matches("rate limit exceeded"));
        assert!(!p.matches("401 Unauthorized"));

        assert!(p.is_retryable(&RefineError::backend("a", "Gateway Timeout")));
        assert!(!p.is_retryable(&RefineError::invalid_input("timeout")));
        assert!(!p.is_retryable(&RefineError::Cancelled));
    }

    #[test]
    fn test_pattern_matches_message_not_backend_id() {
        let p = policy(3);
        assert!(!p.is_retryable(&RefineError::backend("timeout-proxy", "bad request")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventually_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&policy(3), &CancellationToken::new(), |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();
        let err = with_retry(&policy(3), &CancellationToken::new(), |attempt| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(RefineError::backend("a", format!("timeout #{attempt}"))) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            err,
            RefineError::Backend {
                backend_id: "a".into(),
                message: "timeout #4".into(),
                attempts: 4
            }
        );

        // 1s + 2s + 4s expected, each within ±25%.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(5250), "{waited:?}");
        assert!(waited <= Duration::from_millis(8750) + Duration::from_millis(10), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = with_retry(&policy(3), &CancellationToken::new(), |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RefineError::backend("a", "401 Unauthorized")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RefineError::Backend { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let err = with_retry(&policy(3), &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RefineError>(()) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, RefineError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let trigger = cancel.clone();

        let err = with_retry(&policy(3), &cancel, |_| {
            c.fetch_add(1, Ordering::SeqCst);
            // Cancel while the first failure's backoff is pending.
            trigger.cancel();
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, RefineError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&policy(0), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RefineError::Backend { attempts: 1, .. }));
    }
}
