//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a single backend attempt with a deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An expired deadline is a backend failure whose message contains
//!   "timed out", so default retry patterns treat it as transient

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{RefineError, RefineResult};

/// Run `fut`, failing with a backend error attributed to `backend_id` if it
/// does not finish within `limit`.
pub async fn with_timeout<T, Fut>(backend_id: &str, limit: Duration, fut: Fut) -> RefineResult<T>
where
    Fut: Future<Output = RefineResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(backend_id = %backend_id, limit_ms = limit.as_millis() as u64, "Backend attempt timed out");
            Err(RefineError::backend(
                backend_id,
                format!("request timed out after {}ms", limit.as_millis()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggers_backend_error() {
        let err = with_timeout("a", Duration::from_millis(5), async {
            sleep(Duration::from_millis(20)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RefineError::Backend { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_future_passes_through() {
        let value = with_timeout("a", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
