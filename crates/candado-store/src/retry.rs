// Transient-failure retry policy for store calls
// Retries are counted against one store's timeout budget, never another's

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use candado_common::StoreError;

/// Retry configuration for a single store's operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure (default: 3)
    pub retry_count: u32,
    /// Pause between attempts in milliseconds (default: 200ms)
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Run `op`, retrying transient failures per the policy.
///
/// Non-transient failures surface immediately. Retrying a `try_set` or
/// `compare_delete` is safe because both are idempotent for a fixed token.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut last_err = None;
    for attempt in 0..=policy.retry_count {
        if attempt > 0 {
            tokio::time::sleep(policy.retry_delay()).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                debug!(attempt, error = %err, "transient store failure");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(StoreError::Timeout))
}

/// Run `op` with retries inside one store's overall timeout budget.
///
/// Exceeding the budget yields `StoreError::Timeout`, which the caller must
/// treat as an unknown outcome rather than a refusal.
pub async fn with_budget<T, F, Fut>(
    budget: Duration,
    policy: &RetryPolicy,
    op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(budget, retry_transient(policy, op)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            retry_count: 3,
            retry_delay_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&quick_policy(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Connection("reset".to_string()))
            } else {
                Ok(7u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_last_error() {
        let result: Result<(), _> = retry_transient(&quick_policy(), || async {
            Err(StoreError::Connection("reset".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_non_transient_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(&quick_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Internal("corrupt".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Internal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exceeded_is_timeout() {
        let result: Result<(), _> =
            with_budget(Duration::from_millis(25), &quick_policy(), || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await;
        assert_eq!(result.unwrap_err(), StoreError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_allows_fast_success() {
        let result = with_budget(Duration::from_millis(100), &quick_policy(), || async {
            Ok(42u32)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
