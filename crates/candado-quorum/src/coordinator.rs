//! Quorum lock coordinator
//!
//! Drives N independent lock stores through the same acquisition with one
//! random token, requires a majority, and discounts the remaining validity
//! by elapsed time and a clock-drift margin. Every failure path unwinds with
//! a token-gated best-effort delete against all stores, including stores
//! whose answer never arrived: a timed-out `try_set` may still have landed.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use candado_common::{LockError, generate_token};
use candado_store::{LockStore, with_budget};

use crate::config::QuorumConfig;
use crate::model::{AcquiredLock, LockHandle};

/// Validity left in a lease after acquisition took `elapsed`.
///
/// The drift margin is `ttl * drift_factor + 2ms`: it bounds the worst-case
/// window in which two callers could both believe they hold the lock when
/// the stores' own clocks disagree. `None` means the margin is gone and the
/// acquisition must be treated as failed even with a quorum.
pub(crate) fn remaining_validity(
    ttl: Duration,
    elapsed: Duration,
    drift_factor: f64,
) -> Option<Duration> {
    let drift = ttl.mul_f64(drift_factor) + Duration::from_millis(2);
    ttl.checked_sub(elapsed)?
        .checked_sub(drift)
        .filter(|v| *v > Duration::ZERO)
}

/// Redlock-style coordinator over N independent stores
pub struct QuorumLockCoordinator {
    stores: Vec<Arc<dyn LockStore>>,
    config: QuorumConfig,
}

impl QuorumLockCoordinator {
    /// Create a coordinator over the given stores.
    ///
    /// With a single store the quorum degenerates to that store alone: the
    /// lock still works but has no protection against that store failing.
    pub fn new(stores: Vec<Arc<dyn LockStore>>, config: QuorumConfig) -> Self {
        if stores.len() == 1 {
            warn!("quorum coordinator configured with a single store; no split-brain protection");
        }
        Self { stores, config }
    }

    /// Majority threshold: floor(N/2) + 1
    pub fn quorum(&self) -> usize {
        self.stores.len() / 2 + 1
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Acquire `key` for `ttl` with a fresh random token.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<AcquiredLock, LockError> {
        self.acquire_with_token(key, generate_token(), ttl).await
    }

    /// Extend a held lock by re-running the quorum set with its own token.
    ///
    /// Stores where the token still matches refresh their TTL; stores where
    /// it expired re-grant it. If another token took over anywhere the quorum
    /// fails and the attempt unwinds, leaving the new owner untouched.
    pub async fn extend(
        &self,
        handle: &LockHandle,
        new_ttl: Duration,
    ) -> Result<AcquiredLock, LockError> {
        self.acquire_with_token(&handle.key, handle.token.clone(), new_ttl)
            .await
    }

    /// Best-effort release against all stores. Informational only: the
    /// store-side TTL is the safety net if this never runs or partially fails.
    pub async fn release(&self, handle: &LockHandle) {
        self.delete_everywhere(&handle.key, &handle.token).await;
        counter!("lock_release_total").increment(1);
        debug!(key = %handle.key, "lock released");
    }

    async fn acquire_with_token(
        &self,
        key: &str,
        token: String,
        ttl: Duration,
    ) -> Result<AcquiredLock, LockError> {
        let started = Instant::now();

        let attempts = self.stores.iter().map(|store| {
            let token = token.as_str();
            async move {
                with_budget(self.config.per_store_timeout(), &self.config.retry, || {
                    store.try_set(key, token, ttl)
                })
                .await
            }
        });
        let results = join_all(attempts).await;
        let elapsed = started.elapsed();

        let granted = results.iter().filter(|r| matches!(r, Ok(true))).count();
        let errored = results.iter().filter(|r| r.is_err()).count();
        let needed = self.quorum();

        match remaining_validity(ttl, elapsed, self.config.clock_drift_factor) {
            Some(validity) if granted >= needed => {
                counter!("lock_acquire_total", "outcome" => "acquired").increment(1);
                debug!(
                    key,
                    granted,
                    elapsed_ms = elapsed.as_millis() as u64,
                    validity_ms = validity.as_millis() as u64,
                    "lock acquired"
                );
                Ok(AcquiredLock {
                    handle: LockHandle {
                        key: key.to_string(),
                        token,
                        ttl,
                        acquired_at: started,
                    },
                    validity,
                })
            }
            validity => {
                // A refused store holds nothing, but a timed-out one might:
                // the delete is token-gated, so sweeping all N is safe
                self.delete_everywhere(key, &token).await;

                let err = if errored == self.stores.len() {
                    let first = results
                        .iter()
                        .find_map(|r| r.as_ref().err())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no stores configured".to_string());
                    LockError::StoreUnavailable(first)
                } else if granted >= needed && validity.is_none() {
                    LockError::ValidityExpired {
                        ttl_ms: ttl.as_millis() as u64,
                        elapsed_ms: elapsed.as_millis() as u64,
                    }
                } else {
                    LockError::QuorumNotReached {
                        granted,
                        needed,
                        total: self.stores.len(),
                    }
                };

                counter!("lock_acquire_total", "outcome" => outcome_label(&err)).increment(1);
                debug!(key, granted, needed, error = %err, "lock not acquired");
                Err(err)
            }
        }
    }

    async fn delete_everywhere(&self, key: &str, token: &str) {
        let deletes = self.stores.iter().map(|store| async move {
            with_budget(self.config.per_store_timeout(), &self.config.retry, || {
                store.compare_delete(key, token)
            })
            .await
        });
        for result in join_all(deletes).await {
            if let Err(err) = result {
                debug!(key, error = %err, "best-effort delete skipped a store");
            }
        }
    }
}

fn outcome_label(err: &LockError) -> &'static str {
    match err {
        LockError::QuorumNotReached { .. } => "quorum_not_reached",
        LockError::ValidityExpired { .. } => "validity_expired",
        LockError::StoreUnavailable(_) => "store_unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use candado_store::{MemoryLockStore, RetryPolicy};

    fn backends(n: usize) -> Vec<Arc<MemoryLockStore>> {
        (0..n)
            .map(|i| Arc::new(MemoryLockStore::new(format!("s{}", i))))
            .collect()
    }

    fn coordinator(
        backends: &[Arc<MemoryLockStore>],
        config: QuorumConfig,
    ) -> QuorumLockCoordinator {
        let stores = backends
            .iter()
            .map(|b| b.clone() as Arc<dyn LockStore>)
            .collect();
        QuorumLockCoordinator::new(stores, config)
    }

    fn quick_config() -> QuorumConfig {
        QuorumConfig {
            per_store_timeout_ms: 500,
            clock_drift_factor: 0.01,
            retry: RetryPolicy {
                retry_count: 1,
                retry_delay_ms: 10,
            },
        }
    }

    #[tokio::test]
    async fn test_acquire_worked_example() {
        // N=3, ttl=10000ms, drift 0.01 => margin 102ms; with sub-50ms local
        // latency the validity lands in the 9848..=9950ms envelope
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let lock = coordinator
            .acquire("resource-a", Duration::from_millis(10_000))
            .await
            .unwrap();
        let validity_ms = lock.validity.as_millis() as u64;
        assert!(
            (9848..=9950).contains(&validity_ms),
            "validity {}ms outside envelope",
            validity_ms
        );

        for backend in &backends {
            assert_eq!(
                backend.get("resource-a").await.unwrap(),
                Some(lock.handle.token.clone())
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_acquirer_is_refused() {
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let first = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        let second = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(
            second,
            LockError::QuorumNotReached {
                granted: 0,
                needed: 2,
                total: 3
            }
        );

        // The loser's cleanup must not have touched the holder
        for backend in &backends {
            assert_eq!(
                backend.get("resource-a").await.unwrap(),
                Some(first.handle.token.clone())
            );
        }
    }

    #[tokio::test]
    async fn test_mutual_exclusion_under_contention() {
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let attempts = (0..8).map(|_| coordinator.acquire("resource-a", Duration::from_secs(30)));
        let results = join_all(attempts).await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(LockError::QuorumNotReached { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_survives_minority_failure() {
        let backends = backends(5);
        backends[0].set_available(false);
        backends[1].set_available(false);
        let coordinator = coordinator(&backends, quick_config());

        let lock = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(lock.validity > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_lost_on_majority_failure() {
        let backends = backends(5);
        backends[0].set_available(false);
        backends[1].set_available(false);
        backends[2].set_available(false);
        let coordinator = coordinator(&backends, quick_config());

        let err = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LockError::QuorumNotReached {
                granted: 2,
                needed: 3,
                total: 5
            }
        );

        // The minority grants were unwound
        assert!(backends[3].get("resource-a").await.unwrap().is_none());
        assert!(backends[4].get("resource-a").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_stores_down_is_store_unavailable() {
        let backends = backends(3);
        for backend in &backends {
            backend.set_available(false);
        }
        let coordinator = coordinator(&backends, quick_config());

        let err = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::StoreUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stores_count_as_unknown_not_granted() {
        let backends = backends(3);
        backends[1].set_latency(Duration::from_secs(2));
        backends[2].set_latency(Duration::from_secs(2));
        let coordinator = coordinator(&backends, quick_config());

        let err = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::QuorumNotReached { granted: 1, .. }));

        // The one store that did answer was cleaned up
        assert!(backends[0].get("resource-a").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validity_expired_despite_quorum() {
        let backends = backends(3);
        for backend in &backends {
            backend.set_latency(Duration::from_millis(150));
        }
        let coordinator = coordinator(&backends, quick_config());

        let err = coordinator
            .acquire("resource-a", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::ValidityExpired { ttl_ms: 100, .. }));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_token_gated() {
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let first = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        coordinator.release(&first.handle).await;
        coordinator.release(&first.handle).await;

        // A new owner's lock is untouched by the stale handle's release
        let second = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        coordinator.release(&first.handle).await;
        for backend in &backends {
            assert_eq!(
                backend.get("resource-a").await.unwrap(),
                Some(second.handle.token.clone())
            );
        }
    }

    #[tokio::test]
    async fn test_extend_refreshes_own_lock() {
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let lock = coordinator
            .acquire("resource-a", Duration::from_secs(5))
            .await
            .unwrap();
        let extended = coordinator
            .extend(&lock.handle, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(extended.handle.token, lock.handle.token);
        assert!(extended.validity > lock.validity);
    }

    #[tokio::test]
    async fn test_extend_fails_after_takeover() {
        let backends = backends(3);
        let coordinator = coordinator(&backends, QuorumConfig::default());

        let stale = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        coordinator.release(&stale.handle).await;
        let current = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();

        let err = coordinator
            .extend(&stale.handle, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::QuorumNotReached { .. }));
        assert_eq!(
            backends[0].get("resource-a").await.unwrap(),
            Some(current.handle.token.clone())
        );
    }

    #[tokio::test]
    async fn test_single_store_degenerate_quorum() {
        let backends = backends(1);
        let coordinator = coordinator(&backends, QuorumConfig::default());
        assert_eq!(coordinator.quorum(), 1);

        let lock = coordinator
            .acquire("resource-a", Duration::from_secs(10))
            .await
            .unwrap();
        coordinator.release(&lock.handle).await;
        assert!(backends[0].get("resource-a").await.unwrap().is_none());
    }

    #[test]
    fn test_validity_drift_compensation() {
        let ttl = Duration::from_millis(10_000);
        let none = Duration::ZERO;

        // ttl - 0 - (100 + 2)
        assert_eq!(
            remaining_validity(ttl, none, 0.01),
            Some(Duration::from_millis(9898))
        );
        // Elapsed time comes straight off the margin
        assert_eq!(
            remaining_validity(ttl, Duration::from_millis(150), 0.01),
            Some(Duration::from_millis(9748))
        );
        // Consumed ttl
        assert_eq!(remaining_validity(ttl, Duration::from_millis(9899), 0.01), None);
        assert_eq!(remaining_validity(ttl, ttl, 0.01), None);
        // Zero margin is not usable validity
        assert_eq!(remaining_validity(ttl, Duration::from_millis(9898), 0.01), None);
    }

    mod validity_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // More drift never yields more validity
            #[test]
            fn drift_monotonic(ttl_ms in 100u64..60_000, elapsed_ms in 0u64..1_000) {
                let ttl = Duration::from_millis(ttl_ms);
                let elapsed = Duration::from_millis(elapsed_ms);
                let low = remaining_validity(ttl, elapsed, 0.01);
                let high = remaining_validity(ttl, elapsed, 0.05);
                match (low, high) {
                    (Some(l), Some(h)) => prop_assert!(h < l),
                    (None, Some(_)) => prop_assert!(false, "higher drift produced validity"),
                    _ => {}
                }
            }

            // More elapsed time never yields more validity
            #[test]
            fn elapsed_monotonic(ttl_ms in 100u64..60_000, elapsed_ms in 0u64..1_000) {
                let ttl = Duration::from_millis(ttl_ms);
                let shorter = remaining_validity(ttl, Duration::from_millis(elapsed_ms), 0.01);
                let longer = remaining_validity(ttl, Duration::from_millis(elapsed_ms + 50), 0.01);
                match (shorter, longer) {
                    (Some(s), Some(l)) => prop_assert!(l < s),
                    (None, Some(_)) => prop_assert!(false, "longer elapsed produced validity"),
                    _ => {}
                }
            }
        }
    }
}
