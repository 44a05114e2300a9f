// Quorum coordinator configuration

use std::time::Duration;

use candado_store::RetryPolicy;

/// Configuration for the quorum lock coordinator
#[derive(Debug, Clone)]
pub struct QuorumConfig {
    /// Budget for one store's operation including retries (default: 1000ms).
    /// Each store spends its own budget; a slow store never eats another's.
    pub per_store_timeout_ms: u64,

    /// Fraction of the TTL reserved against clock skew across the
    /// independent stores (default: 0.01). A fixed 2ms is added on top.
    pub clock_drift_factor: f64,

    /// Retry policy applied inside each store's timeout budget
    pub retry: RetryPolicy,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            per_store_timeout_ms: 1000,
            clock_drift_factor: 0.01,
            retry: RetryPolicy::default(),
        }
    }
}

impl QuorumConfig {
    pub fn per_store_timeout(&self) -> Duration {
        Duration::from_millis(self.per_store_timeout_ms)
    }
}

/// Configuration for the background expiry reaper
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Sweep cadence in milliseconds (default: 5000ms)
    pub sweep_interval_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 5000,
        }
    }
}

impl ReaperConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
