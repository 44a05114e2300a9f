// Lock handle model
// A handle is transient: it never outlives the store-side TTL

use std::time::Duration;

use tokio::time::Instant;

/// Proof of one acquisition attempt on one key.
///
/// The token gates release and extension: a mismatched token at a store is a
/// no-op there, so a stale handle can never free someone else's lock.
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// Resource name being protected
    pub key: String,
    /// Random per-acquisition ownership token
    pub token: String,
    /// TTL that was requested from the stores
    pub ttl: Duration,
    /// Monotonic instant at which the acquisition attempt began
    pub acquired_at: Instant,
}

/// A successfully acquired quorum lock together with its usable margin
#[derive(Debug, Clone)]
pub struct AcquiredLock {
    pub handle: LockHandle,
    /// TTL remaining after elapsed acquisition time and drift compensation.
    /// The caller decides whether this margin is large enough to be useful.
    pub validity: Duration,
}

impl AcquiredLock {
    /// Validity remaining right now, saturating at zero once elapsed
    /// time has consumed the margin computed at acquisition.
    pub fn remaining_validity(&self) -> Duration {
        self.validity
            .saturating_sub(self.handle.acquired_at.elapsed())
    }
}
