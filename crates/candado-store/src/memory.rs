// In-memory lock store backend
// Per-key atomicity comes from the DashMap entry lock; TTL is evaluated on
// every read so sweeping is never needed for correctness

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use candado_common::{StoreError, current_timestamp};

use super::{ExpirySweep, LockStore};

/// One stored lock row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Ownership token proving who may delete or extend this row
    pub token: String,
    /// Expiry as Unix millis; the row is dead at and after this instant
    pub expires_at: i64,
}

impl StoreEntry {
    fn new(token: &str, ttl: Duration) -> Self {
        Self {
            token: token.to_string(),
            expires_at: current_timestamp() + ttl.as_millis() as i64,
        }
    }

    pub fn is_expired(&self) -> bool {
        current_timestamp() >= self.expires_at
    }
}

/// In-memory `LockStore` backed by DashMap.
///
/// Each instance models one independent remote store, so a quorum setup
/// holds N separate instances. The availability and latency toggles inject
/// the failures the coordinator has to tolerate: a store marked unavailable
/// refuses connections, and injected latency can push a call past the
/// caller's per-store timeout.
pub struct MemoryLockStore {
    name: String,
    entries: DashMap<String, StoreEntry>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryLockStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Mark the store reachable or unreachable. Unreachable stores fail every
    /// operation with a connection error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Inject a fixed response delay on every operation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "store '{}' unreachable",
                self.name
            )));
        }
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.connect().await?;

        let granted = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get();
                // An expired row is as good as absent; a matching token
                // re-sets its own TTL (extend)
                if entry.is_expired() || entry.token == token {
                    occupied.insert(StoreEntry::new(token, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoreEntry::new(token, ttl));
                true
            }
        };

        if granted {
            debug!(store = %self.name, key = %key, "entry set");
        }
        Ok(granted)
    }

    async fn compare_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        self.connect().await?;

        let deleted = match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                if entry.is_expired() {
                    // Reclaim the dead row, but the caller no longer owned it
                    occupied.remove();
                    false
                } else if entry.token == token {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if deleted {
            debug!(store = %self.name, key = %key, "entry deleted");
        }
        Ok(deleted)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.connect().await?;

        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.token.clone()))
    }
}

#[async_trait]
impl ExpirySweep for MemoryLockStore {
    async fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    async fn live_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .count()
    }
}
