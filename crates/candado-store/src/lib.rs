//! Candado Store - lock store client abstraction
//!
//! This crate provides:
//! - The `LockStore` trait: atomic set-if-absent-with-TTL, compare-and-delete
//! - The `ExpirySweep` trait for backends without native TTL
//! - An in-memory backend with per-key atomicity and fault injection
//! - The transient-failure retry policy applied within a per-store budget

mod memory;
mod retry;

use std::time::Duration;

use async_trait::async_trait;

use candado_common::StoreError;

pub use memory::{MemoryLockStore, StoreEntry};
pub use retry::{RetryPolicy, retry_transient, with_budget};

/// Client for one independent remote key-value store.
///
/// Every operation must be a single atomic step at the store. A backend that
/// reads and then writes in two round-trips cannot implement this trait
/// correctly: the quorum arithmetic upstream relies on each store deciding
/// ownership atomically.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `token` under `key` only if `key` is absent or its current
    /// entry has expired. Re-setting with the token already stored extends
    /// the TTL. Returns `false` when a live, different token occupies the key.
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if its current value equals `token`. Returns `false`
    /// when the key is absent, expired, or owned by a different token.
    async fn compare_delete(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    /// Current token stored under `key`, if any live entry exists.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Storage-reclamation hook for backends whose TTL is not evaluated natively.
///
/// Sweeping is hygiene only. The quorum and lease logic never depend on it:
/// an expired entry is treated as absent whether or not it has been swept.
#[async_trait]
pub trait ExpirySweep: Send + Sync {
    /// Remove entries whose recorded expiry is in the past. No token check
    /// is needed: an expired entry can never legitimately be owned.
    async fn sweep_expired(&self) -> usize;

    /// Number of live entries currently stored.
    async fn live_entries(&self) -> usize;
}
