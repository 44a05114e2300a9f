//! Lease registry abstraction and in-memory backend
//!
//! Every operation is a single atomic conditional step at the backend.
//! Takeover is legal only against an absent or expired lease; renewal only
//! by the live owner. Two candidates racing the same expired lease must
//! resolve to exactly one winner inside the store, not in application code.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use candado_common::{StoreError, current_timestamp};
use candado_store::ExpirySweep;

use crate::model::{LeaseRecord, LeaseRequest};

/// Backing store for one lease record per named role
#[async_trait]
pub trait LeaseRegistry: Send + Sync {
    /// Take the role if the lease is absent, expired, or already ours.
    async fn try_acquire(&self, request: &LeaseRequest) -> Result<bool, StoreError>;

    /// Extend the lease, only while the requester owns it unexpired.
    async fn renew(&self, request: &LeaseRequest) -> Result<bool, StoreError>;

    /// Current live lease for the role, if any.
    async fn get(&self, role_id: &str) -> Result<Option<LeaseRecord>, StoreError>;

    /// Delete the lease, only if this owner holds it.
    async fn release(&self, role_id: &str, owner_id: &str) -> Result<bool, StoreError>;
}

/// In-memory `LeaseRegistry` backed by DashMap.
///
/// The per-key entry lock makes each conditional update a single atomic
/// step. The availability toggle injects store outages for testing the
/// elector's demotion path.
pub struct MemoryLeaseRegistry {
    leases: DashMap<String, LeaseRecord>,
    available: AtomicBool,
}

impl MemoryLeaseRegistry {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Mark the registry reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn connect(&self) -> Result<(), StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(
                "lease registry unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryLeaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseRegistry for MemoryLeaseRegistry {
    async fn try_acquire(&self, request: &LeaseRequest) -> Result<bool, StoreError> {
        self.connect()?;
        let now = current_timestamp();

        let taken = match self.leases.entry(request.role_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get();
                if record.is_expired() || record.owner_id == request.owner_id {
                    occupied.insert(LeaseRecord::new(request, now));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LeaseRecord::new(request, now));
                true
            }
        };

        if taken {
            debug!(role = %request.role_id, owner = %request.owner_id, "lease taken");
        }
        Ok(taken)
    }

    async fn renew(&self, request: &LeaseRequest) -> Result<bool, StoreError> {
        self.connect()?;
        let now = current_timestamp();

        let renewed = match self.leases.entry(request.role_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.owner_id == request.owner_id && !record.is_expired() {
                    record.lease_end = now + request.ttl_ms as i64;
                    record.heartbeat_interval_ms = request.heartbeat_interval_ms;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        Ok(renewed)
    }

    async fn get(&self, role_id: &str) -> Result<Option<LeaseRecord>, StoreError> {
        self.connect()?;
        Ok(self
            .leases
            .get(role_id)
            .filter(|record| !record.is_expired())
            .map(|record| record.clone()))
    }

    async fn release(&self, role_id: &str, owner_id: &str) -> Result<bool, StoreError> {
        self.connect()?;

        let released = match self.leases.entry(role_id.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().owner_id == owner_id {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if released {
            debug!(role = %role_id, owner = %owner_id, "lease released");
        }
        Ok(released)
    }
}

#[async_trait]
impl ExpirySweep for MemoryLeaseRegistry {
    async fn sweep_expired(&self) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, record| !record.is_expired());
        before - self.leases.len()
    }

    async fn live_entries(&self) -> usize {
        self.leases
            .iter()
            .filter(|record| !record.is_expired())
            .count()
    }
}
