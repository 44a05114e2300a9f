//! Lease data model
//!
//! One record per named singleton role. At most one unexpired owner can
//! exist at any instant; the backing registry's atomic conditional update
//! enforces that, never application-level check-then-set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use candado_common::current_timestamp;

/// One lease row for a named role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Singleton role key, e.g. "scheduler-leader"
    pub role_id: String,
    /// Stable identifier of the holding process instance
    pub owner_id: String,
    /// When this owner first took the lease (Unix millis)
    pub lease_start: i64,
    /// Lease expiry (Unix millis); the role is free at and after this instant
    pub lease_end: i64,
    /// Renewal cadence the owner committed to
    pub heartbeat_interval_ms: u64,
}

impl LeaseRecord {
    pub fn new(request: &LeaseRequest, now: i64) -> Self {
        Self {
            role_id: request.role_id.clone(),
            owner_id: request.owner_id.clone(),
            lease_start: now,
            lease_end: now + request.ttl_ms as i64,
            heartbeat_interval_ms: request.heartbeat_interval_ms,
        }
    }

    pub fn is_expired(&self) -> bool {
        current_timestamp() >= self.lease_end
    }

    pub fn remaining_ms(&self) -> u64 {
        (self.lease_end - current_timestamp()).max(0) as u64
    }

    /// Expiry as a wall-clock timestamp, for logs and inspection.
    pub fn lease_end_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.lease_end)
    }
}

/// Parameters for one takeover or renewal attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub role_id: String,
    pub owner_id: String,
    pub ttl_ms: u64,
    pub heartbeat_interval_ms: u64,
}
