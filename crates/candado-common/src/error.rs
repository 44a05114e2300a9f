//! Error types for Candado
//!
//! This module defines:
//! - `StoreError`: failures of a single backing store operation
//! - `LockError`: the caller-facing taxonomy for quorum lock acquisition

use serde::{Deserialize, Serialize};

/// Failure of a single store operation.
///
/// A `Timeout` means the outcome is unknown: the remote operation may have
/// succeeded after the client gave up. Callers must not count a timed-out
/// `try_set` as "not acquired" without issuing cleanup for it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the remote operation may have taken effect despite the error.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, StoreError::Timeout)
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Connection(_))
    }
}

/// Caller-facing errors for quorum lock acquisition.
///
/// All variants are recoverable: callers should retry with backoff or treat
/// the resource as busy. Nothing in this taxonomy is fatal to the process.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Fewer than a majority of stores accepted the token.
    #[error("quorum not reached: {granted} of {total} stores granted, need {needed}")]
    QuorumNotReached {
        granted: usize,
        needed: usize,
        total: usize,
    },

    /// Quorum was reached but elapsed time plus drift consumed the TTL.
    /// Callers should prefer a larger TTL relative to expected latency.
    #[error("lock validity expired: {elapsed_ms}ms elapsed against a {ttl_ms}ms ttl")]
    ValidityExpired { ttl_ms: u64, elapsed_ms: u64 },

    /// No store could be reached within its timeout after retries.
    #[error("no store reachable: {0}")]
    StoreUnavailable(String),
}

/// Error code structure for surfacing lock results over an API layer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const QUORUM_NOT_REACHED: ErrorCode<'static> = ErrorCode {
    code: 42001,
    message: "quorum not reached",
};

pub const VALIDITY_EXPIRED: ErrorCode<'static> = ErrorCode {
    code: 42002,
    message: "lock validity expired",
};

pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 42003,
    message: "store unavailable",
};

impl LockError {
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            LockError::QuorumNotReached { .. } => QUORUM_NOT_REACHED,
            LockError::ValidityExpired { .. } => VALIDITY_EXPIRED,
            LockError::StoreUnavailable(_) => STORE_UNAVAILABLE,
        }
    }
}
