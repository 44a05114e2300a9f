//! Candado Quorum - Redlock-style distributed mutual exclusion
//!
//! This crate provides:
//! - The quorum lock coordinator (majority acquisition across N stores)
//! - Clock-drift compensated validity computation
//! - Best-effort token-gated release and extension
//! - The background expiry reaper for backends without native TTL

pub mod config;
pub mod coordinator;
pub mod model;
pub mod reaper;

pub use config::{QuorumConfig, ReaperConfig};
pub use coordinator::QuorumLockCoordinator;
pub use model::{AcquiredLock, LockHandle};
pub use reaper::ExpiryReaper;
