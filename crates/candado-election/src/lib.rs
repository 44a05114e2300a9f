//! Candado Election - lease-based leader election
//!
//! This crate provides:
//! - The lease record model (one row per named singleton role)
//! - The `LeaseRegistry` trait with atomic conditional takeover and renewal
//! - An in-memory registry backend
//! - The `LeaderElector` renewal loop with immediate demotion on failure

pub mod elector;
pub mod model;
pub mod registry;

pub use elector::{ElectionConfig, LeaderElector};
pub use model::{LeaseRecord, LeaseRequest};
pub use registry::{LeaseRegistry, MemoryLeaseRegistry};
