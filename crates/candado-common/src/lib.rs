//! Candado Common - shared error types and utilities
//!
//! This crate provides:
//! - The store-level and lock-level error taxonomies
//! - Wall-clock timestamp and random ownership-token helpers

pub mod error;
pub mod utils;

pub use error::{ErrorCode, LockError, StoreError};
pub use utils::{current_timestamp, generate_token};
