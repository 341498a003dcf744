//! # presence-store
//!
//! Persistent presence store implementations. Supports two modes:
//!
//! - **memory**: in-process store on a [dashmap](https://crates.io/crates/dashmap),
//!   for single-node deployments and tests
//! - **redis**: one Redis hash per user using the [redis](https://crates.io/crates/redis) crate
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::StoreManager;
