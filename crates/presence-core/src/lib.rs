//! # presence-core
//!
//! Core crate for the presence subsystem. Contains configuration schemas,
//! the user identifier and presence event types, the seam traits for the
//! broadcast channel, the persistent store and the clock, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other presence crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
