//! In-memory presence store.

pub mod store;

pub use store::MemoryPresenceStore;
