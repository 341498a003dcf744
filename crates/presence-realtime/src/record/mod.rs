//! Local presence records and the store that merges events into them.

pub mod entry;
pub mod store;

pub use entry::{MergeOutcome, PresenceRecord};
pub use store::PresenceRecordStore;
