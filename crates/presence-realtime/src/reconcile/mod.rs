//! Drift correction against the persistent store.

pub mod interest;
pub mod scheduler;

pub use interest::InterestSet;
pub use scheduler::{ReconcileReport, ReconcileTrigger, ReconciliationScheduler, StoreRead};
