//! Tier bookkeeping and background migration

pub mod access;
pub mod scheduler;

pub use access::AccessTracker;
pub use scheduler::{MigrationFailure, MigrationReport, MigrationScheduler, SchedulerHandle};
