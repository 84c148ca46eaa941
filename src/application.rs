//! Application layer module
//!
//! Use cases that orchestrate the domain: the sync coordinator and its
//! daily trigger.

pub mod scheduler;
pub mod sync_coordinator;

pub use scheduler::{DailySchedule, run_daily};
pub use sync_coordinator::SyncCoordinator;
