//! Commands exposed to the trigger surface (CLI today, any transport tomorrow)

pub mod sync_commands;

pub use sync_commands::{InProgressResponse, SyncRunResponse, get_sync_status, is_sync_in_progress, run_sync};
