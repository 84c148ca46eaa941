//! Domain module - Catalog entities, sync state, and collaborator interfaces
//!
//! This module contains the types the sync engine reasons about and the
//! traits through which it reaches persistence and remote systems.

pub mod catalog;
pub mod repositories;
pub mod sync_progress;
pub mod sync_result;

// Re-export commonly used items
pub use catalog::{CatalogItem, OptionRecord, SizeOption};
pub use repositories::{CatalogRepository, CatalogSource, CoordinationStore, ImageStore, UpsertSummary};
pub use sync_progress::{ProgressSnapshot, ProgressTracker, SyncStage, SyncStatus};
pub use sync_result::{SyncError, SyncResult};
