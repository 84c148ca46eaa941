//! Run outcome types returned by the sync coordinator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Counters of one completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Items received from the feed and persisted
    pub item_count: u32,
    pub inserted_count: u32,
    pub updated_count: u32,
    /// Images downloaded and stored locally
    pub image_count: u32,
    pub image_failed_count: u32,
    /// Option rows written
    pub option_count: u32,
    /// Items whose option discovery failed outright
    pub option_failed_count: u32,
    pub elapsed_ms: u64,
}

impl SyncResult {
    pub fn summary_message(&self) -> String {
        format!(
            "Sync completed! Menus: {} (new: {}, updated: {}), images: {}, options: {}, elapsed: {:.1}s",
            self.item_count,
            self.inserted_count,
            self.updated_count,
            self.image_count,
            self.option_count,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

/// Run-level failures. Per-item failures never surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another caller holds the sync lock; nothing was started
    #[error("catalog sync is already in progress, try again shortly")]
    AlreadyInProgress,

    /// The catalog list produced nothing usable; later stages were skipped
    #[error("catalog sync aborted: {0}")]
    Aborted(String),

    #[error("catalog sync failed: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl SyncError {
    /// Stable code for callers that render errors
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress => "SYNC_IN_PROGRESS",
            Self::Aborted(_) => "SYNC_ABORTED",
            Self::Unexpected(_) => "SYNC_FAILED",
        }
    }

    /// Message stored in the Failed snapshot
    pub fn failure_message(&self) -> String {
        match self {
            Self::AlreadyInProgress => self.to_string(),
            Self::Aborted(message) => message.clone(),
            Self::Unexpected(error) => format!("{error:#}"),
        }
    }
}
