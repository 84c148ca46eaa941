//! Collaborator interfaces consumed by the sync coordinator
//!
//! Persistence, the cross-process coordination store, the vendor catalog and the
//! image store are all injected through these traits.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::catalog::{CatalogItem, OptionRecord, SizeOption};
use crate::domain::sync_progress::ProgressSnapshot;

/// Outcome of a bulk upsert keyed by external code
#[derive(Debug, Clone, Default)]
pub struct UpsertSummary {
    pub inserted: u32,
    pub updated: u32,
    /// Persisted state of every upserted item, in feed order
    pub items: Vec<CatalogItem>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert new codes and update known ones in place, in one transaction.
    /// A code repeated in `items` is stored once, from its last entry.
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<UpsertSummary>;

    /// Bulk update of `(code, local_image_path)` pairs, in one transaction
    async fn save_local_image_paths(&self, paths: &[(String, String)]) -> Result<u64>;

    /// Remove every option row; returns the number of rows removed
    async fn delete_all_options(&self) -> Result<u64>;

    /// Bulk insert, in one transaction
    async fn insert_options(&self, options: &[OptionRecord]) -> Result<u64>;

    async fn find_item(&self, code: &str) -> Result<Option<CatalogItem>>;
    async fn find_options(&self, item_code: &str) -> Result<Vec<OptionRecord>>;
    async fn list_active_items(&self) -> Result<Vec<CatalogItem>>;
    async fn count_items(&self) -> Result<u64>;
    async fn count_options(&self) -> Result<u64>;
}

/// Shared store for the sync lease and the published progress record
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Non-blocking: returns `false` immediately when a live lease exists
    async fn try_acquire_lock(&self, name: &str, holder: &str, lease: Duration) -> Result<bool>;

    /// No-op when the lease is absent or owned by another holder
    async fn release_lock(&self, name: &str, holder: &str) -> Result<()>;

    async fn is_locked(&self, name: &str) -> Result<bool>;

    /// Overwrites the stored snapshot (last write wins)
    async fn put_progress(&self, snapshot: &ProgressSnapshot, ttl: Duration) -> Result<()>;

    /// `None` when nothing was published or the record expired
    async fn get_progress(&self) -> Result<Option<ProgressSnapshot>>;

    async fn clear_progress(&self) -> Result<()>;

    /// Snapshot for observers: the stored record, else a Running placeholder
    /// while `lock_name` is held, else Idle.
    async fn current_progress(&self, lock_name: &str) -> ProgressSnapshot {
        match self.get_progress().await {
            Ok(Some(snapshot)) => return snapshot,
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to read sync progress: {:#}", e),
        }
        match self.is_locked(lock_name).await {
            Ok(true) => ProgressSnapshot::running_placeholder(),
            Ok(false) => ProgressSnapshot::idle(),
            Err(e) => {
                tracing::error!("Failed to read sync lock state: {:#}", e);
                ProgressSnapshot::idle()
            }
        }
    }
}

/// Remote vendor catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Errors on transport failure or a non-success HTTP status; an unusable
    /// payload yields an empty list instead.
    async fn fetch_list(&self) -> Result<Vec<CatalogItem>>;

    /// Distinct temperature codes for an item in first-seen order; empty on any failure
    async fn fetch_temperature_options(&self, item_code: &str) -> Vec<String>;

    /// Size list for one temperature of an item; empty on any failure
    async fn fetch_size_options(&self, item_code: &str, temperature_code: &str) -> Vec<SizeOption>;
}

/// Local image persistence
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Download and store one image, returning the web-relative local path.
    /// `None` on any network or I/O failure.
    async fn download_and_store(&self, item_code: &str, remote_url: &str) -> Option<String>;
}
