//! Catalog sync coordinator
//!
//! One run holds the shared sync lease and drives four strictly ordered stages:
//! 1. List sync: fetch the vendor list and upsert it by external code
//! 2. Images: bounded fan-out of downloads over every item (items without an
//!    image URL count as processed), then one bulk path update
//! 3. Option purge: delete every option row
//! 4. Options: bounded fan-out of temperature/size discovery, then one bulk insert
//!
//! Fan-out tasks return outcome values. This loop is the only place that
//! aggregates them and the only publisher of progress, so the published
//! processed count never moves backwards within a run.

#![allow(clippy::uninlined_format_args)]

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::catalog::{CatalogItem, OptionRecord, build_option_records};
use crate::domain::repositories::{CatalogRepository, CatalogSource, CoordinationStore, ImageStore};
use crate::domain::sync_progress::{ProgressSnapshot, ProgressTracker, SyncStage};
use crate::domain::sync_result::{SyncError, SyncResult};
use crate::infrastructure::config::SyncConfig;

/// Result of one image task
#[derive(Debug)]
enum ImageOutcome {
    Stored { code: String, local_path: String },
    Failed { code: String },
    NoImage,
}

/// Result of one option discovery task
#[derive(Debug)]
enum OptionOutcome {
    Discovered { code: String, records: Vec<OptionRecord> },
    NoTemperatures { code: String },
}

pub struct SyncCoordinator {
    repository: Arc<dyn CatalogRepository>,
    store: Arc<dyn CoordinationStore>,
    source: Arc<dyn CatalogSource>,
    images: Arc<dyn ImageStore>,
    config: SyncConfig,
}

impl SyncCoordinator {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        store: Arc<dyn CoordinationStore>,
        source: Arc<dyn CatalogSource>,
        images: Arc<dyn ImageStore>,
        config: SyncConfig,
    ) -> Self {
        Self { repository, store, source, images, config }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Snapshot for observers: stored record, Running placeholder while locked, or Idle
    pub async fn progress(&self) -> ProgressSnapshot {
        self.store.current_progress(&self.config.lock_name).await
    }

    pub async fn is_in_progress(&self) -> anyhow::Result<bool> {
        self.store.is_locked(&self.config.lock_name).await
    }

    /// Execute one full sync run.
    ///
    /// Returns `AlreadyInProgress` without touching anything when another caller
    /// holds the lease. Once acquired, the lease is released on every exit path,
    /// including a panic inside the run.
    pub async fn run(&self) -> Result<SyncResult, SyncError> {
        let lock_name = self.config.lock_name.as_str();
        let holder = Uuid::new_v4().to_string();

        let acquired = self
            .store
            .try_acquire_lock(lock_name, &holder, self.config.lock_lease())
            .await
            .context("Failed to reach the coordination store")?;
        if !acquired {
            info!("⏳ Catalog sync already in progress, skipping");
            return Err(SyncError::AlreadyInProgress);
        }

        info!("🚀 Catalog sync started (holder: {})", holder);
        let started = Instant::now();
        let mut tracker = ProgressTracker::new();

        let outcome = match AssertUnwindSafe(self.execute(&mut tracker, started))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(SyncError::Unexpected(anyhow!(
                "sync run panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let finished = match &outcome {
            Ok(result) => {
                info!("✅ {}", result.summary_message());
                tracker.complete(result, Utc::now())
            }
            Err(e) => {
                error!("❌ Catalog sync failed: {}", e);
                tracker.fail(e.failure_message(), Utc::now())
            }
        };
        if let Err(e) = finished {
            warn!("Could not record final sync status: {}", e);
        }
        self.publish(&tracker).await;

        if let Err(e) = self.store.release_lock(lock_name, &holder).await {
            error!("Failed to release sync lock {} (expires with its lease): {:#}", lock_name, e);
        }

        outcome
    }

    async fn execute(&self, tracker: &mut ProgressTracker, started: Instant) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult::default();
        tracker.start(Utc::now());

        // 1단계: 메뉴 목록 동기화
        advance(tracker, SyncStage::ListSync, 0, 1)?;
        self.publish(tracker).await;

        let feed = match self.source.fetch_list().await {
            Ok(feed) => feed,
            Err(e) => return Err(SyncError::Aborted(format!("menu list is unreachable: {:#}", e))),
        };
        if feed.is_empty() {
            return Err(SyncError::Aborted("menu list is empty".to_string()));
        }

        let upserted = self
            .repository
            .upsert_items(&feed)
            .await
            .context("Failed to upsert menu list")?;
        result.item_count = count(upserted.items.len());
        result.inserted_count = upserted.inserted;
        result.updated_count = upserted.updated;
        info!(
            "📋 Stage 1: {} menus (new: {}, updated: {})",
            result.item_count, result.inserted_count, result.updated_count
        );

        advance(tracker, SyncStage::ListSync, 1, 1)?;
        tracker.record_counts(&result);
        self.publish(tracker).await;

        let items = upserted.items;

        // 2단계: 이미지 다운로드
        self.sync_images(tracker, &items, &mut result).await?;

        // 3단계: 기존 옵션 삭제
        advance(tracker, SyncStage::OptionClear, 0, 1)?;
        self.publish(tracker).await;
        let purged = self
            .repository
            .delete_all_options()
            .await
            .context("Failed to purge options")?;
        info!("🧹 Stage 3: purged {} option rows", purged);
        advance(tracker, SyncStage::OptionClear, 1, 1)?;
        self.publish(tracker).await;

        // 4단계: 옵션 동기화
        self.sync_options(tracker, &items, &mut result).await?;

        result.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(result)
    }

    async fn sync_images(
        &self,
        tracker: &mut ProgressTracker,
        items: &[CatalogItem],
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        // 이미지 URL이 없는 메뉴도 진행률 분모에 포함
        let targets: Vec<(String, Option<String>)> = items
            .iter()
            .map(|item| (item.code.clone(), item.preferred_image_url().map(str::to_string)))
            .collect();

        let images = Arc::clone(&self.images);
        let mut stored_paths: Vec<(String, String)> = Vec::new();
        let mut failed = 0u32;
        let mut skipped = 0u32;

        self.fan_out(
            tracker,
            SyncStage::ImageDownload,
            targets,
            move |(code, url)| {
                let images = Arc::clone(&images);
                async move {
                    let Some(url) = url else {
                        return ImageOutcome::NoImage;
                    };
                    match images.download_and_store(&code, &url).await {
                        Some(local_path) => ImageOutcome::Stored { code, local_path },
                        None => ImageOutcome::Failed { code },
                    }
                }
            },
            |outcome| match outcome {
                Some(ImageOutcome::Stored { code, local_path }) => stored_paths.push((code, local_path)),
                Some(ImageOutcome::Failed { code }) => {
                    warn!("🖼️ Image download failed for menu {}", code);
                    failed += 1;
                }
                Some(ImageOutcome::NoImage) => skipped += 1,
                None => failed += 1,
            },
        )
        .await?;

        if skipped > 0 {
            info!("{} menus have no image URL", skipped);
        }
        self.repository
            .save_local_image_paths(&stored_paths)
            .await
            .context("Failed to save local image paths")?;

        result.image_count = count(stored_paths.len());
        result.image_failed_count = failed;
        info!("🖼️ Stage 2: {} images stored, {} failed", result.image_count, failed);
        tracker.record_counts(result);
        self.publish(tracker).await;
        Ok(())
    }

    async fn sync_options(
        &self,
        tracker: &mut ProgressTracker,
        items: &[CatalogItem],
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        let codes: Vec<String> = items.iter().map(|item| item.code.clone()).collect();
        let source = Arc::clone(&self.source);
        let mut records: Vec<OptionRecord> = Vec::new();
        let mut failed = 0u32;

        self.fan_out(
            tracker,
            SyncStage::OptionSync,
            codes,
            move |code| {
                let source = Arc::clone(&source);
                async move {
                    let temperatures = source.fetch_temperature_options(&code).await;
                    if temperatures.is_empty() {
                        return OptionOutcome::NoTemperatures { code };
                    }
                    let mut sizes_by_temperature = Vec::with_capacity(temperatures.len());
                    for temperature in temperatures {
                        let sizes = source.fetch_size_options(&code, &temperature).await;
                        sizes_by_temperature.push((temperature, sizes));
                    }
                    let records = build_option_records(&code, &sizes_by_temperature, Utc::now());
                    OptionOutcome::Discovered { code, records }
                }
            },
            |outcome| match outcome {
                Some(OptionOutcome::Discovered { code, records: found }) => {
                    debug!("Menu {} has {} options", code, found.len());
                    records.extend(found);
                }
                Some(OptionOutcome::NoTemperatures { code }) => {
                    debug!("Menu {} has no temperature options", code);
                }
                None => failed += 1,
            },
        )
        .await?;

        let inserted = self
            .repository
            .insert_options(&records)
            .await
            .context("Failed to insert options")?;

        result.option_count = u32::try_from(inserted).unwrap_or(u32::MAX);
        result.option_failed_count = failed;
        info!("⚙️ Stage 4: {} options saved, {} menus failed", result.option_count, failed);
        tracker.record_counts(result);
        Ok(())
    }

    /// Run `task` for every input with at most `worker_pool_width` in flight.
    ///
    /// Outcomes reach `on_outcome` in completion order; `None` marks a task that
    /// panicked. Progress is published every `progress_publish_interval`
    /// completions and on the last one.
    async fn fan_out<T, O, F, Fut>(
        &self,
        tracker: &mut ProgressTracker,
        stage: SyncStage,
        inputs: Vec<T>,
        task: F,
        mut on_outcome: impl FnMut(Option<O>),
    ) -> Result<(), SyncError>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = O> + Send + 'static,
    {
        let total = count(inputs.len());
        advance(tracker, stage, 0, total)?;
        self.publish(tracker).await;
        if total == 0 {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_width.max(1)));
        let mut join_set = JoinSet::new();
        for input in inputs {
            let semaphore = Arc::clone(&semaphore);
            let work = task(input);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow!("worker pool closed: {}", e))?;
                Ok::<O, anyhow::Error>(work.await)
            });
        }

        let interval = self.config.progress_publish_interval.max(1);
        let mut processed = 0u32;
        while let Some(joined) = join_set.join_next().await {
            processed += 1;
            match joined {
                Ok(Ok(outcome)) => on_outcome(Some(outcome)),
                Ok(Err(e)) => return Err(SyncError::Unexpected(e)),
                Err(e) => {
                    error!("{:?} task failed: {}", stage, e);
                    on_outcome(None);
                }
            }

            if processed % interval == 0 || processed == total {
                advance(tracker, stage, processed, total)?;
                self.publish(tracker).await;
            }
        }
        Ok(())
    }

    /// Progress publication is best effort; a store hiccup never fails the run
    async fn publish(&self, tracker: &ProgressTracker) {
        if let Err(e) = self
            .store
            .put_progress(tracker.snapshot(), self.config.progress_ttl())
            .await
        {
            warn!("Failed to publish sync progress: {:#}", e);
        }
    }
}

fn advance(tracker: &mut ProgressTracker, stage: SyncStage, processed: u32, total: u32) -> Result<(), SyncError> {
    tracker
        .advance(stage, processed, total)
        .map_err(|e| SyncError::Unexpected(e.into()))
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
