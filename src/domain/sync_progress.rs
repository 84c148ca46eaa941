//! Sync progress state machine
//!
//! `ProgressSnapshot` is the record published to the coordination store for
//! external polling. `ProgressTracker` owns one run's snapshot and enforces the
//! run invariants:
//! - status moves `Idle → Running → {Completed, Failed}`
//! - stages only move forward (`None → ListSync → ImageDownload → OptionClear → OptionSync`)
//! - overall progress never decreases and only reaches 100 on completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::sync_result::SyncResult;

/// Highest overall percentage a run may report before it is completed
const MAX_RUNNING_PERCENT: u32 = 99;

/// Overall run status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Pipeline stage, declared in execution order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStage {
    #[default]
    None,
    ListSync,
    ImageDownload,
    OptionClear,
    OptionSync,
}

impl SyncStage {
    /// Overall percentage at which the stage starts
    pub const fn base_percent(self) -> u32 {
        match self {
            Self::None | Self::ListSync => 0,
            Self::ImageDownload => 10,
            Self::OptionClear => 50,
            Self::OptionSync => 55,
        }
    }

    /// Share of the overall percentage covered by the stage
    pub const fn weight_percent(self) -> u32 {
        match self {
            Self::None => 0,
            Self::ListSync => 10,
            Self::ImageDownload => 40,
            Self::OptionClear => 5,
            Self::OptionSync => 45,
        }
    }

    /// Overall percentage for `processed` of `total` items in this stage.
    /// An empty stage counts as finished.
    pub const fn overall_percent(self, processed: u32, total: u32) -> u32 {
        if total == 0 {
            return self.base_percent() + self.weight_percent();
        }
        let processed = if processed > total { total } else { processed };
        let within = self.weight_percent() as u64 * processed as u64 / total as u64;
        self.base_percent() + within as u32
    }

    pub fn label(self, processed: u32, total: u32) -> String {
        match self {
            Self::None => "Waiting".to_string(),
            Self::ListSync => "Syncing menu list".to_string(),
            Self::ImageDownload => format!("Downloading images ({processed}/{total})"),
            Self::OptionClear => "Clearing options".to_string(),
            Self::OptionSync => format!("Syncing options ({processed}/{total})"),
        }
    }
}

/// Status record published for external observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub status: SyncStatus,
    pub current_stage: SyncStage,
    pub stage_label: String,

    /// Overall progress (0-100)
    pub overall_progress: u32,

    /// Current stage detail
    pub stage_progress: u32,
    pub processed_count: u32,
    pub total_count: u32,

    /// Result counters
    pub item_count: u32,
    pub inserted_count: u32,
    pub updated_count: u32,
    pub image_count: u32,
    pub option_count: u32,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,

    /// Set only when `status` is `Failed`
    pub error_message: Option<String>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

impl ProgressSnapshot {
    /// Resting state, reported when no run has published anything
    pub fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            current_stage: SyncStage::None,
            stage_label: SyncStage::None.label(0, 0),
            overall_progress: 0,
            stage_progress: 0,
            processed_count: 0,
            total_count: 0,
            item_count: 0,
            inserted_count: 0,
            updated_count: 0,
            image_count: 0,
            option_count: 0,
            started_at: None,
            completed_at: None,
            elapsed_ms: 0,
            error_message: None,
        }
    }

    /// Reported when the lock is held but no progress record is readable
    pub fn running_placeholder() -> Self {
        Self {
            status: SyncStatus::Running,
            stage_label: "Sync in progress".to_string(),
            ..Self::idle()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("stage cannot move backwards from {from:?} to {to:?}")]
    StageRegression { from: SyncStage, to: SyncStage },

    #[error("progress can only change while a run is active (status: {0:?})")]
    NotRunning(SyncStatus),
}

/// Owns the snapshot of a single run; mutated only by the coordinator
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Enter `Running`, discarding everything left over from a previous run
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.snapshot = ProgressSnapshot {
            status: SyncStatus::Running,
            stage_label: "Starting sync".to_string(),
            started_at: Some(now),
            ..ProgressSnapshot::idle()
        };
    }

    /// Record `processed` of `total` items done in `stage`
    pub fn advance(&mut self, stage: SyncStage, processed: u32, total: u32) -> Result<(), ProgressError> {
        self.ensure_running()?;
        let current = self.snapshot.current_stage;
        if stage < current {
            return Err(ProgressError::StageRegression { from: current, to: stage });
        }

        let mut processed = processed.min(total);
        if stage == current {
            processed = processed.max(self.snapshot.processed_count.min(total));
        }

        let snapshot = &mut self.snapshot;
        snapshot.current_stage = stage;
        snapshot.processed_count = processed;
        snapshot.total_count = total;
        snapshot.stage_progress = if total == 0 {
            100
        } else {
            u32::try_from(u64::from(processed) * 100 / u64::from(total)).unwrap_or(100)
        };
        snapshot.overall_progress = stage
            .overall_percent(processed, total)
            .min(MAX_RUNNING_PERCENT)
            .max(snapshot.overall_progress);
        snapshot.stage_label = stage.label(processed, total);
        Ok(())
    }

    /// Copy the result counters gathered so far into the snapshot
    pub fn record_counts(&mut self, result: &SyncResult) {
        let snapshot = &mut self.snapshot;
        snapshot.item_count = result.item_count;
        snapshot.inserted_count = result.inserted_count;
        snapshot.updated_count = result.updated_count;
        snapshot.image_count = result.image_count;
        snapshot.option_count = result.option_count;
    }

    pub fn complete(&mut self, result: &SyncResult, now: DateTime<Utc>) -> Result<(), ProgressError> {
        self.ensure_running()?;
        self.record_counts(result);
        self.snapshot.status = SyncStatus::Completed;
        self.snapshot.overall_progress = 100;
        self.snapshot.stage_label = "Sync completed".to_string();
        self.finish_timing(now);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), ProgressError> {
        self.ensure_running()?;
        self.snapshot.status = SyncStatus::Failed;
        self.snapshot.stage_label = "Sync failed".to_string();
        self.snapshot.error_message = Some(message.into());
        self.finish_timing(now);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), ProgressError> {
        match self.snapshot.status {
            SyncStatus::Running => Ok(()),
            other => Err(ProgressError::NotRunning(other)),
        }
    }

    fn finish_timing(&mut self, now: DateTime<Utc>) {
        self.snapshot.completed_at = Some(now);
        if let Some(started) = self.snapshot.started_at {
            self.snapshot.elapsed_ms = u64::try_from((now - started).num_milliseconds()).unwrap_or(0);
        }
    }
}
