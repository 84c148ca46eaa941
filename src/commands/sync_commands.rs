//! Sync trigger surface: manual run, progress snapshot, in-progress check
//!
//! Responses are plain serializable structs so any transport (CLI, HTTP, IPC)
//! can render them. A concurrent trigger maps to a conflict (409), distinct
//! from run failures (500).

use serde::Serialize;
use tracing::error;

use crate::application::sync_coordinator::SyncCoordinator;
use crate::domain::sync_progress::ProgressSnapshot;
use crate::domain::sync_result::{SyncError, SyncResult};

/// Outcome of `run_sync`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResponse {
    pub success: bool,
    /// `SYNC_IN_PROGRESS`, `SYNC_ABORTED` or `SYNC_FAILED` when unsuccessful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
}

impl SyncRunResponse {
    pub fn completed(result: SyncResult) -> Self {
        Self {
            success: true,
            error: None,
            message: result.summary_message(),
            result: Some(result),
        }
    }

    pub fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(error.code()),
            message: error.to_string(),
            result: None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.error == Some(SyncError::AlreadyInProgress.code())
    }

    /// HTTP-style status for transports that need one
    pub fn status_code(&self) -> u16 {
        if self.success {
            200
        } else if self.is_conflict() {
            409
        } else {
            500
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressResponse {
    pub in_progress: bool,
}

/// Trigger a run and wait for it to finish
pub async fn run_sync(coordinator: &SyncCoordinator) -> SyncRunResponse {
    match coordinator.run().await {
        Ok(result) => SyncRunResponse::completed(result),
        Err(e) => SyncRunResponse::failed(&e),
    }
}

/// Current progress snapshot (Idle when nothing is published)
pub async fn get_sync_status(coordinator: &SyncCoordinator) -> ProgressSnapshot {
    coordinator.progress().await
}

/// Whether any instance currently holds the sync lease
pub async fn is_sync_in_progress(coordinator: &SyncCoordinator) -> InProgressResponse {
    let in_progress = coordinator.is_in_progress().await.unwrap_or_else(|e| {
        error!("Failed to read sync lock state: {:#}", e);
        false
    });
    InProgressResponse { in_progress }
}
