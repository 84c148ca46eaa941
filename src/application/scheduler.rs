//! Daily trigger for the catalog sync

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::sync_coordinator::SyncCoordinator;
use crate::domain::sync_result::SyncError;
use crate::infrastructure::config::ScheduleConfig;

/// Fires once a day at a fixed wall-clock time in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32, utc_offset_hours: i32) -> Result<Self> {
        let at = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("Invalid schedule time {:02}:{:02}", hour, minute))?;
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("Invalid UTC offset {}h", utc_offset_hours))?;
        Ok(Self { at, offset })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(config.hour, config.minute, config.utc_offset_hours)
    }

    /// First trigger instant strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.offset);
        let mut date = local_now.date_naive();
        loop {
            // 고정 오프셋이라 항상 단일 시각으로 해석된다
            if let Some(candidate) = self.offset.from_local_datetime(&date.and_time(self.at)).single() {
                let candidate = candidate.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
            }
            date += ChronoDuration::days(1);
        }
    }
}

/// Sleep until each trigger instant and run the sync, until `shutdown` is cancelled
pub async fn run_daily(coordinator: Arc<SyncCoordinator>, schedule: DailySchedule, shutdown: CancellationToken) {
    loop {
        let next = schedule.next_run_after(Utc::now());
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!("⏰ Next catalog sync at {} (in {}s)", next.with_timezone(&schedule.offset), wait.as_secs());

        tokio::select! {
            () = shutdown.cancelled() => {
                info!("🛑 Scheduler stopped");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        info!("⏰ Scheduled catalog sync starting");
        match coordinator.run().await {
            Ok(result) => info!("⏰ Scheduled sync finished: {}", result.summary_message()),
            Err(SyncError::AlreadyInProgress) => {
                info!("⏰ Scheduled sync skipped, another instance is already syncing");
            }
            Err(e) => error!("⏰ Scheduled sync failed: {}", e),
        }
    }
}
