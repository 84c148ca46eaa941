//! `CoordinationStore` implementations
//!
//! - `SqliteCoordinationStore`: lease rows in the shared database, so every
//!   instance pointed at the same file sees the same lock and progress record
//! - `InMemoryCoordinationStore`: process-local, for single instance runs and tests

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::repositories::CoordinationStore;
use crate::domain::sync_progress::ProgressSnapshot;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

pub struct SqliteCoordinationStore {
    pool: Arc<SqlitePool>,
}

impl SqliteCoordinationStore {
    pub const fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoordinationStore for SqliteCoordinationStore {
    async fn try_acquire_lock(&self, name: &str, holder: &str, lease: Duration) -> Result<bool> {
        // 만료된 락만 덮어쓴다; 살아있는 락이면 영향받은 행이 0
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO sync_locks (name, holder, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
            WHERE sync_locks.expires_at <= ?
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(expiry_millis(lease))
        .bind(now)
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to acquire lock {}", name))?;

        let acquired = result.rows_affected() == 1;
        debug!("🔒 Lock {} acquire by {}: {}", name, holder, acquired);
        Ok(acquired)
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_locks WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&*self.pool)
            .await
            .with_context(|| format!("Failed to release lock {}", name))?;
        Ok(())
    }

    async fn is_locked(&self, name: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_locks WHERE name = ? AND expires_at > ?")
                .bind(name)
                .bind(now_millis())
                .fetch_one(&*self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn put_progress(&self, snapshot: &ProgressSnapshot, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("Failed to serialize progress")?;
        sqlx::query(
            r#"
            INSERT INTO sync_progress (id, snapshot, expires_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET snapshot = excluded.snapshot, expires_at = excluded.expires_at
            "#,
        )
        .bind(json)
        .bind(expiry_millis(ttl))
        .execute(&*self.pool)
        .await
        .context("Failed to store progress")?;
        Ok(())
    }

    async fn get_progress(&self) -> Result<Option<ProgressSnapshot>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT snapshot FROM sync_progress WHERE id = 1 AND expires_at > ?")
                .bind(now_millis())
                .fetch_optional(&*self.pool)
                .await?;

        json.map(|json| serde_json::from_str(&json).context("Stored progress record is malformed"))
            .transpose()
    }

    async fn clear_progress(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_progress").execute(&*self.pool).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// Process-local store; leases and the progress TTL follow the tokio clock
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    locks: Mutex<HashMap<String, Lease>>,
    progress: Mutex<Option<(ProgressSnapshot, Instant)>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn try_acquire_lock(&self, name: &str, holder: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if locks.get(name).is_some_and(|l| l.expires_at > now) {
            return Ok(false);
        }
        locks.insert(
            name.to_string(),
            Lease { holder: holder.to_string(), expires_at: now + lease },
        );
        Ok(true)
    }

    async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        let mut locks = self.locks.lock().await;
        if locks.get(name).is_some_and(|l| l.holder == holder) {
            locks.remove(name);
        }
        Ok(())
    }

    async fn is_locked(&self, name: &str) -> Result<bool> {
        let locks = self.locks.lock().await;
        Ok(locks.get(name).is_some_and(|l| l.expires_at > Instant::now()))
    }

    async fn put_progress(&self, snapshot: &ProgressSnapshot, ttl: Duration) -> Result<()> {
        *self.progress.lock().await = Some((snapshot.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get_progress(&self) -> Result<Option<ProgressSnapshot>> {
        let progress = self.progress.lock().await;
        Ok(progress
            .as_ref()
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(snapshot, _)| snapshot.clone()))
    }

    async fn clear_progress(&self) -> Result<()> {
        *self.progress.lock().await = None;
        Ok(())
    }
}
