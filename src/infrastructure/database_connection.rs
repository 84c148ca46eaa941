// Database connection and pool management
// SQLite via sqlx; schema is created in place by `migrate()`

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {:?}", parent))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_items_sql = r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                name_en TEXT,
                group_code TEXT,
                group_name TEXT,
                category_code TEXT,
                category_name TEXT,
                image_url TEXT,
                image_url_01 TEXT,
                image_url_02 TEXT,
                image_url_03 TEXT,
                badge_code TEXT,
                badge_name TEXT,
                sort_order INTEGER,
                display_no TEXT,
                local_image_path TEXT,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;

        let create_options_sql = r#"
            CREATE TABLE IF NOT EXISTS catalog_item_options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_code TEXT NOT NULL,
                temperature_code TEXT NOT NULL,
                temperature_name TEXT NOT NULL,
                size_code TEXT NOT NULL,
                size_name TEXT,
                size_group_code TEXT,
                variant_code TEXT,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;

        // 분산 락: 만료 시각이 지난 행은 다른 holder가 덮어쓸 수 있다
        let create_locks_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_locks (
                name TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
        "#;

        let create_progress_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_progress (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
        "#;

        let create_indexes = [
            "CREATE INDEX IF NOT EXISTS idx_catalog_items_deleted ON catalog_items (deleted)",
            "CREATE INDEX IF NOT EXISTS idx_catalog_items_sort_order ON catalog_items (sort_order)",
            "CREATE INDEX IF NOT EXISTS idx_catalog_item_options_item_code ON catalog_item_options (item_code)",
        ];

        sqlx::query(create_items_sql).execute(&self.pool).await?;
        sqlx::query(create_options_sql).execute(&self.pool).await?;
        sqlx::query(create_locks_sql).execute(&self.pool).await?;
        sqlx::query(create_progress_sql).execute(&self.pool).await?;
        for sql in create_indexes {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("🗄️ Database schema is up to date");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_and_migration() -> Result<()> {
        // 임시 디렉토리에 중첩 경로로 생성
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("catalog.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        assert!(!db.pool().is_closed());

        db.migrate().await?;
        // 두 번 실행해도 안전해야 함
        db.migrate().await?;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await?;
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["catalog_item_options", "catalog_items", "sync_locks", "sync_progress"]
        );
        assert!(db_path.exists());
        Ok(())
    }
}
