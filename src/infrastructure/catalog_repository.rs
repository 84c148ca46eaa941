//! SQLite implementation of `CatalogRepository`
//!
//! Each bulk operation runs in its own transaction. The coordinator calls them
//! once per stage, which yields per-stage commit boundaries.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::domain::catalog::{CatalogItem, OptionRecord, dedupe_by_code};
use crate::domain::repositories::{CatalogRepository, UpsertSummary};

const ITEM_COLUMNS: &str = "id, code, name, name_en, group_code, group_name, category_code, category_name, \
     image_url, image_url_01, image_url_02, image_url_03, badge_code, badge_name, sort_order, \
     display_no, local_image_path, deleted, created_at, updated_at";

const OPTION_COLUMNS: &str = "id, item_code, temperature_code, temperature_name, size_code, size_name, \
     size_group_code, variant_code, deleted, created_at, updated_at";

pub struct SqliteCatalogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogRepository {
    pub const fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: &SqliteRow) -> sqlx::Result<CatalogItem> {
    Ok(CatalogItem {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        name_en: row.try_get("name_en")?,
        group_code: row.try_get("group_code")?,
        group_name: row.try_get("group_name")?,
        category_code: row.try_get("category_code")?,
        category_name: row.try_get("category_name")?,
        image_url: row.try_get("image_url")?,
        image_url_01: row.try_get("image_url_01")?,
        image_url_02: row.try_get("image_url_02")?,
        image_url_03: row.try_get("image_url_03")?,
        badge_code: row.try_get("badge_code")?,
        badge_name: row.try_get("badge_name")?,
        sort_order: row.try_get("sort_order")?,
        display_no: row.try_get("display_no")?,
        local_image_path: row.try_get("local_image_path")?,
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_option(row: &SqliteRow) -> sqlx::Result<OptionRecord> {
    Ok(OptionRecord {
        id: row.try_get("id")?,
        item_code: row.try_get("item_code")?,
        temperature_code: row.try_get("temperature_code")?,
        temperature_name: row.try_get("temperature_name")?,
        size_code: row.try_get("size_code")?,
        size_name: row.try_get("size_name")?,
        size_group_code: row.try_get("size_group_code")?,
        variant_code: row.try_get("variant_code")?,
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<UpsertSummary> {
        let items_len = items.len();
        let items = dedupe_by_code(items);
        // 같은 코드가 여러 번 오면 마지막 항목만 반영
        if items.len() < items_len {
            warn!("Feed repeats {} menu codes; keeping the last entry of each", items_len - items.len());
        }

        let now = Utc::now();
        let mut summary = UpsertSummary::default();
        let mut tx = self.pool.begin().await.context("Failed to begin upsert transaction")?;

        let select_sql = format!("SELECT {} FROM catalog_items WHERE code = ?", ITEM_COLUMNS);
        for incoming in &items {
            let existing = sqlx::query(&select_sql)
                .bind(&incoming.code)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row_to_item(&row))
                .transpose()?;

            match existing {
                Some(mut item) => {
                    item.merge_from_feed(incoming, now);
                    sqlx::query(
                        r#"
                        UPDATE catalog_items SET
                            name = ?, name_en = ?, group_code = ?, group_name = ?,
                            category_code = ?, category_name = ?, image_url = ?, image_url_01 = ?,
                            image_url_02 = ?, image_url_03 = ?, badge_code = ?, badge_name = ?,
                            sort_order = ?, display_no = ?, deleted = 0, updated_at = ?
                        WHERE code = ?
                        "#,
                    )
                    .bind(&item.name)
                    .bind(&item.name_en)
                    .bind(&item.group_code)
                    .bind(&item.group_name)
                    .bind(&item.category_code)
                    .bind(&item.category_name)
                    .bind(&item.image_url)
                    .bind(&item.image_url_01)
                    .bind(&item.image_url_02)
                    .bind(&item.image_url_03)
                    .bind(&item.badge_code)
                    .bind(&item.badge_name)
                    .bind(item.sort_order)
                    .bind(&item.display_no)
                    .bind(item.updated_at)
                    .bind(&item.code)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to update menu {}", item.code))?;

                    summary.updated += 1;
                    summary.items.push(item);
                }
                None => {
                    let mut item = incoming.clone();
                    item.deleted = false;
                    item.local_image_path = None;
                    item.created_at = now;
                    item.updated_at = now;

                    let result = sqlx::query(
                        r#"
                        INSERT INTO catalog_items (
                            code, name, name_en, group_code, group_name, category_code, category_name,
                            image_url, image_url_01, image_url_02, image_url_03, badge_code, badge_name,
                            sort_order, display_no, local_image_path, deleted, created_at, updated_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0, ?, ?)
                        "#,
                    )
                    .bind(&item.code)
                    .bind(&item.name)
                    .bind(&item.name_en)
                    .bind(&item.group_code)
                    .bind(&item.group_name)
                    .bind(&item.category_code)
                    .bind(&item.category_name)
                    .bind(&item.image_url)
                    .bind(&item.image_url_01)
                    .bind(&item.image_url_02)
                    .bind(&item.image_url_03)
                    .bind(&item.badge_code)
                    .bind(&item.badge_name)
                    .bind(item.sort_order)
                    .bind(&item.display_no)
                    .bind(item.created_at)
                    .bind(item.updated_at)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to insert menu {}", item.code))?;

                    item.id = Some(result.last_insert_rowid());
                    summary.inserted += 1;
                    summary.items.push(item);
                }
            }
        }

        tx.commit().await.context("Failed to commit menu upsert")?;
        debug!("Upserted {} menus ({} new, {} updated)", items.len(), summary.inserted, summary.updated);
        Ok(summary)
    }

    async fn save_local_image_paths(&self, paths: &[(String, String)]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for (code, local_path) in paths {
            updated += sqlx::query(
                "UPDATE catalog_items SET local_image_path = ?, updated_at = ? WHERE code = ?",
            )
            .bind(local_path)
            .bind(now)
            .bind(code)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await.context("Failed to commit image paths")?;
        Ok(updated)
    }

    async fn delete_all_options(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM catalog_item_options")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await.context("Failed to commit option purge")?;
        Ok(deleted)
    }

    async fn insert_options(&self, options: &[OptionRecord]) -> Result<u64> {
        if options.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for option in options {
            inserted += sqlx::query(
                r#"
                INSERT INTO catalog_item_options (
                    item_code, temperature_code, temperature_name, size_code, size_name,
                    size_group_code, variant_code, deleted, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&option.item_code)
            .bind(&option.temperature_code)
            .bind(&option.temperature_name)
            .bind(&option.size_code)
            .bind(&option.size_name)
            .bind(&option.size_group_code)
            .bind(&option.variant_code)
            .bind(option.deleted)
            .bind(option.created_at)
            .bind(option.updated_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert option for menu {}", option.item_code))?
            .rows_affected();
        }
        tx.commit().await.context("Failed to commit options")?;
        Ok(inserted)
    }

    async fn find_item(&self, code: &str) -> Result<Option<CatalogItem>> {
        let sql = format!("SELECT {} FROM catalog_items WHERE code = ?", ITEM_COLUMNS);
        let row = sqlx::query(&sql).bind(code).fetch_optional(&*self.pool).await?;
        Ok(row.map(|row| row_to_item(&row)).transpose()?)
    }

    async fn find_options(&self, item_code: &str) -> Result<Vec<OptionRecord>> {
        let sql = format!(
            "SELECT {} FROM catalog_item_options WHERE item_code = ? ORDER BY id",
            OPTION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(item_code).fetch_all(&*self.pool).await?;
        Ok(rows.iter().map(row_to_option).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn list_active_items(&self) -> Result<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items WHERE deleted = 0 ORDER BY sort_order IS NULL, sort_order, code",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&*self.pool).await?;
        Ok(rows.iter().map(row_to_item).collect::<sqlx::Result<Vec<_>>>()?)
    }

    async fn count_items(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&*self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn count_options(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_item_options")
            .fetch_one(&*self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{SizeOption, build_option_records};
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn setup() -> (tempfile::TempDir, SqliteCatalogRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        (dir, SqliteCatalogRepository::new(Arc::new(db.pool().clone())))
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_code() {
        let (_dir, repo) = setup().await;
        let feed = vec![CatalogItem::new("A1", "Americano"), CatalogItem::new("A2", "Latte")];

        let first = repo.upsert_items(&feed).await.unwrap();
        assert_eq!((first.inserted, first.updated), (2, 0));
        assert!(first.items.iter().all(|i| i.id.is_some()));

        let second = repo.upsert_items(&feed).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 2));
        assert_eq!(repo.count_items().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_collapses_repeated_codes() {
        let (_dir, repo) = setup().await;
        let feed = vec![CatalogItem::new("A1", "Americano"), CatalogItem::new("A1", "Iced Americano")];

        let summary = repo.upsert_items(&feed).await.unwrap();
        assert_eq!((summary.inserted, summary.updated), (1, 0));
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.items[0].name, "Iced Americano");
        assert_eq!(repo.count_items().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_local_state() {
        let (_dir, repo) = setup().await;
        repo.upsert_items(&[CatalogItem::new("A1", "Americano")]).await.unwrap();
        repo.save_local_image_paths(&[("A1".into(), "/images/catalog/A1.png".into())])
            .await
            .unwrap();
        let created_at = repo.find_item("A1").await.unwrap().unwrap().created_at;

        let renamed = CatalogItem::new("A1", "Iced Americano");
        repo.upsert_items(&[renamed]).await.unwrap();

        let stored = repo.find_item("A1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Iced Americano");
        assert_eq!(stored.local_image_path.as_deref(), Some("/images/catalog/A1.png"));
        assert_eq!(stored.created_at, created_at);
    }

    #[tokio::test]
    async fn test_upsert_revives_soft_deleted_rows() {
        let (_dir, repo) = setup().await;
        repo.upsert_items(&[CatalogItem::new("A1", "Americano")]).await.unwrap();
        sqlx::query("UPDATE catalog_items SET deleted = 1 WHERE code = 'A1'")
            .execute(&*repo.pool)
            .await
            .unwrap();
        assert!(repo.list_active_items().await.unwrap().is_empty());

        repo.upsert_items(&[CatalogItem::new("A1", "Americano")]).await.unwrap();
        assert_eq!(repo.list_active_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_options_are_replaced_wholesale() {
        let (_dir, repo) = setup().await;
        let now = Utc::now();
        let sizes = vec![(
            "010H".to_string(),
            vec![SizeOption {
                variant_code: Some("020R".into()),
                size_group_code: Some("020".into()),
                size_name: Some("레귤러".into()),
                size_code: "R".into(),
            }],
        )];
        let records = build_option_records("A1", &sizes, now);

        assert_eq!(repo.insert_options(&records).await.unwrap(), 1);
        assert_eq!(repo.insert_options(&records).await.unwrap(), 1);
        assert_eq!(repo.count_options().await.unwrap(), 2);

        assert_eq!(repo.delete_all_options().await.unwrap(), 2);
        assert_eq!(repo.delete_all_options().await.unwrap(), 0);

        repo.insert_options(&records).await.unwrap();
        let stored = repo.find_options("A1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].temperature_name, "핫");
        assert_eq!(stored[0].size_code, "R");
    }
}
