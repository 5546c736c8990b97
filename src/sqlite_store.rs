//! SQLite-backed [`ItemStore`]: the relational mirror.
//!
//! Two tables, `items` and `feedback` (see [`crate::migrate`]). Attribute
//! rows are inserted once and never updated; feedback rows are keyed by
//! `(identifier, author)` and inserted with `INSERT OR IGNORE`, so an
//! existing author is never overwritten. When a mirror is configured it
//! answers every read, including the aggregate satisfied-references query.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use shelf_harvest_core::error::{HarvestError, Result};
use shelf_harvest_core::models::{FeedbackEntry, Item, ItemRecord};
use shelf_harvest_core::store::ItemStore;

use crate::{db, migrate};

const BACKEND: &str = "sqlite";

fn storage_err(e: impl Into<anyhow::Error>) -> HarvestError {
    HarvestError::storage(BACKEND, e)
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn opt_u32(v: Option<i64>) -> Option<u32> {
    v.and_then(|v| u32::try_from(v).ok())
}

fn opt_u64(v: Option<i64>) -> Option<u64> {
    v.and_then(|v| u64::try_from(v).ok())
}

fn opt_i64(v: Option<u64>) -> Option<i64> {
    v.and_then(|v| i64::try_from(v).ok())
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item> {
    let uuid: String = row.get("uuid");
    Ok(Item {
        identifier: row.get("identifier"),
        uuid: uuid::Uuid::parse_str(&uuid).map_err(storage_err)?,
        title: row.get("title"),
        author: row.get("author"),
        description: row.get("description"),
        publication_date: row.get("publication_date"),
        page_count: opt_u32(row.get("page_count")),
        price: row.get("price"),
        popularity_rank: opt_u64(row.get("popularity_rank")),
        rating: row.get("rating"),
        rating_count: opt_u64(row.get("rating_count")),
        cover_image_reference: row.get("cover_image_reference"),
        source_reference: row.get("source_reference"),
        language: row.get("language"),
    })
}

#[async_trait]
impl ItemStore for SqliteStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        let item = &record.item;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        if !known_identifiers.contains(&item.identifier) {
            sqlx::query(
                r#"
                INSERT INTO items (identifier, uuid, title, author, description,
                                   publication_date, page_count, price, popularity_rank,
                                   rating, rating_count, cover_image_reference,
                                   source_reference, language, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(identifier) DO NOTHING
                "#,
            )
            .bind(&item.identifier)
            .bind(item.uuid.to_string())
            .bind(&item.title)
            .bind(&item.author)
            .bind(&item.description)
            .bind(&item.publication_date)
            .bind(item.page_count)
            .bind(item.price)
            .bind(opt_i64(item.popularity_rank))
            .bind(item.rating)
            .bind(opt_i64(item.rating_count))
            .bind(&item.cover_image_reference)
            .bind(&item.source_reference)
            .bind(&item.language)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        for entry in &record.feedback {
            sqlx::query(
                "INSERT OR IGNORE INTO feedback (identifier, author, text, rating, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&item.identifier)
            .bind(&entry.author)
            .bind(&entry.text)
            .bind(entry.rating.map(i64::from))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Cover images are kept with the raw data, not in the mirror.
    async fn save_cover_asset(&self, _uri: &str, identifier: &str) -> Result<()> {
        debug!(identifier, "sqlite mirror does not store cover assets");
        Ok(())
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT i.source_reference
            FROM items i
            LEFT JOIN feedback f ON f.identifier = i.identifier
            GROUP BY i.identifier
            HAVING COUNT(f.id) >= ?
            "#,
        )
        .bind(threshold as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(|r| r.get("source_reference")).collect())
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT identifier FROM items")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.iter().map(|r| r.get("identifier")).collect())
    }

    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT author FROM feedback WHERE identifier = ?")
            .bind(identifier)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.iter().map(|r| r.get("author")).collect())
    }

    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>> {
        let row = sqlx::query("SELECT * FROM items WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let item = row_to_item(&row)?;

        let feedback_rows = sqlx::query(
            "SELECT author, text, rating FROM feedback WHERE identifier = ? ORDER BY id ASC",
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let feedback = feedback_rows
            .iter()
            .map(|r| {
                let rating: Option<i64> = r.get("rating");
                FeedbackEntry::new(
                    r.get::<String, _>("author"),
                    r.get::<String, _>("text"),
                    rating.and_then(|v| u8::try_from(v).ok()),
                )
            })
            .collect();

        Ok(Some(ItemRecord::new(item, feedback)))
    }
}
