use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::{db, layout};

/// `shelf init`: create the local raw-data directory and the mirror schema.
/// Safe to run repeatedly.
pub async fn run_init(config: &Config) -> Result<()> {
    if config.storage.backend == "local" {
        if let Some(local) = &config.storage.local {
            let raw = local.root.join(layout::RAW_DATA);
            tokio::fs::create_dir_all(&raw)
                .await
                .with_context(|| format!("Failed to create {}", raw.display()))?;
            println!("Local store ready at {}", local.root.display());
        }
    }
    if let Some(mirror) = &config.mirror {
        let pool = db::connect(&mirror.path).await?;
        run_migrations(&pool).await?;
        pool.close().await;
        println!("Mirror database initialized at {}", mirror.path.display());
    }
    Ok(())
}

/// Create the relational mirror schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            identifier TEXT PRIMARY KEY,
            uuid TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            author TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            publication_date TEXT,
            page_count INTEGER,
            price REAL,
            popularity_rank INTEGER,
            rating REAL,
            rating_count INTEGER,
            cover_image_reference TEXT,
            source_reference TEXT NOT NULL,
            language TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            rating INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(identifier, author),
            FOREIGN KEY (identifier) REFERENCES items(identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_identifier ON feedback(identifier)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_source_reference ON items(source_reference)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
