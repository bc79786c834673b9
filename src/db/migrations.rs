use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: deals, price history, categories, cursors");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            icon TEXT,
            color TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create categories table")?;

    // (source, external_post_id) is the natural key for upserts.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS deals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            region TEXT NOT NULL,
            external_post_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            original_price TEXT,
            deal_price TEXT,
            currency TEXT NOT NULL,
            discount_percent INTEGER,
            product_url TEXT NOT NULL,
            image_url TEXT,
            store TEXT,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            external_score INTEGER NOT NULL DEFAULT 0,
            upvotes INTEGER NOT NULL DEFAULT 0,
            downvotes INTEGER NOT NULL DEFAULT 0,
            clicks INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            refresh_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (source, external_post_id)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create deals table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS price_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deal_id INTEGER NOT NULL REFERENCES deals(id) ON DELETE CASCADE,
            price TEXT NOT NULL,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create price_history table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS source_cursors (
            source_key TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create source_cursors table")?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_region ON deals(region)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_category ON deals(category_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_history_deal ON price_history(deal_id, id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: durable scrape queue");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS repeat_jobs (
            job_key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            source TEXT NOT NULL,
            region TEXT NOT NULL,
            sort TEXT NOT NULL,
            limit_count INTEGER NOT NULL,
            interval_secs INTEGER NOT NULL,
            next_run_at TEXT NOT NULL DEFAULT (datetime('now')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create repeat_jobs table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS scrape_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_key TEXT,
            name TEXT NOT NULL,
            source TEXT NOT NULL,
            region TEXT NOT NULL,
            sort TEXT NOT NULL,
            limit_count INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            run_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_error TEXT,
            result_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            started_at TEXT,
            finished_at TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create scrape_jobs table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_status_run_at ON scrape_jobs(status, run_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scrape_jobs_key ON scrape_jobs(job_key)")
        .execute(pool)
        .await?;

    Ok(())
}
