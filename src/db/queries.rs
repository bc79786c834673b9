use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use super::models::{
    Category, Deal, DealSource, JobStatus, NewDeal, NewRepeatJob, NewScrapeJob, PriceHistory,
    RepeatJob, ScrapeJob, UpsertOutcome,
};

/// Categories every installation starts with: (name, slug, icon, color).
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("Electronics", "electronics", "💻", "#3B82F6"),
    ("Fashion", "fashion", "👕", "#EC4899"),
    ("Gaming", "gaming", "🎮", "#8B5CF6"),
    ("Home & Kitchen", "home-kitchen", "🏠", "#F59E0B"),
    ("Beauty", "beauty", "💄", "#F472B6"),
    ("Food & Groceries", "food-groceries", "🍕", "#10B981"),
    ("Mobile & Accessories", "mobile-accessories", "📱", "#6366F1"),
    ("Books & Stationery", "books-stationery", "📚", "#84CC16"),
    ("Travel", "travel", "✈️", "#0EA5E9"),
    ("Other", "other", "📦", "#6B7280"),
];

/// Canonical text form of a price. Trailing zeros are dropped so that equal
/// decimals always compare equal as text.
#[must_use]
pub fn price_to_text(price: Decimal) -> String {
    price.normalize().to_string()
}

// ========== Categories ==========

/// Insert any missing default categories without touching existing rows.
///
/// Returns the number of categories inserted.
pub async fn ensure_default_categories(pool: &SqlitePool) -> Result<u64> {
    let mut inserted = 0;
    for (name, slug, icon, color) in DEFAULT_CATEGORIES {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO categories (name, slug, icon, color) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(slug)
        .bind(icon)
        .bind(color)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed category {slug}"))?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Get a category by slug.
pub async fn get_category_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Category>> {
    sqlx::query_as("SELECT * FROM categories WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch category by slug")
}

/// Get all categories ordered by id.
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<Category>> {
    sqlx::query_as("SELECT * FROM categories ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list categories")
}

// ========== Deals ==========

/// Insert a deal, or refresh the mutable fields of an existing one.
///
/// The conflict target is the natural key (source, external_post_id). On
/// refresh only title, description and external score change; price fields
/// keep the values recorded at creation.
pub async fn upsert_deal(pool: &SqlitePool, deal: &NewDeal) -> Result<UpsertOutcome> {
    let (id, refresh_count): (i64, i64) = sqlx::query_as(
        r"
        INSERT INTO deals (
            source, region, external_post_id, title, description,
            original_price, deal_price, currency, discount_percent,
            product_url, image_url, store, category_id, external_score
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (source, external_post_id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            external_score = excluded.external_score,
            refresh_count = deals.refresh_count + 1,
            updated_at = datetime('now')
        RETURNING id, refresh_count
        ",
    )
    .bind(deal.source.as_str())
    .bind(deal.region.as_str())
    .bind(&deal.external_post_id)
    .bind(&deal.title)
    .bind(&deal.description)
    .bind(deal.original_price.map(price_to_text))
    .bind(deal.deal_price.map(price_to_text))
    .bind(&deal.currency)
    .bind(deal.discount_percent.map(i64::from))
    .bind(&deal.product_url)
    .bind(&deal.image_url)
    .bind(&deal.store)
    .bind(deal.category_id)
    .bind(deal.external_score)
    .fetch_one(pool)
    .await
    .context("Failed to upsert deal")?;

    Ok(UpsertOutcome {
        id,
        created: refresh_count == 0,
    })
}

/// Get a deal by id.
pub async fn get_deal(pool: &SqlitePool, id: i64) -> Result<Option<Deal>> {
    sqlx::query_as("SELECT * FROM deals WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch deal")
}

/// Get a deal by its natural key.
pub async fn get_deal_by_external_id(
    pool: &SqlitePool,
    source: DealSource,
    external_post_id: &str,
) -> Result<Option<Deal>> {
    sqlx::query_as("SELECT * FROM deals WHERE source = ? AND external_post_id = ?")
        .bind(source.as_str())
        .bind(external_post_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch deal by external id")
}

/// Count all deals.
pub async fn count_deals(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deals")
        .fetch_one(pool)
        .await
        .context("Failed to count deals")?;
    Ok(count)
}

// ========== Price History ==========

/// Get the most recent price sample for a deal.
pub async fn get_latest_price(pool: &SqlitePool, deal_id: i64) -> Result<Option<PriceHistory>> {
    sqlx::query_as(
        "SELECT * FROM price_history WHERE deal_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(deal_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest price")
}

/// Get a deal's price history, oldest first.
pub async fn get_price_history(pool: &SqlitePool, deal_id: i64) -> Result<Vec<PriceHistory>> {
    sqlx::query_as("SELECT * FROM price_history WHERE deal_id = ? ORDER BY id ASC")
        .bind(deal_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch price history")
}

/// Append a price sample unless it equals the latest sample for the deal.
///
/// The check and the insert are a single statement, so two writers observing
/// the same price cannot both append it. Returns whether a row was added.
pub async fn insert_price_if_changed(
    pool: &SqlitePool,
    deal_id: i64,
    price: Decimal,
    origin: &str,
) -> Result<bool> {
    let price_text = price_to_text(price);
    let result = sqlx::query(
        r"
        INSERT INTO price_history (deal_id, price, source)
        SELECT ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM (
                SELECT price FROM price_history
                WHERE deal_id = ?
                ORDER BY id DESC
                LIMIT 1
            ) AS latest
            WHERE latest.price = ?
        )
        ",
    )
    .bind(deal_id)
    .bind(&price_text)
    .bind(origin)
    .bind(deal_id)
    .bind(&price_text)
    .execute(pool)
    .await
    .context("Failed to append price history")?;

    Ok(result.rows_affected() > 0)
}

// ========== Cursors ==========

/// Get the stored cursor for a source.
pub async fn get_cursor(pool: &SqlitePool, source_key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT cursor FROM source_cursors WHERE source_key = ?")
            .bind(source_key)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch cursor")?;
    Ok(row.map(|(c,)| c))
}

/// Create or overwrite the cursor for a source.
pub async fn set_cursor(pool: &SqlitePool, source_key: &str, cursor: &str) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO source_cursors (source_key, cursor)
        VALUES (?, ?)
        ON CONFLICT (source_key) DO UPDATE SET
            cursor = excluded.cursor,
            updated_at = datetime('now')
        ",
    )
    .bind(source_key)
    .bind(cursor)
    .execute(pool)
    .await
    .context("Failed to set cursor")?;
    Ok(())
}

// ========== Repeat Jobs ==========

/// Register a recurring job. Re-registering the same key updates its
/// parameters but keeps its schedule position.
pub async fn upsert_repeat_job(pool: &SqlitePool, job: &NewRepeatJob) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO repeat_jobs (job_key, name, source, region, sort, limit_count, interval_secs)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (job_key) DO UPDATE SET
            name = excluded.name,
            region = excluded.region,
            limit_count = excluded.limit_count,
            interval_secs = excluded.interval_secs,
            updated_at = datetime('now')
        ",
    )
    .bind(&job.job_key)
    .bind(&job.name)
    .bind(&job.source)
    .bind(job.region.as_str())
    .bind(&job.sort)
    .bind(i64::from(job.limit_count))
    .bind(i64::try_from(job.interval_secs).unwrap_or(i64::MAX))
    .execute(pool)
    .await
    .context("Failed to register repeat job")?;
    Ok(())
}

/// Get all recurring job definitions.
pub async fn list_repeat_jobs(pool: &SqlitePool) -> Result<Vec<RepeatJob>> {
    sqlx::query_as("SELECT * FROM repeat_jobs ORDER BY job_key")
        .fetch_all(pool)
        .await
        .context("Failed to list repeat jobs")
}

/// Turn every due recurring job into a pending scrape job and move its next
/// run forward by one interval.
///
/// A recurring job whose previous invocation is still pending or running is
/// rescheduled without enqueuing a second copy. Returns the new job ids.
pub async fn enqueue_due_repeat_jobs(pool: &SqlitePool, max_attempts: u32) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let due: Vec<RepeatJob> = sqlx::query_as(
        r"
        UPDATE repeat_jobs
        SET next_run_at = datetime('now', '+' || interval_secs || ' seconds')
        WHERE next_run_at <= datetime('now')
        RETURNING *
        ",
    )
    .fetch_all(&mut *tx)
    .await
    .context("Failed to advance due repeat jobs")?;

    let mut ids = Vec::with_capacity(due.len());
    for job in due {
        let inserted: Option<(i64,)> = sqlx::query_as(
            r"
            INSERT INTO scrape_jobs (job_key, name, source, region, sort, limit_count, max_attempts)
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM scrape_jobs
                WHERE job_key = ? AND status IN ('pending', 'running')
            )
            RETURNING id
            ",
        )
        .bind(&job.job_key)
        .bind(&job.name)
        .bind(&job.source)
        .bind(&job.region)
        .bind(&job.sort)
        .bind(job.limit_count)
        .bind(i64::from(max_attempts))
        .bind(&job.job_key)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to enqueue repeat job")?;

        if let Some((id,)) = inserted {
            ids.push(id);
        }
    }

    tx.commit().await.context("Failed to commit repeat job dispatch")?;
    Ok(ids)
}

// ========== Scrape Jobs ==========

/// Add a one-off job, runnable immediately.
pub async fn insert_scrape_job(pool: &SqlitePool, job: &NewScrapeJob) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO scrape_jobs (job_key, name, source, region, sort, limit_count, max_attempts)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&job.job_key)
    .bind(&job.name)
    .bind(&job.source)
    .bind(job.region.as_str())
    .bind(&job.sort)
    .bind(i64::from(job.limit_count))
    .bind(i64::from(job.max_attempts))
    .execute(pool)
    .await
    .context("Failed to insert scrape job")?;

    Ok(result.last_insert_rowid())
}

/// Get a scrape job by id.
pub async fn get_scrape_job(pool: &SqlitePool, id: i64) -> Result<Option<ScrapeJob>> {
    sqlx::query_as("SELECT * FROM scrape_jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch scrape job")
}

/// Get scrape jobs with the given status, oldest first.
pub async fn list_scrape_jobs(pool: &SqlitePool, status: JobStatus) -> Result<Vec<ScrapeJob>> {
    sqlx::query_as("SELECT * FROM scrape_jobs WHERE status = ? ORDER BY id ASC")
        .bind(status.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to list scrape jobs")
}

/// Atomically claim the oldest runnable job, marking it running and counting
/// the attempt.
pub async fn claim_next_job(pool: &SqlitePool) -> Result<Option<ScrapeJob>> {
    sqlx::query_as(
        r"
        UPDATE scrape_jobs
        SET status = 'running',
            attempts = attempts + 1,
            started_at = datetime('now'),
            finished_at = NULL
        WHERE id = (
            SELECT id FROM scrape_jobs
            WHERE status = 'pending' AND run_at <= datetime('now')
            ORDER BY run_at ASC, id ASC
            LIMIT 1
        )
        AND status = 'pending'
        RETURNING *
        ",
    )
    .fetch_optional(pool)
    .await
    .context("Failed to claim scrape job")
}

/// Mark a job completed with its result summary.
pub async fn set_job_completed(pool: &SqlitePool, id: i64, result_json: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE scrape_jobs
        SET status = 'completed',
            result_json = ?,
            last_error = NULL,
            finished_at = datetime('now')
        WHERE id = ?
        ",
    )
    .bind(result_json)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to set job completed")?;
    Ok(())
}

/// Record a failed attempt.
///
/// While attempts remain the job goes back to pending with exponential
/// backoff: `base * 2^(attempts - 1)` seconds, so 5s, 10s, 20s for a 5s base.
/// Once attempts are exhausted it is marked failed and kept for inspection.
/// Returns the resulting status.
pub async fn set_job_failed(
    pool: &SqlitePool,
    id: i64,
    error: &str,
    backoff_base_secs: u64,
) -> Result<JobStatus> {
    let (status,): (String,) = sqlx::query_as(
        r"
        UPDATE scrape_jobs
        SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
            last_error = ?,
            run_at = CASE
                WHEN attempts >= max_attempts THEN run_at
                ELSE datetime('now', '+' || (? * (1 << (attempts - 1))) || ' seconds')
            END,
            finished_at = CASE WHEN attempts >= max_attempts THEN datetime('now') ELSE NULL END
        WHERE id = ?
        RETURNING status
        ",
    )
    .bind(error)
    .bind(i64::try_from(backoff_base_secs).unwrap_or(i64::MAX))
    .bind(id)
    .fetch_one(pool)
    .await
    .context("Failed to set job failed")?;

    Ok(JobStatus::from_str(&status).unwrap_or(JobStatus::Failed))
}

/// Return jobs left running by an unclean shutdown to the pending state.
pub async fn reset_running_jobs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scrape_jobs SET status = 'pending', run_at = datetime('now') WHERE status = 'running'",
    )
    .execute(pool)
    .await
    .context("Failed to reset running jobs")?;
    Ok(result.rows_affected())
}

/// Retention windows for finished jobs.
#[derive(Debug, Clone, Copy)]
pub struct JobRetention {
    pub completed_max_age_secs: i64,
    pub completed_max_count: i64,
    pub failed_max_age_secs: i64,
}

impl Default for JobRetention {
    fn default() -> Self {
        Self {
            completed_max_age_secs: 24 * 3600,
            completed_max_count: 100,
            failed_max_age_secs: 7 * 24 * 3600,
        }
    }
}

/// Delete finished jobs that fall outside the retention windows.
///
/// Returns the number of rows deleted.
pub async fn purge_finished_jobs(pool: &SqlitePool, retention: JobRetention) -> Result<u64> {
    let aged_completed = sqlx::query(
        r"
        DELETE FROM scrape_jobs
        WHERE status = 'completed'
          AND finished_at < datetime('now', '-' || ? || ' seconds')
        ",
    )
    .bind(retention.completed_max_age_secs)
    .execute(pool)
    .await
    .context("Failed to purge old completed jobs")?;

    let excess_completed = sqlx::query(
        r"
        DELETE FROM scrape_jobs
        WHERE status = 'completed'
          AND id NOT IN (
              SELECT id FROM scrape_jobs
              WHERE status = 'completed'
              ORDER BY finished_at DESC, id DESC
              LIMIT ?
          )
        ",
    )
    .bind(retention.completed_max_count)
    .execute(pool)
    .await
    .context("Failed to purge excess completed jobs")?;

    let aged_failed = sqlx::query(
        r"
        DELETE FROM scrape_jobs
        WHERE status = 'failed'
          AND finished_at < datetime('now', '-' || ? || ' seconds')
        ",
    )
    .bind(retention.failed_max_age_secs)
    .execute(pool)
    .await
    .context("Failed to purge old failed jobs")?;

    Ok(aged_completed.rows_affected()
        + excess_completed.rows_affected()
        + aged_failed.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_price_to_text_is_canonical() {
        assert_eq!(price_to_text(Decimal::from_str("100.00").unwrap()), "100");
        assert_eq!(price_to_text(Decimal::from_str("99.50").unwrap()), "99.5");
        assert_eq!(price_to_text(Decimal::from_str("1999").unwrap()), "1999");
    }

    #[test]
    fn test_default_categories_include_other() {
        assert!(DEFAULT_CATEGORIES.iter().any(|(_, slug, _, _)| *slug == "other"));
    }
}
