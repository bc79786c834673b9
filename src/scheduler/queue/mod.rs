//! Durable scrape queue backed by SQLite.
//!
//! Recurring definitions live in `repeat_jobs`; each due occurrence becomes a
//! row in `scrape_jobs` that workers claim, retry with backoff and finally
//! mark completed or failed.

mod rate_limiter;
mod worker;

pub use rate_limiter::{JobPermit, JobRateLimiter};
pub use worker::QueueWorker;

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db::{
    self, Database, JobRetention, JobStatus, NewRepeatJob, NewScrapeJob, Region, ScrapeJob,
};
use crate::ingest::UnitReport;
use crate::reddit::SortMode;

/// Name given to jobs enqueued by hand.
pub const MANUAL_JOB_NAME: &str = "manual-scrape";

/// Deterministic key of a recurring job, so re-registering never duplicates it.
#[must_use]
pub fn repeat_job_key(source: &str, sort: SortMode) -> String {
    format!("scrape-{source}-{}-repeat", sort.as_str())
}

/// Sorts scheduled per source, with their cadence and page size.
#[must_use]
pub fn repeat_schedule(config: &Config) -> [(SortMode, Duration, u32); 3] {
    [
        (SortMode::New, config.new_interval, config.new_limit),
        (SortMode::Rising, config.rising_interval, config.rising_limit),
        (SortMode::Hot, config.hot_interval, config.hot_limit),
    ]
}

/// Handle on the queue tables.
#[derive(Debug, Clone)]
pub struct ScrapeQueue {
    db: Database,
    max_attempts: u32,
    backoff_base: Duration,
}

impl ScrapeQueue {
    #[must_use]
    pub fn new(db: Database, max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            db,
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    #[must_use]
    pub fn from_config(db: Database, config: &Config) -> Self {
        Self::new(db, config.job_max_attempts, config.job_backoff_base)
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register the new/rising/hot recurring jobs for every configured source.
    ///
    /// Safe to call on every start. Returns the number of definitions written.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition cannot be stored.
    pub async fn register_repeat_jobs(&self, config: &Config) -> Result<usize> {
        let mut count = 0;
        for source in &config.sources {
            for (sort, interval, limit) in repeat_schedule(config) {
                let job = NewRepeatJob {
                    job_key: repeat_job_key(&source.name, sort),
                    name: format!("scrape-{}-{}", source.name, sort.as_str()),
                    source: source.name.clone(),
                    region: source.region,
                    sort: sort.as_str().to_string(),
                    limit_count: limit,
                    interval_secs: interval.as_secs().max(1),
                };
                db::upsert_repeat_job(self.db.pool(), &job).await?;
                count += 1;
            }
        }

        let sources: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
        info!(?sources, jobs = count, "Scheduled scrape jobs for new/rising/hot");
        Ok(count)
    }

    /// Queue a one-off scrape that runs as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be stored.
    pub async fn enqueue_manual(
        &self,
        source: &str,
        region: Region,
        sort: SortMode,
        limit: u32,
    ) -> Result<i64> {
        let job = NewScrapeJob {
            job_key: None,
            name: MANUAL_JOB_NAME.to_string(),
            source: source.to_string(),
            region,
            sort: sort.as_str().to_string(),
            limit_count: limit,
            max_attempts: self.max_attempts,
        };
        let id = db::insert_scrape_job(self.db.pool(), &job).await?;
        info!(job_id = id, source, sort = %sort, limit, "Queued manual scrape");
        Ok(id)
    }

    /// Materialise recurring jobs whose time has come.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch transaction fails.
    pub async fn dispatch_due(&self) -> Result<Vec<i64>> {
        db::enqueue_due_repeat_jobs(self.db.pool(), self.max_attempts).await
    }

    /// Claim the next runnable job.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim query fails.
    pub async fn claim(&self) -> Result<Option<ScrapeJob>> {
        db::claim_next_job(self.db.pool()).await
    }

    /// Record a successful run.
    ///
    /// # Errors
    ///
    /// Returns an error if the job row cannot be updated.
    pub async fn complete(&self, job_id: i64, report: &UnitReport) -> Result<()> {
        let result = serde_json::to_string(report)?;
        db::set_job_completed(self.db.pool(), job_id, &result).await
    }

    /// Record a failed run; the job is retried with backoff until its
    /// attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns an error if the job row cannot be updated.
    pub async fn fail(&self, job_id: i64, error: &str) -> Result<JobStatus> {
        db::set_job_failed(self.db.pool(), job_id, error, self.backoff_base.as_secs()).await
    }

    /// Put jobs interrupted by a crash back in the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn recover(&self) -> Result<u64> {
        db::reset_running_jobs(self.db.pool()).await
    }

    /// Delete finished jobs outside the retention windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn purge(&self, retention: JobRetention) -> Result<u64> {
        db::purge_finished_jobs(self.db.pool(), retention).await
    }

    /// Look up a job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn job(&self, job_id: i64) -> Result<Option<ScrapeJob>> {
        db::get_scrape_job(self.db.pool(), job_id).await
    }
}
