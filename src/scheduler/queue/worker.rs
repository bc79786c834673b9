use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{JobRateLimiter, ScrapeQueue};
use crate::config::Config;
use crate::db::{JobRetention, JobStatus, Region, ScrapeJob};
use crate::ingest::{Orchestrator, UnitReport};
use crate::reddit::SortMode;

/// How often the queue is polled for due work.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How often finished jobs are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Worker pool draining the scrape queue.
pub struct QueueWorker {
    queue: ScrapeQueue,
    orchestrator: Arc<Orchestrator>,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    limiter: Arc<JobRateLimiter>,
    retention: JobRetention,
    poll_interval: Duration,
}

impl QueueWorker {
    #[must_use]
    pub fn new(queue: ScrapeQueue, orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        let concurrency = config.worker_concurrency.max(1);
        Self {
            queue,
            orchestrator,
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            limiter: Arc::new(JobRateLimiter::new(
                config.per_sort_concurrency,
                config.jobs_per_minute,
            )),
            retention: JobRetention::default(),
            poll_interval: POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Recover from a previous unclean shutdown: jobs that were running are
    /// made pending again.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be updated.
    pub async fn recover_on_startup(&self) -> Result<()> {
        let stuck = self.queue.recover().await?;
        if stuck > 0 {
            info!(count = stuck, "Reset interrupted scrape jobs to pending");
        }
        Ok(())
    }

    /// Run until `shutdown` is cancelled. A batch already claimed is always
    /// finished before returning.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            concurrency = self.concurrency,
            poll_secs = self.poll_interval.as_secs_f64(),
            "Starting scrape queue worker"
        );

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut purge = tokio::time::interval(PURGE_INTERVAL);
        purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scrape queue worker shutting down");
                    break;
                }
                _ = purge.tick() => {
                    self.purge_finished().await;
                }
                _ = poll.tick() => {
                    match self.process_available().await {
                        Ok(count) if count > 0 => debug!(count, "Processed scrape jobs"),
                        Ok(_) => {}
                        Err(e) => error!("Error processing scrape queue: {e:#}"),
                    }
                }
            }
        }
    }

    /// Dispatch due recurring jobs, then claim and run one batch of up to
    /// `concurrency` jobs, waiting for all of them.
    ///
    /// Returns the number of jobs run.
    ///
    /// # Errors
    ///
    /// Returns an error if dispatching or claiming fails. Jobs claimed before
    /// the failure still run to completion first.
    pub async fn process_available(&self) -> Result<usize> {
        let dispatched = self.queue.dispatch_due().await?;
        if !dispatched.is_empty() {
            debug!(count = dispatched.len(), "Dispatched recurring scrape jobs");
        }

        let mut handles = Vec::new();
        let mut claim_error = None;
        while handles.len() < self.concurrency {
            let job = match self.queue.claim().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    claim_error = Some(e);
                    break;
                }
            };

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    // The claimed row stays running until startup recovery.
                    claim_error = Some(anyhow::Error::new(e).context(format!(
                        "worker pool closed before job {} could start",
                        job.id
                    )));
                    break;
                }
            };
            let queue = self.queue.clone();
            let orchestrator = Arc::clone(&self.orchestrator);
            let limiter = Arc::clone(&self.limiter);

            handles.push(tokio::spawn(async move {
                let _global_permit = permit;
                run_job(&queue, &orchestrator, &limiter, job).await;
            }));
        }

        // Jobs already spawned are always awaited, even when claiming broke off.
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Scrape job task panicked: {e}");
            }
        }

        match claim_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Run batches until nothing is runnable.
    ///
    /// # Errors
    ///
    /// Returns an error if dispatching or claiming fails.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let count = self.process_available().await?;
            if count == 0 {
                return Ok(total);
            }
            total += count;
        }
    }

    async fn purge_finished(&self) {
        match self.queue.purge(self.retention).await {
            Ok(count) if count > 0 => info!(count, "Purged finished scrape jobs"),
            Ok(_) => {}
            Err(e) => error!("Failed to purge scrape jobs: {e:#}"),
        }
    }
}

async fn run_job(
    queue: &ScrapeQueue,
    orchestrator: &Orchestrator,
    limiter: &JobRateLimiter,
    job: ScrapeJob,
) {
    info!(
        job_id = job.id,
        name = %job.name,
        source = %job.source,
        sort = %job.sort,
        limit = job.limit_count,
        attempt = job.attempts,
        "Processing scrape job"
    );

    let outcome = execute(orchestrator, limiter, &job).await;

    match outcome {
        Ok(report) => {
            if let Err(e) = queue.complete(job.id, &report).await {
                error!(job_id = job.id, "Failed to mark scrape job completed: {e:#}");
                return;
            }
            info!(
                job_id = job.id,
                source = %job.source,
                fetched = report.fetched,
                parsed = report.parsed,
                saved = report.saved,
                "Scrape job completed"
            );
        }
        Err(message) => match queue.fail(job.id, &message).await {
            Ok(JobStatus::Failed) => error!(
                job_id = job.id,
                source = %job.source,
                attempts = job.attempts,
                error = %message,
                "Scrape job failed permanently"
            ),
            Ok(_) => warn!(
                job_id = job.id,
                source = %job.source,
                attempts = job.attempts,
                error = %message,
                "Scrape job failed, will retry"
            ),
            Err(e) => error!(job_id = job.id, "Failed to record scrape job failure: {e:#}"),
        },
    }
}

async fn execute(
    orchestrator: &Orchestrator,
    limiter: &JobRateLimiter,
    job: &ScrapeJob,
) -> Result<UnitReport, String> {
    let sort = SortMode::parse(&job.sort).ok_or_else(|| format!("unknown sort '{}'", job.sort))?;
    let region =
        Region::from_str(&job.region).ok_or_else(|| format!("unknown region '{}'", job.region))?;
    let limit = u32::try_from(job.limit_count).map_err(|_| format!("invalid limit {}", job.limit_count))?;

    let _permit = limiter
        .acquire(sort.as_str())
        .await
        .map_err(|e| format!("rate limiter closed: {e}"))?;

    orchestrator
        .ingest_listing(&job.source, region, sort, limit)
        .await
        .map_err(|e| e.to_string())
}
