//! Drivers that decide when ingestion runs.
//!
//! The timer runs whole cycles on a fixed cadence. The queue runs one
//! listing per job, with retries, and survives restarts. Both call into the
//! same [`Orchestrator`].

pub mod queue;
mod timer;

pub use queue::{repeat_job_key, QueueWorker, ScrapeQueue};
pub use timer::run_timer;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SchedulerKind};
use crate::db::Database;
use crate::ingest::Orchestrator;

/// Start the configured strategy and run until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the queue cannot be prepared.
pub async fn run_scheduler(
    config: &Config,
    orchestrator: Arc<Orchestrator>,
    queue_db: Database,
    shutdown: CancellationToken,
) -> Result<()> {
    match config.scheduler {
        SchedulerKind::Timer => {
            run_timer(orchestrator, config.scrape_interval, shutdown).await;
        }
        SchedulerKind::Queue => {
            let queue = ScrapeQueue::from_config(queue_db, config);
            queue.register_repeat_jobs(config).await?;

            let worker = QueueWorker::new(queue, orchestrator, config);
            worker.recover_on_startup().await?;
            worker.run(shutdown).await;
        }
    }
    Ok(())
}
