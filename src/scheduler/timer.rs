use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ingest::Orchestrator;

/// Run a cycle immediately, then every `interval` until cancelled.
///
/// Shutdown is only observed between cycles; a running cycle always
/// finishes.
pub async fn run_timer(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "Starting scrape scheduler");

    orchestrator.run_cycle().await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // first tick is immediate; that cycle already ran

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                orchestrator.run_cycle().await;
            }
            _ = shutdown.cancelled() => {
                info!("Scrape scheduler shutting down");
                break;
            }
        }
    }
}
