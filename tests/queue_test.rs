//! Durable queue behaviour: recurring registration, dispatch, retries and
//! the worker loop.

use std::sync::Arc;
use std::time::Duration;

use dealhunt_ingest::config::{Config, SchedulerKind, SourceConfig};
use dealhunt_ingest::db::{
    count_deals, list_repeat_jobs, list_scrape_jobs, Database, JobRetention, JobStatus, Region,
};
use dealhunt_ingest::ingest::{DealStore, Orchestrator, UnitReport};
use dealhunt_ingest::parser::DealParser;
use dealhunt_ingest::reddit::{RedditClient, SortMode};
use dealhunt_ingest::scheduler::{repeat_job_key, run_scheduler, QueueWorker, ScrapeQueue};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn test_config(server: &MockServer) -> Config {
    Config {
        reddit_auth_url: format!("{}/api/v1/access_token", server.uri()),
        reddit_api_base: server.uri(),
        sources: vec![
            SourceConfig::new("dealsforindia", Region::India),
            SourceConfig::new("buildapcsales", Region::World),
        ],
        scheduler: SchedulerKind::Queue,
        ..Config::for_testing()
    }
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn listing_with(id: &str, title: &str) -> serde_json::Value {
    json!({
        "kind": "Listing",
        "data": {
            "children": [{
                "kind": "t3",
                "data": {
                    "id": id,
                    "name": format!("t3_{id}"),
                    "title": title,
                    "url": format!("https://www.flipkart.com/item/{id}"),
                    "permalink": format!("/r/dealsforindia/comments/{id}/post/"),
                    "score": 3,
                    "created_utc": 1_700_000_000.0
                }
            }],
            "after": null,
            "before": null
        }
    })
}

fn worker_for(config: &Config, queue: ScrapeQueue, db: &Database) -> QueueWorker {
    let client = RedditClient::from_config(config).unwrap();
    let orchestrator = Orchestrator::new(config, client, DealParser::offline(), DealStore::new(db.clone()));
    QueueWorker::new(queue, Arc::new(orchestrator), config)
}

#[tokio::test]
async fn test_register_repeat_jobs_is_idempotent() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    let config = test_config(&server);
    let queue = ScrapeQueue::from_config(db.clone(), &config);

    assert_eq!(queue.register_repeat_jobs(&config).await.unwrap(), 6);
    assert_eq!(queue.register_repeat_jobs(&config).await.unwrap(), 6);

    let jobs = list_repeat_jobs(db.pool()).await.unwrap();
    assert_eq!(jobs.len(), 6);
    assert!(jobs
        .iter()
        .any(|j| j.job_key == repeat_job_key("dealsforindia", SortMode::Rising)));

    let new_job = jobs
        .iter()
        .find(|j| j.job_key == repeat_job_key("buildapcsales", SortMode::New))
        .unwrap();
    assert_eq!(new_job.limit_count, 50);
    assert_eq!(new_job.interval_secs, 900);
    assert_eq!(new_job.region, "WORLD");
}

#[tokio::test]
async fn test_dispatch_does_not_stack_pending_copies() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    let config = test_config(&server);
    let queue = ScrapeQueue::from_config(db.clone(), &config);
    queue.register_repeat_jobs(&config).await.unwrap();

    let first = queue.dispatch_due().await.unwrap();
    assert_eq!(first.len(), 6);

    // Next runs were pushed out by their interval.
    assert!(queue.dispatch_due().await.unwrap().is_empty());
    assert_eq!(list_scrape_jobs(db.pool(), JobStatus::Pending).await.unwrap().len(), 6);

    // Force everything due again while the first copies are still pending.
    sqlx::query("UPDATE repeat_jobs SET next_run_at = datetime('now', '-1 seconds')")
        .execute(db.pool())
        .await
        .unwrap();
    assert!(queue.dispatch_due().await.unwrap().is_empty());
    assert_eq!(list_scrape_jobs(db.pool(), JobStatus::Pending).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_failed_attempt_backs_off() {
    let (db, _temp_dir) = setup_db().await;
    let queue = ScrapeQueue::new(db.clone(), 3, Duration::from_secs(5));

    let id = queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::Hot, 25)
        .await
        .unwrap();

    let claimed = queue.claim().await.unwrap().expect("job is runnable");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.status(), Some(JobStatus::Running));

    // Running jobs cannot be claimed twice.
    assert!(queue.claim().await.unwrap().is_none());

    let status = queue.fail(id, "fetch from r/dealsforindia failed with status 503").await.unwrap();
    assert_eq!(status, JobStatus::Pending);

    // Backed off into the future, so not claimable yet.
    assert!(queue.claim().await.unwrap().is_none());

    let job = queue.job(id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Pending));
    assert!(job.run_at > job.created_at);
    assert_eq!(
        job.last_error.as_deref(),
        Some("fetch from r/dealsforindia failed with status 503")
    );
}

#[tokio::test]
async fn test_worker_retries_then_marks_failed() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/dealsforindia/hot"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let queue = ScrapeQueue::new(db.clone(), 3, Duration::ZERO);
    let id = queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::Hot, 25)
        .await
        .unwrap();

    let worker = worker_for(&config, queue.clone(), &db);
    assert_eq!(worker.drain().await.unwrap(), 3);

    let job = queue.job(id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Failed));
    assert_eq!(job.attempts, 3);
    assert!(job.finished_at.is_some());
    assert!(job.last_error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_worker_completes_job_with_report() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/dealsforindia/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_with("q1", "Nike running shoe at ₹2,999 (MRP ₹5,999)")),
        )
        .mount(&server)
        .await;

    let config = test_config(&server);
    let queue = ScrapeQueue::from_config(db.clone(), &config);
    let id = queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::New, 50)
        .await
        .unwrap();

    let worker = worker_for(&config, queue.clone(), &db);
    assert_eq!(worker.process_available().await.unwrap(), 1);

    let job = queue.job(id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Completed));
    assert_eq!(job.attempts, 1);

    let report: UnitReport = serde_json::from_str(job.result_json.as_deref().unwrap()).unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.parsed, 1);
    assert_eq!(report.saved, 1);
    assert_eq!(count_deals(db.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_claim_error_waits_for_spawned_jobs() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/dealsforindia/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_with("q2", "Boat Airdopes 141 at ₹999"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let queue = ScrapeQueue::from_config(db.clone(), &config);
    let good = queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::New, 50)
        .await
        .unwrap();
    let broken = queue
        .enqueue_manual("buildapcsales", Region::World, SortMode::New, 50)
        .await
        .unwrap();

    // A row that cannot be decoded makes the second claim fail.
    sqlx::query("UPDATE scrape_jobs SET limit_count = 'lots' WHERE id = ?")
        .bind(broken)
        .execute(db.pool())
        .await
        .unwrap();

    let worker = worker_for(&config, queue.clone(), &db);
    assert!(worker.process_available().await.is_err());

    // The job claimed before the error finished instead of running detached.
    let job = queue.job(good).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Completed));
    assert_eq!(count_deals(db.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_recover_resets_running_jobs() {
    let (db, _temp_dir) = setup_db().await;
    let queue = ScrapeQueue::new(db.clone(), 3, Duration::from_secs(5));

    queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::New, 50)
        .await
        .unwrap();
    let claimed = queue.claim().await.unwrap().unwrap();

    assert_eq!(queue.recover().await.unwrap(), 1);
    let job = queue.job(claimed.id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(JobStatus::Pending));
    assert!(queue.claim().await.unwrap().is_some());
}

#[tokio::test]
async fn test_purge_keeps_recent_and_failed_jobs() {
    let (db, _temp_dir) = setup_db().await;
    let queue = ScrapeQueue::new(db.clone(), 1, Duration::ZERO);
    let report = UnitReport::default();

    for _ in 0..3 {
        let id = queue
            .enqueue_manual("dealsforindia", Region::India, SortMode::Hot, 25)
            .await
            .unwrap();
        queue.claim().await.unwrap().unwrap();
        queue.complete(id, &report).await.unwrap();
    }
    let failed = queue
        .enqueue_manual("dealsforindia", Region::India, SortMode::Hot, 25)
        .await
        .unwrap();
    queue.claim().await.unwrap().unwrap();
    assert_eq!(queue.fail(failed, "boom").await.unwrap(), JobStatus::Failed);

    assert_eq!(queue.purge(JobRetention::default()).await.unwrap(), 0);

    let retention = JobRetention {
        completed_max_count: 1,
        ..JobRetention::default()
    };
    assert_eq!(queue.purge(retention).await.unwrap(), 2);
    assert_eq!(list_scrape_jobs(db.pool(), JobStatus::Completed).await.unwrap().len(), 1);
    assert_eq!(list_scrape_jobs(db.pool(), JobStatus::Failed).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_queue_scheduler_stops_on_cancel() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;
    mount_auth(&server).await;

    let config = test_config(&server);
    let client = RedditClient::from_config(&config).unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        client,
        DealParser::offline(),
        DealStore::new(db.clone()),
    ));

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    tokio::time::timeout(
        Duration::from_secs(5),
        run_scheduler(&config, orchestrator, db.clone(), shutdown),
    )
    .await
    .expect("scheduler returns after cancellation")
    .unwrap();

    // Registration still happened before the loop observed the cancel.
    assert_eq!(list_repeat_jobs(db.pool()).await.unwrap().len(), 6);
}
