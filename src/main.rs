use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dealhunt_ingest::config::Config;
use dealhunt_ingest::db::{Database, Region};
use dealhunt_ingest::ingest::{DealStore, Orchestrator};
use dealhunt_ingest::parser::{DealParser, HttpPreviewFetcher};
use dealhunt_ingest::reddit::{RedditClient, SortMode};
use dealhunt_ingest::scheduler::{run_scheduler, ScrapeQueue};

#[derive(Parser, Debug)]
#[command(name = "dealhunt-ingest", version, about = "Reddit deal ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the configured scheduler and run until interrupted (default)
    Run,
    /// Run exactly one ingestion cycle over all sources and exit
    ScrapeOnce,
    /// Add a one-off scrape job to the durable queue
    Enqueue {
        /// Subreddit to scrape
        #[arg(long)]
        source: String,
        /// Listing sort: new, hot, rising or top
        #[arg(long, default_value = "new", value_parser = parse_sort)]
        sort: SortMode,
        /// Page size; defaults to the configured limit for the sort
        #[arg(long)]
        limit: Option<u32>,
        /// Region for the resulting deals; defaults to the source's configured region
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,
    },
    /// Search a subreddit and ingest the matching posts
    Search {
        #[arg(long)]
        source: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,
    },
    /// Check whether a subreddit exists and is readable
    Validate {
        #[arg(long)]
        source: String,
    },
}

fn parse_sort(s: &str) -> Result<SortMode, String> {
    SortMode::parse(s).ok_or_else(|| format!("unknown sort '{s}'"))
}

fn parse_region(s: &str) -> Result<Region, String> {
    Region::from_str(s).ok_or_else(|| format!("unknown region '{s}' (expected INDIA or WORLD)"))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let sources: Vec<String> = config
        .sources
        .iter()
        .map(|s| format!("{}:{}", s.region, s.name))
        .collect();
    info!(?sources, scheduler = ?config.scheduler, "Configuration loaded");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => serve(config).await,
        Command::ScrapeOnce => scrape_once(&config).await,
        Command::Enqueue {
            source,
            sort,
            limit,
            region,
        } => {
            let region = region_for(&config, &source, region);
            let limit = limit.unwrap_or_else(|| config.limit_for(sort));
            let queue_db = open_database(&config.queue_database_path).await?;
            let queue = ScrapeQueue::from_config(queue_db, &config);
            let id = queue.enqueue_manual(&source, region, sort, limit).await?;
            println!("queued job {id}: r/{source} {sort} limit={limit} region={region}");
            Ok(())
        }
        Command::Search {
            source,
            query,
            limit,
            region,
        } => {
            let region = region_for(&config, &source, region);
            let (orchestrator, _) = build_pipeline(&config).await?;
            let report = orchestrator
                .ingest_search(&source, region, &query, limit)
                .await
                .with_context(|| format!("Search of r/{source} failed"))?;
            println!(
                "fetched={} parsed={} saved={}",
                report.fetched, report.parsed, report.saved
            );
            Ok(())
        }
        Command::Validate { source } => {
            let client = RedditClient::from_config(&config)?;
            if client.validate_source(&source).await {
                println!("r/{source} is accessible");
                Ok(())
            } else {
                anyhow::bail!("r/{source} is not accessible")
            }
        }
    }
}

/// Run the configured scheduler until SIGINT/SIGTERM, then drain.
async fn serve(config: Config) -> Result<()> {
    if !config.scraper_enabled {
        warn!("Scraper disabled (ENABLE_SCRAPER=false), nothing to run");
        shutdown_signal().await;
        return Ok(());
    }

    let (orchestrator, db) = build_pipeline(&config).await?;
    let queue_db = if config.queue_database_path == config.database_path {
        db
    } else {
        open_database(&config.queue_database_path).await?
    };

    let shutdown = CancellationToken::new();
    let scheduler_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_scheduler(&config, orchestrator, queue_db, shutdown).await })
    };
    info!("Scheduler started");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down, waiting for in-flight work...");
    shutdown.cancel();

    match scheduler_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Scheduler error: {e:#}"),
        Err(e) => error!("Scheduler task panicked: {e}"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn scrape_once(config: &Config) -> Result<()> {
    let (orchestrator, _) = build_pipeline(config).await?;
    match orchestrator.run_cycle().await {
        Some(report) => {
            println!(
                "sources_ok={} sources_skipped={} fetched={} parsed={} saved={} elapsed={:.1}s",
                report.sources_ok,
                report.sources_skipped,
                report.totals.fetched,
                report.totals.parsed,
                report.totals.saved,
                report.elapsed.as_secs_f64()
            );
        }
        None => println!("a cycle is already running"),
    }
    Ok(())
}

fn region_for(config: &Config, source: &str, explicit: Option<Region>) -> Region {
    explicit
        .or_else(|| config.region_of(source))
        .unwrap_or(Region::India)
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    Database::new(path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", path.display()))
}

async fn build_pipeline(config: &Config) -> Result<(Arc<Orchestrator>, Database)> {
    let db = open_database(&config.database_path).await?;
    info!("Database initialized");

    let client = RedditClient::from_config(config)?;

    let parser = if config.preview_fetch_enabled {
        let fetcher = HttpPreviewFetcher::new(config.preview_fetch_timeout)?;
        DealParser::new(Arc::new(fetcher))
    } else {
        info!("Preview image fetching disabled");
        DealParser::offline()
    };

    let store = DealStore::new(db.clone());
    let orchestrator = Arc::new(Orchestrator::new(config, client, parser, store));
    Ok((orchestrator, db))
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dealhunt_ingest=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
