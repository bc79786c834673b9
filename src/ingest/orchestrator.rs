use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::persist::DealStore;
use crate::config::{Config, SourceConfig};
use crate::db::Region;
use crate::error::ClientError;
use crate::parser::DealParser;
use crate::reddit::{ExternalPost, ListingOptions, RedditClient, SortMode};

/// Counts for one fetch-parse-persist unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub fetched: usize,
    pub parsed: usize,
    pub saved: usize,
}

impl std::ops::AddAssign for UnitReport {
    fn add_assign(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.parsed += other.parsed;
        self.saved += other.saved;
    }
}

/// Aggregate result of one ingestion cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub totals: UnitReport,
    pub sources_ok: usize,
    pub sources_skipped: usize,
    pub elapsed: Duration,
}

/// Clears the running flag when the cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives fetch, parse and persist across the configured sources.
///
/// Both schedulers share one instance: the timer calls [`Self::run_cycle`],
/// queue workers call [`Self::ingest_listing`].
pub struct Orchestrator {
    client: RedditClient,
    parser: DealParser,
    store: DealStore,
    sources: Vec<SourceConfig>,
    new_limit: u32,
    hot_limit: u32,
    source_delay: Duration,
    running: AtomicBool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: &Config, client: RedditClient, parser: DealParser, store: DealStore) -> Self {
        Self {
            client,
            parser,
            store,
            sources: config.sources.clone(),
            new_limit: config.new_limit,
            hot_limit: config.hot_limit,
            source_delay: config.source_delay,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn client(&self) -> &RedditClient {
        &self.client
    }

    #[must_use]
    pub fn store(&self) -> &DealStore {
        &self.store
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one full cycle over every source, region by region.
    ///
    /// Returns `None` without doing any work if a cycle is already running.
    /// A failing source is logged and skipped; it never ends the cycle.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Scrape already in progress, skipping");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let start = Instant::now();
        info!(sources = self.sources.len(), "Starting deal scrape");

        let mut report = CycleReport::default();
        let ordered: Vec<&SourceConfig> = [Region::India, Region::World]
            .into_iter()
            .flat_map(|region| self.sources.iter().filter(move |s| s.region == region))
            .collect();

        for (i, source) in ordered.into_iter().enumerate() {
            if i > 0 && !self.source_delay.is_zero() {
                tokio::time::sleep(self.source_delay).await;
            }

            match self.process_source(source).await {
                Ok(Some(unit)) => {
                    report.totals += unit;
                    report.sources_ok += 1;
                }
                Ok(None) => report.sources_skipped += 1,
                Err(e) => {
                    warn!(source = %source.name, "Failed to scrape subreddit: {e}");
                    report.sources_skipped += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            fetched = report.totals.fetched,
            parsed = report.totals.parsed,
            saved = report.totals.saved,
            sources_ok = report.sources_ok,
            sources_skipped = report.sources_skipped,
            duration_secs = report.elapsed.as_secs_f64(),
            "Scrape complete"
        );
        Some(report)
    }

    /// Scrape one source: newest posts since the cursor plus the hot listing.
    ///
    /// Returns `Ok(None)` when the source fails validation.
    async fn process_source(&self, source: &SourceConfig) -> Result<Option<UnitReport>, ClientError> {
        if !self.client.validate_source(&source.name).await {
            warn!(source = %source.name, "Skipping invalid subreddit");
            return Ok(None);
        }

        let cursor = self.load_cursor(&source.name).await;
        let new_opts = ListingOptions::new(SortMode::New, self.new_limit).before(cursor);
        let hot_opts = ListingOptions::new(SortMode::Hot, self.hot_limit);

        let (newest, hot) = tokio::join!(
            self.client.fetch_listing(&source.name, &new_opts),
            self.client.fetch_listing(&source.name, &hot_opts),
        );
        let newest = newest?;
        let hot = hot?;

        let newest_cursor = newest.first().map(|p| p.fullname.clone());
        let merged = merge_posts(newest, hot);
        info!(source = %source.name, posts = merged.len(), "Fetched posts");

        let unit = self.parse_and_save(&merged, source.region).await;
        info!(
            source = %source.name,
            parsed = unit.parsed,
            saved = unit.saved,
            "Saved deals to database"
        );

        if let Some(cursor) = newest_cursor {
            self.store_cursor(&source.name, &cursor).await;
        }

        Ok(Some(unit))
    }

    /// One fetch-parse-persist unit for a single listing.
    ///
    /// The newest listing reads from and advances the source's cursor; other
    /// sorts are fetched in full every time.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the listing cannot be fetched.
    pub async fn ingest_listing(
        &self,
        source: &str,
        region: Region,
        sort: SortMode,
        limit: u32,
    ) -> Result<UnitReport, ClientError> {
        let cursor = if sort.supports_cursor() {
            self.load_cursor(source).await
        } else {
            None
        };
        let options = ListingOptions::new(sort, limit).before(cursor);

        let posts = self.client.fetch_listing(source, &options).await?;
        let unit = self.parse_and_save(&posts, region).await;

        if sort.supports_cursor() {
            if let Some(newest) = posts.first() {
                self.store_cursor(source, &newest.fullname).await;
            }
        }

        Ok(unit)
    }

    /// Ingest the results of a subreddit search. Does not touch the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the search fails.
    pub async fn ingest_search(
        &self,
        source: &str,
        region: Region,
        query: &str,
        limit: u32,
    ) -> Result<UnitReport, ClientError> {
        let posts = self.client.search(source, query, limit).await?;
        Ok(self.parse_and_save(&posts, region).await)
    }

    async fn parse_and_save(&self, posts: &[ExternalPost], region: Region) -> UnitReport {
        let deals = self.parser.parse_many(posts, region).await;
        let saved = self.store.save_all(&deals, region).await;
        UnitReport {
            fetched: posts.len(),
            parsed: deals.len(),
            saved,
        }
    }

    async fn load_cursor(&self, source: &str) -> Option<String> {
        match self.store.cursor(source).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(source, "Failed to read cursor, fetching without one: {e}");
                None
            }
        }
    }

    async fn store_cursor(&self, source: &str, cursor: &str) {
        match self.store.advance_cursor(source, cursor).await {
            Ok(()) => debug!(source, cursor, "Advanced cursor"),
            Err(e) => warn!(source, "Failed to advance cursor: {e}"),
        }
    }
}

/// Concatenate listings and drop repeated posts, keeping the first
/// occurrence and the original order.
#[must_use]
pub fn merge_posts(first: Vec<ExternalPost>, second: Vec<ExternalPost>) -> Vec<ExternalPost> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|post| seen.insert(post.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::post;

    #[test]
    fn test_merge_keeps_first_occurrence() {
        let mut newer = post("b", "From new");
        newer.score = 1;
        let mut hot_copy = post("b", "From hot");
        hot_copy.score = 99;

        let merged = merge_posts(
            vec![post("a", "A"), newer],
            vec![hot_copy, post("c", "C"), post("a", "A again")],
        );

        let ids: Vec<_> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[1].title, "From new");
        assert_eq!(merged[1].score, 1);
    }

    #[test]
    fn test_unit_report_accumulates() {
        let mut total = UnitReport::default();
        total += UnitReport { fetched: 3, parsed: 2, saved: 1 };
        total += UnitReport { fetched: 5, parsed: 4, saved: 4 };
        assert_eq!(total, UnitReport { fetched: 8, parsed: 6, saved: 5 });
    }
}
