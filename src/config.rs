use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_API_BASE, DEFAULT_AUTH_URL, DEFAULT_USER_AGENT};
use crate::db::Region;
use crate::reddit::SortMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// A subreddit to scrape and the region its deals belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub region: Region,
}

impl SourceConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, region: Region) -> Self {
        Self {
            name: name.into(),
            region,
        }
    }
}

/// Which driver runs ingestion cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Single in-process timer running a full cycle on a fixed cadence.
    Timer,
    /// Durable SQLite-backed job queue with retrying workers.
    Queue,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Reddit API
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub reddit_auth_url: String,
    pub reddit_api_base: String,

    // Sources
    pub sources: Vec<SourceConfig>,

    // Database
    pub database_path: PathBuf,
    pub queue_database_path: PathBuf,

    // Scheduling
    pub scheduler: SchedulerKind,
    pub scraper_enabled: bool,
    pub scrape_interval: Duration,
    pub new_interval: Duration,
    pub rising_interval: Duration,
    pub hot_interval: Duration,
    pub source_delay: Duration,
    pub new_limit: u32,
    pub hot_limit: u32,
    pub rising_limit: u32,

    // Queue workers
    pub worker_concurrency: usize,
    pub per_sort_concurrency: usize,
    pub jobs_per_minute: u32,
    pub job_max_attempts: u32,
    pub job_backoff_base: Duration,

    // Preview image fallback
    pub preview_fetch_enabled: bool,
    pub preview_fetch_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = PathBuf::from(env_or_default("DATABASE_PATH", "./data/deals.sqlite"));
        let queue_database_path =
            optional_env("QUEUE_DATABASE_PATH").map_or_else(|| database_path.clone(), PathBuf::from);

        let mut sources = parse_source_list(&env_or_default("SOURCES_INDIA", "dealsforindia"), Region::India);
        sources.extend(parse_source_list(&env_or_default("SOURCES_WORLD", ""), Region::World));

        let scheduler = if parse_env_bool("USE_QUEUE", false)? {
            SchedulerKind::Queue
        } else {
            parse_scheduler_kind(&env_or_default("SCHEDULER", "timer"))?
        };

        Ok(Self {
            // Reddit API
            reddit_client_id: required_env("REDDIT_CLIENT_ID")?,
            reddit_client_secret: required_env("REDDIT_CLIENT_SECRET")?,
            reddit_user_agent: env_or_default("REDDIT_USER_AGENT", DEFAULT_USER_AGENT),
            reddit_auth_url: env_or_default("REDDIT_AUTH_URL", DEFAULT_AUTH_URL),
            reddit_api_base: env_or_default("REDDIT_API_BASE", DEFAULT_API_BASE),

            sources,

            database_path,
            queue_database_path,

            // Scheduling
            scheduler,
            scraper_enabled: parse_env_bool("ENABLE_SCRAPER", true)?,
            scrape_interval: Duration::from_secs(parse_env_u64("SCRAPE_INTERVAL_SECS", 1800)?),
            new_interval: Duration::from_secs(parse_env_u64("NEW_INTERVAL_SECS", 900)?),
            rising_interval: Duration::from_secs(parse_env_u64("RISING_INTERVAL_SECS", 1800)?),
            hot_interval: Duration::from_secs(parse_env_u64("HOT_INTERVAL_SECS", 3600)?),
            source_delay: Duration::from_millis(parse_env_u64("SOURCE_DELAY_MS", 2000)?),
            new_limit: parse_env_u32("NEW_LIMIT", 50)?,
            hot_limit: parse_env_u32("HOT_LIMIT", 25)?,
            rising_limit: parse_env_u32("RISING_LIMIT", 25)?,

            // Queue workers
            worker_concurrency: parse_env_usize("WORKER_CONCURRENCY", 2)?,
            per_sort_concurrency: parse_env_usize("PER_SORT_CONCURRENCY", 1)?,
            jobs_per_minute: parse_env_u32("JOBS_PER_MINUTE", 60)?,
            job_max_attempts: parse_env_u32("JOB_MAX_ATTEMPTS", 3)?,
            job_backoff_base: Duration::from_secs(parse_env_u64("JOB_BACKOFF_BASE_SECS", 5)?),

            // Preview image fallback
            preview_fetch_enabled: parse_env_bool("PREVIEW_FETCH_ENABLED", true)?,
            preview_fetch_timeout: Duration::from_millis(parse_env_u64(
                "PREVIEW_FETCH_TIMEOUT_MS",
                3000,
            )?),
        })
    }

    /// A complete configuration for tests. Endpoints point nowhere useful and
    /// are expected to be overridden with a mock server address.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            reddit_client_id: "test-client".to_string(),
            reddit_client_secret: "test-secret".to_string(),
            reddit_user_agent: "dealhunt-ingest-tests/0.1".to_string(),
            reddit_auth_url: "http://127.0.0.1:9/api/v1/access_token".to_string(),
            reddit_api_base: "http://127.0.0.1:9".to_string(),
            sources: vec![SourceConfig::new("dealsforindia", Region::India)],
            database_path: PathBuf::from("./data/test.sqlite"),
            queue_database_path: PathBuf::from("./data/test.sqlite"),
            scheduler: SchedulerKind::Timer,
            scraper_enabled: true,
            scrape_interval: Duration::from_secs(1800),
            new_interval: Duration::from_secs(900),
            rising_interval: Duration::from_secs(1800),
            hot_interval: Duration::from_secs(3600),
            source_delay: Duration::ZERO,
            new_limit: 50,
            hot_limit: 25,
            rising_limit: 25,
            worker_concurrency: 2,
            per_sort_concurrency: 1,
            jobs_per_minute: 600,
            job_max_attempts: 3,
            job_backoff_base: Duration::from_secs(5),
            preview_fetch_enabled: false,
            preview_fetch_timeout: Duration::from_millis(3000),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit_client_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "REDDIT_CLIENT_ID".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.sources.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SOURCES_INDIA/SOURCES_WORLD".to_string(),
                message: "at least one source must be configured".to_string(),
            });
        }
        if let Some(bad) = self.sources.iter().find(|s| !is_valid_source_name(&s.name)) {
            return Err(ConfigError::InvalidValue {
                name: "SOURCES".to_string(),
                message: format!("'{}' is not a valid subreddit name", bad.name),
            });
        }
        if self.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.per_sort_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PER_SORT_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.jobs_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                name: "JOBS_PER_MINUTE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.job_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "JOB_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scrape_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SCRAPE_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Default page size for a sort mode.
    #[must_use]
    pub fn limit_for(&self, sort: SortMode) -> u32 {
        match sort {
            SortMode::New => self.new_limit,
            SortMode::Hot | SortMode::Top(_) => self.hot_limit,
            SortMode::Rising => self.rising_limit,
        }
    }

    /// Find the configured region of a source, if it is configured.
    #[must_use]
    pub fn region_of(&self, source: &str) -> Option<Region> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(source))
            .map(|s| s.region)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_scheduler_kind(value: &str) -> Result<SchedulerKind, ConfigError> {
    match value.to_lowercase().as_str() {
        "timer" | "cron" => Ok(SchedulerKind::Timer),
        "queue" => Ok(SchedulerKind::Queue),
        _ => Err(ConfigError::InvalidValue {
            name: "SCHEDULER".to_string(),
            message: format!("must be 'timer' or 'queue', got '{value}'"),
        }),
    }
}

/// Split a comma-separated subreddit list, dropping blanks and `r/` prefixes.
fn parse_source_list(value: &str, region: Region) -> Vec<SourceConfig> {
    value
        .split(',')
        .map(str::trim)
        .map(|s| s.strip_prefix("r/").unwrap_or(s))
        .filter(|s| !s.is_empty())
        .map(|s| SourceConfig::new(s, region))
        .collect()
}

fn is_valid_source_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 50
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scheduler_kind() {
        assert_eq!(parse_scheduler_kind("timer").unwrap(), SchedulerKind::Timer);
        assert_eq!(parse_scheduler_kind("CRON").unwrap(), SchedulerKind::Timer);
        assert_eq!(parse_scheduler_kind("Queue").unwrap(), SchedulerKind::Queue);
        assert!(parse_scheduler_kind("bullmq").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_parse_source_list() {
        let sources = parse_source_list(" dealsforindia, r/IndianGaming ,,", Region::India);
        assert_eq!(
            sources,
            vec![
                SourceConfig::new("dealsforindia", Region::India),
                SourceConfig::new("IndianGaming", Region::India),
            ]
        );
        assert!(parse_source_list("", Region::World).is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_source_names() {
        let mut config = Config::for_testing();
        assert!(config.validate().is_ok());

        config.sources.push(SourceConfig::new("deals/../admin", Region::World));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_sources() {
        let config = Config {
            sources: Vec::new(),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_region_of() {
        let config = Config {
            sources: vec![
                SourceConfig::new("dealsforindia", Region::India),
                SourceConfig::new("deals", Region::World),
            ],
            ..Config::for_testing()
        };
        assert_eq!(config.region_of("DealsForIndia"), Some(Region::India));
        assert_eq!(config.region_of("deals"), Some(Region::World));
        assert_eq!(config.region_of("unknown"), None);
    }
}
