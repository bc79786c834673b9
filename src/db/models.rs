use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market a source and its deals belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    India,
    World,
}

impl Region {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::India => "INDIA",
            Self::World => "WORLD",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INDIA" => Some(Self::India),
            "WORLD" => Some(Self::World),
            _ => None,
        }
    }

    /// Currency assumed when a post carries no recognisable price.
    #[must_use]
    pub fn default_currency(&self) -> &'static str {
        match self {
            Self::India => "INR",
            Self::World => "USD",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a deal record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealSource {
    /// Harvested from a forum post.
    Reddit,
    /// Submitted directly by a user.
    User,
}

impl DealSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reddit => "reddit",
            Self::User => "user",
        }
    }
}

/// A deal category.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// A persisted deal.
///
/// Prices are stored as canonical decimal text; use the accessors to read
/// them as [`Decimal`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deal {
    pub id: i64,
    pub source: String,
    pub region: String,
    pub external_post_id: String,
    pub title: String,
    pub description: Option<String>,
    pub original_price: Option<String>,
    pub deal_price: Option<String>,
    pub currency: String,
    pub discount_percent: Option<i64>,
    pub product_url: String,
    pub image_url: Option<String>,
    pub store: Option<String>,
    pub category_id: i64,
    pub external_score: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub clicks: i64,
    pub is_active: bool,
    pub refresh_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Deal {
    #[must_use]
    pub fn deal_price(&self) -> Option<Decimal> {
        self.deal_price.as_deref().and_then(|p| Decimal::from_str(p).ok())
    }

    #[must_use]
    pub fn original_price(&self) -> Option<Decimal> {
        self.original_price
            .as_deref()
            .and_then(|p| Decimal::from_str(p).ok())
    }

    #[must_use]
    pub fn region(&self) -> Option<Region> {
        Region::from_str(&self.region)
    }
}

/// Fields for creating a deal. On refresh only title, description and
/// score are applied.
#[derive(Debug, Clone)]
pub struct NewDeal {
    pub source: DealSource,
    pub region: Region,
    pub external_post_id: String,
    pub title: String,
    pub description: Option<String>,
    pub original_price: Option<Decimal>,
    pub deal_price: Option<Decimal>,
    pub currency: String,
    pub discount_percent: Option<u8>,
    pub product_url: String,
    pub image_url: Option<String>,
    pub store: Option<String>,
    pub category_id: i64,
    pub external_score: i64,
}

/// Result of an upsert by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    /// True when the row did not exist before.
    pub created: bool,
}

/// One observed price for a deal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceHistory {
    pub id: i64,
    pub deal_id: i64,
    pub price: String,
    pub source: String,
    pub created_at: String,
}

impl PriceHistory {
    #[must_use]
    pub fn price(&self) -> Option<Decimal> {
        Decimal::from_str(&self.price).ok()
    }
}

/// Queue job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A recurring job definition. `job_key` is deterministic so registering the
/// same definition twice updates it in place.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RepeatJob {
    pub job_key: String,
    pub name: String,
    pub source: String,
    pub region: String,
    pub sort: String,
    pub limit_count: i64,
    pub interval_secs: i64,
    pub next_run_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for registering a recurring job.
#[derive(Debug, Clone)]
pub struct NewRepeatJob {
    pub job_key: String,
    pub name: String,
    pub source: String,
    pub region: Region,
    pub sort: String,
    pub limit_count: u32,
    pub interval_secs: u64,
}

/// One queued scrape invocation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScrapeJob {
    pub id: i64,
    pub job_key: Option<String>,
    pub name: String,
    pub source: String,
    pub region: String,
    pub sort: String,
    pub limit_count: i64,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_at: String,
    pub last_error: Option<String>,
    pub result_json: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl ScrapeJob {
    #[must_use]
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }
}

/// Parameters for a one-off job.
#[derive(Debug, Clone)]
pub struct NewScrapeJob {
    pub job_key: Option<String>,
    pub name: String,
    pub source: String,
    pub region: Region,
    pub sort: String,
    pub limit_count: u32,
    pub max_attempts: u32,
}
