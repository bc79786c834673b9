use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    New,
    Hot,
    Rising,
    Top(TimeWindow),
}

/// Time window for the `top` sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl SortMode {
    /// Path segment used by the listing endpoint.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Hot => "hot",
            Self::Rising => "rising",
            Self::Top(_) => "top",
        }
    }

    /// Parse a sort name. `top` defaults to the daily window.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "new" | "newest" => Some(Self::New),
            "hot" | "hottest" => Some(Self::Hot),
            "rising" => Some(Self::Rising),
            "top" => Some(Self::Top(TimeWindow::Day)),
            _ => None,
        }
    }

    /// Only the newest listing is ordered strictly by time, so only it can
    /// be paged incrementally with a `before` cursor.
    #[must_use]
    pub fn supports_cursor(&self) -> bool {
        matches!(self, Self::New)
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image variant in a post preview.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageVariant {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// A preview image with its full-size source and scaled resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreviewImage {
    pub source: ImageVariant,
    #[serde(default)]
    pub resolutions: Vec<ImageVariant>,
}

/// A post as fetched from a listing. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPost {
    /// Short identifier (`abc123`).
    pub id: String,
    /// Fullname (`t3_abc123`), used as the pagination cursor.
    pub fullname: String,
    pub title: String,
    pub body: String,
    /// Link target. For self posts this points back at the post itself.
    pub url: Option<String>,
    pub permalink: String,
    pub is_self: bool,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub preview_images: Vec<PreviewImage>,
    pub thumbnail: Option<String>,
}

// ========== Wire types ==========

/// Top-level listing envelope (`kind: "Listing"`).
#[derive(Debug, Deserialize)]
pub struct Listing {
    pub kind: String,
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
    pub after: Option<String>,
    pub before: Option<String>,
}

/// A tagged child of a listing. The payload is decoded per kind.
#[derive(Debug, Deserialize)]
pub struct Thing {
    pub kind: String,
    pub data: serde_json::Value,
}

/// Link post (`kind: "t3"`) fields we rely on.
#[derive(Debug, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub url: Option<String>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
    pub thumbnail: Option<String>,
    pub preview: Option<RawPreview>,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawPreview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

impl From<RawPost> for ExternalPost {
    fn from(raw: RawPost) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let created_at = Utc
            .timestamp_opt(raw.created_utc as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: raw.id,
            fullname: raw.name,
            title: raw.title,
            body: raw.selftext,
            url: raw.url.filter(|u| !u.is_empty()),
            permalink: raw.permalink,
            is_self: raw.is_self,
            score: raw.score,
            created_at,
            preview_images: raw.preview.map(|p| p.images).unwrap_or_default(),
            thumbnail: raw.thumbnail.filter(|t| !t.is_empty()),
        }
    }
}

/// Subreddit "about" response (`kind: "t5"`).
#[derive(Debug, Deserialize)]
pub struct AboutResponse {
    pub kind: String,
    pub data: Option<AboutData>,
}

#[derive(Debug, Deserialize)]
pub struct AboutData {
    pub subreddit_type: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}
