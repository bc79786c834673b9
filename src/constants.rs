//! Shared constants used across the application.

/// User agent sent to the Reddit API when none is configured.
pub const DEFAULT_USER_AGENT: &str = "DealHunt/1.0";

/// OAuth2 token endpoint for the client-credentials grant.
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Base URL for authenticated API calls.
pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";

/// Prefix used to build a post permalink when no product link exists.
pub const FORUM_BASE_URL: &str = "https://reddit.com";

/// User agent for product page fetches (preview image fallback).
///
/// Many storefronts only serve Open Graph tags to crawlers they recognise.
pub const PREVIEW_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// Seconds shaved off a token's lifetime so it is refreshed before it expires.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Maximum stored length of a cleaned deal title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum stored length of a deal description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Origin tag for price samples observed while scraping.
pub const PRICE_ORIGIN_SCRAPE: &str = "reddit_scrape";

/// Category slug every deal falls back to.
pub const FALLBACK_CATEGORY: &str = "other";
