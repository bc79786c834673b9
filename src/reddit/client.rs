use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::auth::CredentialCache;
use super::models::{AboutResponse, ExternalPost, Listing, RawPost, SortMode};
use crate::config::Config;
use crate::error::ClientError;

/// Parameters for one listing request.
#[derive(Debug, Clone)]
pub struct ListingOptions {
    pub sort: SortMode,
    pub limit: u32,
    /// Only return items newer than this fullname.
    pub before: Option<String>,
}

impl ListingOptions {
    #[must_use]
    pub fn new(sort: SortMode, limit: u32) -> Self {
        Self {
            sort,
            limit,
            before: None,
        }
    }

    #[must_use]
    pub fn before(mut self, cursor: Option<String>) -> Self {
        self.before = cursor;
        self
    }
}

/// Authenticated client for subreddit listings.
///
/// Cheap to clone; clones share the HTTP pool and the token cache.
#[derive(Debug, Clone)]
pub struct RedditClient {
    http: reqwest::Client,
    api_base: String,
    user_agent: String,
    credentials: Arc<CredentialCache>,
}

impl RedditClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        user_agent: impl Into<String>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            credentials,
        }
    }

    /// Build a client and its token cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        // Listing calls rely on the transport's default timeouts.
        let http = reqwest::Client::builder()
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        let credentials = Arc::new(CredentialCache::new(
            http.clone(),
            &config.reddit_auth_url,
            &config.reddit_client_id,
            &config.reddit_client_secret,
            &config.reddit_user_agent,
        ));

        Ok(Self::new(
            http,
            &config.reddit_api_base,
            &config.reddit_user_agent,
            credentials,
        ))
    }

    /// Fetch one page of posts from a subreddit, in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthFailure`] if a token cannot be obtained,
    /// [`ClientError::FetchFailure`] on a non-success status, and
    /// [`ClientError::InvalidPayload`] if the body is not a listing.
    pub async fn fetch_listing(
        &self,
        source: &str,
        options: &ListingOptions,
    ) -> Result<Vec<ExternalPost>, ClientError> {
        let mut query: Vec<(&str, String)> = vec![
            ("limit", options.limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(before) = &options.before {
            query.push(("before", before.clone()));
        }
        if let SortMode::Top(window) = options.sort {
            query.push(("t", window.as_str().to_string()));
        }

        let url = format!("{}/r/{source}/{}", self.api_base, options.sort.as_str());
        let posts = self.get_listing(source, &url, &query).await?;

        debug!(
            source,
            sort = %options.sort,
            cursor = options.before.as_deref().unwrap_or(""),
            count = posts.len(),
            "Fetched listing"
        );
        Ok(posts)
    }

    /// Search a subreddit for posts matching `query`, newest first.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::fetch_listing`].
    pub async fn search(
        &self,
        source: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<ExternalPost>, ClientError> {
        let params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("restrict_sr", "true".to_string()),
            ("limit", limit.to_string()),
            ("sort", "new".to_string()),
            ("raw_json", "1".to_string()),
        ];
        let url = format!("{}/r/{source}/search", self.api_base);
        self.get_listing(source, &url, &params).await
    }

    /// Check that a subreddit exists and is readable.
    ///
    /// Never fails: private, banned, missing, or unreachable subreddits all
    /// yield `false` so the caller can skip them and carry on.
    pub async fn validate_source(&self, source: &str) -> bool {
        match self.fetch_about(source).await {
            Ok(about) => {
                if about.kind != "t5" {
                    warn!(source, kind = %about.kind, "Invalid subreddit response");
                    return false;
                }
                let sub_type = about.data.and_then(|d| d.subreddit_type);
                if sub_type.as_deref() == Some("private") {
                    warn!(source, "Subreddit is private, skipping");
                    return false;
                }
                info!(source, sub_type = sub_type.as_deref().unwrap_or("unknown"), "Subreddit validated");
                true
            }
            Err(ClientError::FetchFailure { status, .. }) => {
                warn!(source, status, "Subreddit validation failed");
                false
            }
            Err(e) => {
                warn!(source, "Failed to validate subreddit: {e}");
                false
            }
        }
    }

    async fn fetch_about(&self, source: &str) -> Result<AboutResponse, ClientError> {
        let url = format!("{}/r/{source}/about", self.api_base);
        let response = self.authorized_get(&url, &[]).await?;
        check_status(source, response.status())?;
        response
            .json::<AboutResponse>()
            .await
            .map_err(|e| ClientError::InvalidPayload {
                subreddit: source.to_string(),
                message: e.to_string(),
            })
    }

    async fn get_listing(
        &self,
        source: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<ExternalPost>, ClientError> {
        let response = self.authorized_get(url, query).await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Token revoked early; force a fresh exchange on the next call.
            self.credentials.invalidate().await;
        }
        check_status(source, status)?;

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload {
                subreddit: source.to_string(),
                message: e.to_string(),
            })?;

        decode_listing(source, listing)
    }

    async fn authorized_get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ClientError> {
        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(query)
            .send()
            .await?;
        Ok(response)
    }
}

fn check_status(source: &str, status: StatusCode) -> Result<(), ClientError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ClientError::FetchFailure {
            subreddit: source.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Turn a listing envelope into posts, dropping children that are not link
/// posts or do not decode.
fn decode_listing(source: &str, listing: Listing) -> Result<Vec<ExternalPost>, ClientError> {
    if listing.kind != "Listing" {
        return Err(ClientError::InvalidPayload {
            subreddit: source.to_string(),
            message: format!("expected Listing, got {}", listing.kind),
        });
    }

    let mut posts = Vec::with_capacity(listing.data.children.len());
    for child in listing.data.children {
        if child.kind != "t3" {
            debug!(source, kind = %child.kind, "Ignoring non-post listing child");
            continue;
        }
        match serde_json::from_value::<RawPost>(child.data) {
            Ok(raw) if !raw.id.is_empty() => posts.push(ExternalPost::from(raw)),
            Ok(_) => warn!(source, "Dropping post with empty id"),
            Err(e) => warn!(source, "Dropping malformed post: {e}"),
        }
    }
    Ok(posts)
}
