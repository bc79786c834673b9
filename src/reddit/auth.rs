//! Cached client-credentials token for the Reddit API.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use super::models::TokenResponse;
use crate::constants::TOKEN_EXPIRY_MARGIN_SECS;
use crate::error::ClientError;

/// A bearer token and the instant after which it must not be used.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token lifetime, applying the safety margin.
    #[must_use]
    pub fn from_ttl(access_token: String, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            access_token,
            expires_at: now + ChronoDuration::seconds(expires_in_secs - TOKEN_EXPIRY_MARGIN_SECS),
        }
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-lifetime cache of the API bearer token.
///
/// Reads take a shared lock. Refreshes are serialized through a separate mutex
/// and re-check the cache once acquired, so concurrent callers that all see an
/// expired token trigger exactly one exchange.
#[derive(Debug)]
pub struct CredentialCache {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    user_agent: String,
    cached: RwLock<Option<Credential>>,
    refresh: Mutex<()>,
}

impl CredentialCache {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_agent: user_agent.into(),
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return a valid bearer token, exchanging credentials only when the
    /// cached one is missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthFailure`] if the exchange is rejected. The
    /// exchange is not retried here.
    pub async fn access_token(&self) -> Result<String, ClientError> {
        if let Some(token) = self.valid_cached().await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_cached().await {
            return Ok(token);
        }

        let credential = self.exchange().await?;
        let token = credential.access_token.clone();
        *self.cached.write().await = Some(credential);
        Ok(token)
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn valid_cached(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| c.is_valid_at(Utc::now()))
            .map(|c| c.access_token.clone())
    }

    async fn exchange(&self) -> Result<Credential, ClientError> {
        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Failed to get Reddit access token");
            return Err(ClientError::AuthFailure {
                status: status.as_u16(),
            });
        }

        let token: TokenResponse = response.json().await?;
        info!(expires_in = token.expires_in, "Reddit OAuth token refreshed");
        Ok(Credential::from_ttl(token.access_token, token.expires_in, Utc::now()))
    }
}
