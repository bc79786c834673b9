//! Error taxonomy for the ingestion pipeline.
//!
//! Each variant maps to a different recovery policy: auth and fetch failures
//! skip the current source, parse errors skip one post, persistence conflicts
//! are benign, and other persistence failures drop one deal.

use thiserror::Error;

/// Errors raised while talking to the external listing API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client-credentials exchange was rejected.
    #[error("credential exchange rejected with status {status}")]
    AuthFailure { status: u16 },

    /// A listing or validation call returned a non-success status.
    #[error("fetch from r/{subreddit} failed with status {status}")]
    FetchFailure { subreddit: String, status: u16 },

    /// The response body did not match the expected shape.
    #[error("invalid payload from r/{subreddit}: {message}")]
    InvalidPayload { subreddit: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether this error came from the token exchange.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }
}

/// A single post could not be turned into a deal candidate.
#[derive(Debug, Error)]
#[error("failed to parse post {post_id}: {message}")]
pub struct ParseError {
    pub post_id: String,
    pub message: String,
}

impl ParseError {
    pub fn new(post_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the persistence adapter.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Another writer inserted the same natural key first.
    #[error("unique constraint race on {0}")]
    Conflict(String),

    #[error(transparent)]
    Failure(anyhow::Error),
}

impl From<anyhow::Error> for PersistenceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Self::Conflict(db_err.message().to_string())
            }
            _ => Self::Failure(err),
        }
    }
}
