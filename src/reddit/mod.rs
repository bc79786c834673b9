//! Reddit API access: token cache, listing client and wire types.

mod auth;
mod client;
mod models;

pub use auth::{Credential, CredentialCache};
pub use client::{ListingOptions, RedditClient};
pub use models::{
    ExternalPost, ImageVariant, Listing, PreviewImage, RawPost, SortMode, TimeWindow,
};
