//! Turns forum posts into structured deal candidates.
//!
//! Parsing is heuristic: prices, discount, store and category are pulled out
//! of free text with ordered pattern tables. A post yields at most one deal.

mod classify;
mod image;
mod links;
mod prices;
mod title;

pub use classify::{detect_category, detect_store, is_non_deal_title, CATEGORY_KEYWORDS, STORE_PATTERNS};
pub use image::{
    is_low_quality, post_image, resolve_image, HttpPreviewFetcher, NoopPreviewFetcher,
    PreviewImageFetcher,
};
pub use links::{extract_product_url, is_forum_url, is_product_url, permalink_url};
pub use prices::{extract_discount, extract_price, extract_prices, parse_amount, ExtractedPrices};
pub use title::{clean_title, truncate_chars};

use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::constants::MAX_DESCRIPTION_CHARS;
use crate::db::Region;
use crate::error::ParseError;
use crate::reddit::ExternalPost;

/// A deal candidate extracted from one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeal {
    pub title: String,
    pub description: Option<String>,
    pub original_price: Option<Decimal>,
    pub deal_price: Option<Decimal>,
    pub currency: String,
    pub discount_percent: Option<u8>,
    pub product_url: String,
    pub image_url: Option<String>,
    pub store: Option<String>,
    pub category_slug: String,
    pub external_post_id: String,
    pub external_score: i64,
}

/// Post parser with an injectable preview-image lookup.
#[derive(Clone)]
pub struct DealParser {
    fetcher: Arc<dyn PreviewImageFetcher>,
}

impl DealParser {
    #[must_use]
    pub fn new(fetcher: Arc<dyn PreviewImageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Parser that never leaves the process.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(Arc::new(NoopPreviewFetcher))
    }

    /// Parse one post.
    ///
    /// Returns `Ok(None)` for posts that are not deals (requests, discussion)
    /// and for posts with nothing actionable: no price, no discount and no
    /// link other than the post itself.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the post is missing its identifier or title.
    pub async fn parse(
        &self,
        post: &ExternalPost,
        region: Region,
    ) -> Result<Option<ParsedDeal>, ParseError> {
        if post.id.trim().is_empty() {
            return Err(ParseError::new(&post.fullname, "post has no identifier"));
        }
        if post.title.trim().is_empty() {
            return Err(ParseError::new(&post.id, "post has no title"));
        }

        if is_non_deal_title(&post.title) {
            debug!(post_id = %post.id, title = %post.title, "Skipping non-deal post");
            return Ok(None);
        }

        let full_text = format!("{} {}", post.title, post.body);

        let product_url = extract_product_url(post);
        let prices = extract_prices(&full_text);
        let discount_percent = extract_discount(&full_text, prices.deal_price, prices.original_price);

        if prices.deal_price.is_none() && discount_percent.is_none() && is_forum_url(&product_url) {
            debug!(post_id = %post.id, title = %post.title, "Skipping post with no deal info");
            return Ok(None);
        }

        let store = detect_store(&product_url).map(str::to_string);
        let category_slug = detect_category(&full_text).to_string();
        let image_url = resolve_image(post, &product_url, self.fetcher.as_ref()).await;

        let description = (!post.body.trim().is_empty())
            .then(|| truncate_chars(&post.body, MAX_DESCRIPTION_CHARS));

        Ok(Some(ParsedDeal {
            title: clean_title(&post.title),
            description,
            original_price: prices.original_price,
            deal_price: prices.deal_price,
            currency: prices
                .currency
                .unwrap_or_else(|| region.default_currency())
                .to_string(),
            discount_percent,
            product_url,
            image_url,
            store,
            category_slug,
            external_post_id: post.id.clone(),
            external_score: post.score,
        }))
    }

    /// Parse a batch concurrently, preserving input order.
    ///
    /// A post that fails to parse is logged and left out; it never affects
    /// the rest of the batch.
    pub async fn parse_many(&self, posts: &[ExternalPost], region: Region) -> Vec<ParsedDeal> {
        let results = join_all(posts.iter().map(|post| self.parse(post, region))).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(deal) => deal,
                Err(e) => {
                    warn!(post_id = %e.post_id, "Failed to parse post: {}", e.message);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// A self post with no price and no link.
    pub(crate) fn post(id: &str, title: &str) -> ExternalPost {
        ExternalPost {
            id: id.to_string(),
            fullname: format!("t3_{id}"),
            title: title.to_string(),
            body: String::new(),
            url: None,
            permalink: format!("/r/dealsforindia/comments/{id}/post/"),
            is_self: true,
            score: 10,
            created_at: Utc::now(),
            preview_images: Vec::new(),
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_full_parse() {
        let mut p = post("abc", "🔥 HUGE DEAL: Sony WH-1000XM5 headphones ₹19,990 (MRP ₹34,990)");
        p.body = "Grab it here https://www.amazon.in/dp/B0XYZ before it ends".to_string();
        p.score = 42;

        let deal = DealParser::offline().parse(&p, Region::India).await.unwrap().unwrap();
        assert_eq!(deal.title, "Sony WH-1000XM5 headphones ₹19,990 (MRP ₹34,990)");
        assert_eq!(deal.deal_price, Some(dec!(19990)));
        assert_eq!(deal.original_price, Some(dec!(34990)));
        assert_eq!(deal.discount_percent, Some(43));
        assert_eq!(deal.currency, "INR");
        assert_eq!(deal.product_url, "https://www.amazon.in/dp/B0XYZ");
        assert_eq!(deal.store.as_deref(), Some("Amazon"));
        assert_eq!(deal.category_slug, "electronics");
        assert_eq!(deal.external_post_id, "abc");
        assert_eq!(deal.external_score, 42);
        assert!(deal.description.is_some());
    }

    #[tokio::test]
    async fn test_question_is_skipped() {
        let p = post("q1", "[Question] which laptop should I buy?");
        assert_eq!(DealParser::offline().parse(&p, Region::India).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_rule_boundary() {
        let parser = DealParser::offline();

        // No price, no discount, only the permalink: dropped.
        let p = post("d1", "Nice shoes spotted today");
        assert_eq!(parser.parse(&p, Region::India).await.unwrap(), None);

        // Same post linking to a store is kept even without a price.
        let mut linked = p.clone();
        linked.is_self = false;
        linked.url = Some("https://www.myntra.com/shoes/1".to_string());
        let deal = parser.parse(&linked, Region::India).await.unwrap().unwrap();
        assert_eq!(deal.deal_price, None);
        assert_eq!(deal.store.as_deref(), Some("Myntra"));

        // A discount alone also keeps a permalink-only post.
        let discounted = post("d2", "Flat 50% off on all shoes today");
        let deal = parser.parse(&discounted, Region::India).await.unwrap().unwrap();
        assert_eq!(deal.discount_percent, Some(50));
        assert!(is_forum_url(&deal.product_url));
    }

    #[tokio::test]
    async fn test_currency_defaults_to_region() {
        let mut p = post("w1", "Monitor arm half off");
        p.is_self = false;
        p.url = Some("https://www.newegg.com/p/1".to_string());
        let deal = DealParser::offline().parse(&p, Region::World).await.unwrap().unwrap();
        assert_eq!(deal.currency, "USD");

        let deal = DealParser::offline().parse(&p, Region::India).await.unwrap().unwrap();
        assert_eq!(deal.currency, "INR");
    }

    #[tokio::test]
    async fn test_missing_id_is_parse_error() {
        let p = post("", "Laptop ₹40,000");
        assert!(DealParser::offline().parse(&p, Region::India).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_many_isolates_failures() {
        let good = {
            let mut p = post("g1", "Laptop stand ₹899");
            p.body = "https://www.flipkart.com/stand".to_string();
            p
        };
        let broken = post("", "Charger ₹499");
        let skipped = post("s1", "Looking for a trimmer");
        let also_good = post("g2", "Mixer grinder Rs 2,499");

        let deals = DealParser::offline()
            .parse_many(&[good, broken, skipped, also_good], Region::India)
            .await;
        let ids: Vec<_> = deals.iter().map(|d| d.external_post_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2"]);
    }
}
