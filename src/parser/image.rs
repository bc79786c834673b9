use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::links::is_product_url;
use crate::constants::PREVIEW_USER_AGENT;
use crate::og_extractor::extract_preview_image;
use crate::reddit::ExternalPost;

/// Preferred width range for a preview resolution.
const PREFERRED_WIDTH: std::ops::RangeInclusive<u32> = 300..=800;

/// Fragments of forum-hosted images that are too low quality to show.
const LOW_QUALITY_MARKERS: &[&str] = &["external-preview", "redditmedia"];

/// Looks up a display image for a product page.
///
/// Implementations must be best-effort: any failure yields `None`.
#[async_trait]
pub trait PreviewImageFetcher: Send + Sync {
    async fn fetch_preview_image(&self, page_url: &str) -> Option<String>;
}

/// Fetches the page and reads its social preview tags.
pub struct HttpPreviewFetcher {
    http: reqwest::Client,
}

impl HttpPreviewFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(PREVIEW_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PreviewImageFetcher for HttpPreviewFetcher {
    async fn fetch_preview_image(&self, page_url: &str) -> Option<String> {
        let response = match self.http.get(page_url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(url = %page_url, status = %r.status(), "Preview page returned error status");
                return None;
            }
            Err(e) => {
                debug!(url = %page_url, "Preview page fetch failed: {e}");
                return None;
            }
        };

        let html = response.text().await.ok()?;
        extract_preview_image(&html, page_url)
    }
}

/// Never fetches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreviewFetcher;

#[async_trait]
impl PreviewImageFetcher for NoopPreviewFetcher {
    async fn fetch_preview_image(&self, _page_url: &str) -> Option<String> {
        None
    }
}

/// Best image carried by the post itself.
///
/// A mid-sized preview resolution beats the full-size source; a thumbnail is
/// used only when it is a real URL (not `self`, `default` and the like).
#[must_use]
pub fn post_image(post: &ExternalPost) -> Option<String> {
    if let Some(preview) = post.preview_images.first() {
        let chosen = preview
            .resolutions
            .iter()
            .find(|r| PREFERRED_WIDTH.contains(&r.width))
            .unwrap_or(&preview.source);
        if !chosen.url.is_empty() {
            return Some(chosen.url.replace("&amp;", "&"));
        }
    }

    post.thumbnail
        .as_deref()
        .filter(|t| t.starts_with("http"))
        .map(str::to_string)
}

/// Whether an image should be replaced by one from the product page.
#[must_use]
pub fn is_low_quality(image: Option<&str>) -> bool {
    image.map_or(true, |url| LOW_QUALITY_MARKERS.iter().any(|m| url.contains(m)))
}

/// Resolve the display image for a post, falling back to the product page's
/// preview tags when the post has nothing good and links off-site.
pub async fn resolve_image(
    post: &ExternalPost,
    product_url: &str,
    fetcher: &dyn PreviewImageFetcher,
) -> Option<String> {
    let image = post_image(post);

    if is_low_quality(image.as_deref()) && is_product_url(product_url) {
        if let Some(fetched) = fetcher.fetch_preview_image(product_url).await {
            return Some(fetched);
        }
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::post;
    use crate::reddit::{ImageVariant, PreviewImage};

    fn variant(url: &str, width: u32) -> ImageVariant {
        ImageVariant {
            url: url.to_string(),
            width,
            height: width,
        }
    }

    struct FixedFetcher(&'static str);

    #[async_trait]
    impl PreviewImageFetcher for FixedFetcher {
        async fn fetch_preview_image(&self, _page_url: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn test_prefers_mid_sized_resolution() {
        let mut p = post("abc", "Deal");
        p.preview_images = vec![PreviewImage {
            source: variant("https://i.redd.it/full.jpg", 2000),
            resolutions: vec![
                variant("https://preview.redd.it/108.jpg", 108),
                variant("https://preview.redd.it/640.jpg?a=1&amp;b=2", 640),
                variant("https://preview.redd.it/960.jpg", 960),
            ],
        }];
        assert_eq!(
            post_image(&p).as_deref(),
            Some("https://preview.redd.it/640.jpg?a=1&b=2")
        );
    }

    #[test]
    fn test_falls_back_to_source_then_thumbnail() {
        let mut p = post("abc", "Deal");
        p.preview_images = vec![PreviewImage {
            source: variant("https://i.redd.it/full.jpg", 2000),
            resolutions: vec![variant("https://preview.redd.it/108.jpg", 108)],
        }];
        assert_eq!(post_image(&p).as_deref(), Some("https://i.redd.it/full.jpg"));

        p.preview_images.clear();
        p.thumbnail = Some("self".to_string());
        assert_eq!(post_image(&p), None);

        p.thumbnail = Some("https://b.thumbs.redditmedia.com/x.jpg".to_string());
        assert_eq!(
            post_image(&p).as_deref(),
            Some("https://b.thumbs.redditmedia.com/x.jpg")
        );
    }

    #[test]
    fn test_low_quality_detection() {
        assert!(is_low_quality(None));
        assert!(is_low_quality(Some("https://external-preview.redd.it/x.jpg")));
        assert!(is_low_quality(Some("https://b.thumbs.redditmedia.com/x.jpg")));
        assert!(!is_low_quality(Some("https://i.redd.it/x.jpg")));
    }

    #[tokio::test]
    async fn test_fetch_only_for_external_product_links() {
        let p = post("abc", "Deal");
        let fetcher = FixedFetcher("https://shop.example/og.jpg");

        assert_eq!(
            resolve_image(&p, "https://www.amazon.in/dp/1", &fetcher).await.as_deref(),
            Some("https://shop.example/og.jpg")
        );
        assert_eq!(
            resolve_image(&p, "https://reddit.com/r/x/comments/abc/", &fetcher).await,
            None
        );
    }

    #[tokio::test]
    async fn test_good_post_image_skips_fetch() {
        let mut p = post("abc", "Deal");
        p.thumbnail = Some("https://i.redd.it/x.jpg".to_string());
        let fetcher = FixedFetcher("https://shop.example/og.jpg");
        assert_eq!(
            resolve_image(&p, "https://www.amazon.in/dp/1", &fetcher).await.as_deref(),
            Some("https://i.redd.it/x.jpg")
        );
    }
}
