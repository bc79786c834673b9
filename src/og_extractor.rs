//! Social-preview metadata extraction from product pages.
//!
//! Store pages advertise their hero image through `og:image` and, as a
//! second choice, `twitter:image`. Only these tags are read; everything else
//! in the document is ignored.

use anyhow::Result;
use scraper::{Html, Selector};
use url::Url;

/// Preview tags found in a page's `<head>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewMeta {
    /// `og:image` (also accepts `og:image:url`)
    pub og_image: Option<String>,
    /// `twitter:image` (also accepts `twitter:image:src`)
    pub twitter_image: Option<String>,
}

impl PreviewMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.og_image.is_none() && self.twitter_image.is_none()
    }

    /// The image to display: `og:image` first, then `twitter:image`.
    #[must_use]
    pub fn best_image(&self) -> Option<&str> {
        self.og_image
            .as_deref()
            .or(self.twitter_image.as_deref())
    }
}

/// Extract preview image tags from HTML content.
///
/// Open Graph tags are keyed by `property`, Twitter card tags by `name`, but
/// pages mix the two up often enough that both attributes are checked for
/// both families. The first non-empty value of each tag wins.
///
/// # Errors
///
/// Returns an error if the selector cannot be built.
pub fn extract_preview_meta(html: &str) -> Result<PreviewMeta> {
    let document = Html::parse_document(html);

    let meta_selector = Selector::parse("meta")
        .map_err(|e| anyhow::anyhow!("Failed to create selector: {:?}", e))?;

    let mut meta = PreviewMeta::default();

    for element in document.select(&meta_selector) {
        let attrs = element.value();
        let Some(key) = attrs.attr("property").or_else(|| attrs.attr("name")) else {
            continue;
        };
        let Some(content) = attrs.attr("content").map(str::trim) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "og:image" | "og:image:url" if meta.og_image.is_none() => {
                meta.og_image = Some(content.to_string());
            }
            "twitter:image" | "twitter:image:src" if meta.twitter_image.is_none() => {
                meta.twitter_image = Some(content.to_string());
            }
            _ => {}
        }
    }

    Ok(meta)
}

/// Extract the best preview image and make it absolute against `page_url`.
///
/// Returns `None` when the page has no usable tag or the value cannot be
/// resolved to an http(s) URL.
#[must_use]
pub fn extract_preview_image(html: &str, page_url: &str) -> Option<String> {
    let meta = extract_preview_meta(html).ok()?;
    let image = meta.best_image()?;

    let resolved = match Url::parse(image) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url).ok()?.join(image).ok()?,
        Err(_) => return None,
    };

    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_og_image_preferred_over_twitter() {
        let html = r#"
            <html>
                <head>
                    <meta name="twitter:image" content="https://shop.example/tw.jpg">
                    <meta property="og:image" content="https://shop.example/og.jpg">
                </head>
            </html>
        "#;

        let meta = extract_preview_meta(html).unwrap();
        assert_eq!(meta.og_image.as_deref(), Some("https://shop.example/og.jpg"));
        assert_eq!(meta.twitter_image.as_deref(), Some("https://shop.example/tw.jpg"));
        assert_eq!(meta.best_image(), Some("https://shop.example/og.jpg"));
    }

    #[test]
    fn test_twitter_image_fallback() {
        let html = r#"
            <html><head>
                <meta property="og:title" content="Blender">
                <meta name="twitter:image:src" content="https://shop.example/tw.jpg">
            </head></html>
        "#;

        let meta = extract_preview_meta(html).unwrap();
        assert!(meta.og_image.is_none());
        assert_eq!(meta.best_image(), Some("https://shop.example/tw.jpg"));
    }

    #[test]
    fn test_empty_content_ignored() {
        let html = r#"
            <html><head>
                <meta property="og:image" content="   ">
                <meta property="og:image" content="https://shop.example/second.jpg">
            </head></html>
        "#;

        let meta = extract_preview_meta(html).unwrap();
        assert_eq!(meta.og_image.as_deref(), Some("https://shop.example/second.jpg"));
    }

    #[test]
    fn test_no_preview_tags() {
        let html = "<html><head><title>Plain</title></head><body>hi</body></html>";
        let meta = extract_preview_meta(html).unwrap();
        assert!(meta.is_empty());
        assert_eq!(extract_preview_image(html, "https://shop.example/p/1"), None);
    }

    #[test]
    fn test_relative_image_resolved_against_page() {
        let html = r#"<html><head><meta property="og:image" content="/img/hero.png"></head></html>"#;
        assert_eq!(
            extract_preview_image(html, "https://shop.example/p/1"),
            Some("https://shop.example/img/hero.png".to_string())
        );
    }

    #[test]
    fn test_non_http_image_rejected() {
        let html = r#"<html><head><meta property="og:image" content="data:image/png;base64,AAAA"></head></html>"#;
        assert_eq!(extract_preview_image(html, "https://shop.example/"), None);
    }
}
