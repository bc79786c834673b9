use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::FORUM_BASE_URL;
use crate::reddit::ExternalPost;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\)\]]+").unwrap());

/// Media hosts and forum-internal paths that never point at a product.
static SKIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)reddit\.com/media").unwrap(),
        Regex::new(r"(?i)reddit\.com/gallery").unwrap(),
        Regex::new(r"(?i)i\.redd\.it").unwrap(),
        Regex::new(r"(?i)preview\.redd\.it").unwrap(),
        Regex::new(r"(?i)v\.redd\.it").unwrap(),
        Regex::new(r"(?i)//redd\.it/").unwrap(),
        Regex::new(r"(?i)imgur\.com").unwrap(),
        Regex::new(r"(?i)\.(jpe?g|png|gif|webp)$").unwrap(),
    ]
});

/// Whether a URL can be a product link: not a media file, not an image host
/// and not the forum itself.
#[must_use]
pub fn is_product_url(url: &str) -> bool {
    if SKIP_PATTERNS.iter().any(|re| re.is_match(url)) {
        return false;
    }
    !is_forum_url(url)
}

/// Whether a URL points back at the forum.
#[must_use]
pub fn is_forum_url(url: &str) -> bool {
    url.to_ascii_lowercase().contains("reddit.com")
}

/// Find URLs in free text. Trailing sentence punctuation is not part of the link.
fn urls_in(text: &str) -> impl Iterator<Item = &str> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']))
}

/// Resolve the link a deal points at.
///
/// Order of preference: a product URL in the body, the post's own link when
/// it is external, a product URL in the title, and finally the permalink.
#[must_use]
pub fn extract_product_url(post: &ExternalPost) -> String {
    if let Some(url) = urls_in(&post.body).find(|u| is_product_url(u)) {
        return url.to_string();
    }

    if !post.is_self {
        if let Some(url) = post.url.as_deref().filter(|u| is_product_url(u)) {
            return url.to_string();
        }
    }

    if let Some(url) = urls_in(&post.title).find(|u| is_product_url(u)) {
        return url.to_string();
    }

    permalink_url(post)
}

/// Absolute URL of the post on the forum.
#[must_use]
pub fn permalink_url(post: &ExternalPost) -> String {
    format!("{FORUM_BASE_URL}{}", post.permalink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::post;

    #[test]
    fn test_is_product_url() {
        assert!(is_product_url("https://www.amazon.in/dp/B0C1234"));
        assert!(is_product_url("https://fkrt.it/abc"));
        assert!(!is_product_url("https://i.redd.it/abc.jpg"));
        assert!(!is_product_url("https://preview.redd.it/x.png?width=640"));
        assert!(!is_product_url("https://www.reddit.com/gallery/xyz"));
        assert!(!is_product_url("https://imgur.com/a/xyz"));
        assert!(!is_product_url("https://cdn.shop.example/banner.webp"));
        assert!(!is_product_url("https://www.reddit.com/r/dealsforindia/comments/x"));
    }

    #[test]
    fn test_body_url_preferred() {
        let mut p = post("abc", "Earbuds for cheap");
        p.body = "Deal here: https://www.amazon.in/dp/B0ABC. Hurry!".to_string();
        p.is_self = false;
        p.url = Some("https://www.flipkart.com/item".to_string());
        assert_eq!(extract_product_url(&p), "https://www.amazon.in/dp/B0ABC");
    }

    #[test]
    fn test_media_in_body_skipped_for_link() {
        let mut p = post("abc", "Earbuds for cheap");
        p.body = "pic https://i.redd.it/pic.jpg".to_string();
        p.is_self = false;
        p.url = Some("https://www.flipkart.com/item".to_string());
        assert_eq!(extract_product_url(&p), "https://www.flipkart.com/item");
    }

    #[test]
    fn test_self_post_link_ignored() {
        let mut p = post("abc", "Earbuds https://www.croma.com/p/1 today");
        p.is_self = true;
        p.url = Some("https://www.reddit.com/r/x/comments/abc".to_string());
        assert_eq!(extract_product_url(&p), "https://www.croma.com/p/1");
    }

    #[test]
    fn test_markdown_link_in_body() {
        let mut p = post("abc", "Shoes");
        p.body = "[Buy here](https://www.myntra.com/shoes/123)".to_string();
        assert_eq!(extract_product_url(&p), "https://www.myntra.com/shoes/123");
    }

    #[test]
    fn test_fallback_to_permalink() {
        let p = post("abc", "Any good deals on shoes today");
        assert_eq!(
            extract_product_url(&p),
            "https://reddit.com/r/dealsforindia/comments/abc/post/"
        );
        assert!(is_forum_url(&extract_product_url(&p)));
    }
}
