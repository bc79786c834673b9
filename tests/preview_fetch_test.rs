//! Preview image fallback against mock product pages.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dealhunt_ingest::db::Region;
use dealhunt_ingest::parser::{DealParser, HttpPreviewFetcher, PreviewImageFetcher};
use dealhunt_ingest::reddit::ExternalPost;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html_page(head: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!(
            "<!DOCTYPE html><html><head>{head}</head><body><h1>Product</h1></body></html>"
        ))
}

fn fetcher() -> HttpPreviewFetcher {
    HttpPreviewFetcher::new(Duration::from_secs(2)).unwrap()
}

fn link_post(id: &str, title: &str, url: &str) -> ExternalPost {
    ExternalPost {
        id: id.to_string(),
        fullname: format!("t3_{id}"),
        title: title.to_string(),
        body: String::new(),
        url: Some(url.to_string()),
        permalink: format!("/r/dealsforindia/comments/{id}/post/"),
        is_self: false,
        score: 8,
        created_at: Utc::now(),
        preview_images: Vec::new(),
        thumbnail: Some("default".to_string()),
    }
}

#[tokio::test]
async fn test_og_image_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B0OG"))
        .respond_with(html_page(
            r#"<meta property="og:image" content="https://cdn.example.com/og.jpg">
               <meta name="twitter:image" content="https://cdn.example.com/tw.jpg">"#,
        ))
        .mount(&server)
        .await;

    let image = fetcher()
        .fetch_preview_image(&format!("{}/dp/B0OG", server.uri()))
        .await;
    assert_eq!(image.as_deref(), Some("https://cdn.example.com/og.jpg"));
}

#[tokio::test]
async fn test_twitter_image_and_relative_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(html_page(
            r#"<meta name="twitter:image" content="/static/img/42.png">"#,
        ))
        .mount(&server)
        .await;

    let image = fetcher()
        .fetch_preview_image(&format!("{}/item/42", server.uri()))
        .await;
    assert_eq!(image, Some(format!("{}/static/img/42.png", server.uri())));
}

#[tokio::test]
async fn test_missing_page_or_tags_yield_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(html_page("<title>No previews here</title>"))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    assert!(fetcher
        .fetch_preview_image(&format!("{}/gone", server.uri()))
        .await
        .is_none());
    assert!(fetcher
        .fetch_preview_image(&format!("{}/plain", server.uri()))
        .await
        .is_none());
}

#[tokio::test]
async fn test_slow_page_times_out_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            html_page(r#"<meta property="og:image" content="https://cdn.example.com/late.jpg">"#)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpPreviewFetcher::new(Duration::from_millis(100)).unwrap();
    assert!(fetcher
        .fetch_preview_image(&format!("{}/slow", server.uri()))
        .await
        .is_none());
}

#[tokio::test]
async fn test_parser_uses_product_page_image_when_post_has_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B0PARSE"))
        .respond_with(html_page(
            r#"<meta property="og:image" content="https://cdn.example.com/parse.jpg">"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let parser = DealParser::new(Arc::new(fetcher()));
    let post = link_post(
        "pf1",
        "Boat Rockerz 450 at ₹1,299",
        &format!("{}/dp/B0PARSE", server.uri()),
    );

    let deal = parser
        .parse(&post, Region::India)
        .await
        .unwrap()
        .expect("post is a deal");
    assert_eq!(deal.image_url.as_deref(), Some("https://cdn.example.com/parse.jpg"));
}
