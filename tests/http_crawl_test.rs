mod server;

use server::start_fixture_site;
use sitelens::crawler::{Crawler, CrawlerConfig};
use sitelens::models::FailureKind;
use sitelens::renderer::HttpRenderer;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn config(respect_robots_txt: bool) -> CrawlerConfig {
    CrawlerConfig {
        concurrency: 2,
        respect_robots_txt,
        show_progress: false,
        ..CrawlerConfig::default()
    }
}

fn renderer() -> Arc<HttpRenderer> {
    Arc::new(HttpRenderer::new(Duration::from_secs(5)).expect("Failed to build renderer"))
}

#[tokio::test]
async fn test_http_crawl_of_fixture_site() {
    let base_url = start_fixture_site().await;
    let start = Url::parse(&base_url).unwrap();
    let crawler = Crawler::new(renderer(), config(true)).unwrap();

    let output = crawler.crawl(&start, 20, 2).await;

    let mut urls: Vec<String> = output
        .pages
        .iter()
        .map(|p| p.record.url.trim_start_matches(&base_url).to_string())
        .collect();
    urls.sort();
    assert_eq!(urls, vec!["/", "/about", "/blog"]);

    let home = &output.pages[0].record;
    assert!(home.has_identity_schema);
    assert_eq!(home.lang.as_deref(), Some("en"));

    let about = output
        .pages
        .iter()
        .find(|p| p.record.url.ends_with("/about"))
        .unwrap();
    assert_eq!(about.record.images_without_alt, 1);
}

#[tokio::test]
async fn test_http_crawl_records_broken_pages() {
    let base_url = start_fixture_site().await;
    let start = Url::parse(&base_url).unwrap();
    let crawler = Crawler::new(renderer(), config(true)).unwrap();

    let output = crawler.crawl(&start, 20, 2).await;

    let missing = output
        .failed
        .iter()
        .find(|f| f.url.ends_with("/missing"))
        .expect("404 page should be a failure marker");
    assert_eq!(missing.kind, FailureKind::HttpStatus);
    assert_eq!(missing.status_code, Some(404));

    let old = output
        .failed
        .iter()
        .find(|f| f.url.ends_with("/old"))
        .expect("redirect to a 404 should be a failure marker");
    assert_eq!(old.kind, FailureKind::RedirectToError);
}

#[tokio::test]
async fn test_robots_txt_can_be_ignored() {
    let base_url = start_fixture_site().await;
    let start = Url::parse(&base_url).unwrap();

    let polite = Crawler::new(renderer(), config(true)).unwrap();
    let output = polite.crawl(&start, 20, 2).await;
    assert!(output.pages.iter().all(|p| !p.record.url.contains("/private/")));

    let impolite = Crawler::new(renderer(), config(false)).unwrap();
    let output = impolite.crawl(&start, 20, 2).await;
    assert!(output.pages.iter().any(|p| p.record.url.ends_with("/private/secret")));
}
