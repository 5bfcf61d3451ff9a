mod common;

use common::{StaticRenderer, crawler_config, html_page};
use sitelens::crawler::{Crawler, CrawlerConfig};
use sitelens::models::{CrawlTermination, FailureKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const ROOT: &str = "https://site.test/";

fn root() -> Url {
    Url::parse(ROOT).unwrap()
}

/// Root linking to /p0 .. /p{n-1}
fn wide_site(n: usize) -> StaticRenderer {
    let links: Vec<String> = (0..n).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    let mut renderer = StaticRenderer::new().page(ROOT, html_page("Home", "Welcome", &link_refs));
    for i in 0..n {
        renderer = renderer.page(
            &format!("https://site.test/p{}", i),
            html_page(&format!("Page {}", i), "Some text", &["/", "/p0"]),
        );
    }
    renderer
}

#[tokio::test]
async fn test_crawl_respects_page_budget() {
    let renderer = Arc::new(wide_site(20));
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 5, 3).await;

    assert_eq!(output.attempted(), 5);
    assert_eq!(output.termination, CrawlTermination::PageBudgetReached);
    assert_eq!(renderer.fetched().len(), 5);
}

#[tokio::test]
async fn test_crawl_never_fetches_a_url_twice() {
    let renderer = Arc::new(wide_site(12));
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 50, 3).await;

    let fetched = renderer.fetched();
    let unique: HashSet<&String> = fetched.iter().collect();
    assert_eq!(unique.len(), fetched.len());
    assert_eq!(output.pages.len(), 13);
    assert_eq!(output.termination, CrawlTermination::FrontierExhausted);
}

#[tokio::test]
async fn test_crawl_respects_depth() {
    let renderer = Arc::new(
        StaticRenderer::new()
            .page(ROOT, html_page("Home", "Start", &["/a"]))
            .page("https://site.test/a", html_page("A", "First level", &["/b"]))
            .page("https://site.test/b", html_page("B", "Second level", &["/c"]))
            .page("https://site.test/c", html_page("C", "Third level", &[])),
    );
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 50, 1).await;

    let urls: Vec<&str> = output.pages.iter().map(|p| p.record.url.as_str()).collect();
    assert_eq!(urls, vec![ROOT, "https://site.test/a"]);
    assert!(output.pages.iter().all(|p| p.record.depth <= 1));
    assert_eq!(output.edges.len(), 1);
    assert_eq!(output.edges[0].from, ROOT);
    assert_eq!(output.edges[0].to, "https://site.test/a");
}

#[tokio::test]
async fn test_crawl_ignores_external_links() {
    let renderer = Arc::new(StaticRenderer::new().page(
        ROOT,
        html_page("Home", "Start", &["https://other.test/", "mailto:hi@site.test", "/logo.png"]),
    ));
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 10, 2).await;

    assert_eq!(output.pages.len(), 1);
    assert_eq!(renderer.fetched(), vec![ROOT.to_string()]);
}

#[tokio::test]
async fn test_crawl_follows_links_after_scheme_redirect() {
    let renderer = Arc::new(
        StaticRenderer::new()
            .redirect("http://site.test/", ROOT)
            .page(
                ROOT,
                html_page("Home", "Start", &["/a", "/b", "http://site.test/", "/"]),
            )
            .page("https://site.test/a", html_page("A", "First", &["http://site.test/b"]))
            .page("https://site.test/b", html_page("B", "Second", &[])),
    );
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler
        .crawl(&Url::parse("http://site.test/").unwrap(), 10, 2)
        .await;

    let urls: Vec<&str> = output.pages.iter().map(|p| p.record.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["http://site.test/", "https://site.test/a", "https://site.test/b"]
    );
    assert_eq!(output.pages[0].record.final_url.as_deref(), Some(ROOT));
    assert_eq!(renderer.fetched().len(), 3);
    assert_eq!(output.termination, CrawlTermination::FrontierExhausted);
}

#[tokio::test]
async fn test_www_links_share_one_dedup_key() {
    let renderer = Arc::new(
        StaticRenderer::new()
            .page(
                ROOT,
                html_page("Home", "Start", &["https://www.site.test/x", "/x"]),
            )
            .page("https://site.test/x", html_page("X", "Only once", &[])),
    );
    let crawler = Crawler::new(renderer.clone(), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 10, 2).await;

    assert_eq!(output.pages.len(), 2);
    assert_eq!(
        renderer.fetched(),
        vec![ROOT.to_string(), "https://site.test/x".to_string()]
    );
}

#[tokio::test]
async fn test_failing_pages_yield_partial_result() {
    let mut renderer = wide_site(9);
    for i in [2, 5, 7] {
        renderer = renderer.status(&format!("https://site.test/p{}", i), 500, "<html>oops</html>");
    }
    let crawler = Crawler::new(Arc::new(renderer), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 10, 1).await;

    assert_eq!(output.pages.len(), 7);
    assert_eq!(output.failed.len(), 3);
    assert!(output.failed.iter().all(|f| f.kind == FailureKind::HttpStatus));
    assert!(output.failed.iter().all(|f| f.status_code == Some(500)));
}

#[tokio::test]
async fn test_pages_keep_discovery_order() {
    let crawler = Crawler::new(Arc::new(wide_site(6)), crawler_config()).unwrap();

    let output = crawler.crawl(&root(), 50, 1).await;

    let urls: Vec<&str> = output.pages.iter().map(|p| p.record.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            ROOT,
            "https://site.test/p0",
            "https://site.test/p1",
            "https://site.test/p2",
            "https://site.test/p3",
            "https://site.test/p4",
            "https://site.test/p5",
        ]
    );
}

#[tokio::test]
async fn test_slow_page_becomes_timeout_marker() {
    let renderer = wide_site(3).slow("https://site.test/p1", Duration::from_secs(2));
    let config = CrawlerConfig {
        page_timeout: Duration::from_millis(200),
        ..crawler_config()
    };
    let crawler = Crawler::new(Arc::new(renderer), config).unwrap();

    let output = crawler.crawl(&root(), 10, 1).await;

    assert_eq!(output.pages.len(), 3);
    assert_eq!(output.failed.len(), 1);
    assert_eq!(output.failed[0].url, "https://site.test/p1");
    assert_eq!(output.failed[0].kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_crawl_budget_returns_partial_result() {
    let renderer = wide_site(10).with_delay(Duration::from_millis(200));
    let config = CrawlerConfig {
        concurrency: 1,
        crawl_timeout: Duration::from_millis(300),
        ..crawler_config()
    };
    let crawler = Crawler::new(Arc::new(renderer), config).unwrap();

    let output = crawler.crawl(&root(), 50, 1).await;

    assert_eq!(output.termination, CrawlTermination::TimedOut);
    assert!(output.attempted() >= 1);
    assert!(output.attempted() < 11);
    assert!(output.failed.iter().any(|f| f.kind == FailureKind::Timeout));
}
