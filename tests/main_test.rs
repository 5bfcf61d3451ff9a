mod server;

use clap::Parser;
use server::start_fixture_site;
use sitelens::cli::Cli;
use sitelens::models::AuditResult;
use sitelens::run;
use std::fs;
use tempfile::tempdir;

fn cli(args: &[&str]) -> Cli {
    let mut full = vec!["sitelens"];
    full.extend_from_slice(args);
    Cli::parse_from(full)
}

#[tokio::test]
async fn test_invalid_url_no_protocol() {
    let result = run(cli(&["example.com"])).await;
    let err = result.expect_err("Should return error for URL without protocol");
    assert!(
        err.to_string().contains("Invalid URL 'example.com'"),
        "unexpected error: {}",
        err
    );
}

#[tokio::test]
async fn test_invalid_url_unsupported_scheme() {
    let result = run(cli(&["ftp://example.com"])).await;
    let err = result.expect_err("Should reject non-http schemes");
    assert!(err.to_string().contains("Invalid URL scheme 'ftp'"));
}

#[tokio::test]
async fn test_unreachable_site_is_an_error() {
    // Nothing listens on port 9 of the loopback interface
    let result = run(cli(&[
        "http://127.0.0.1:9/",
        "--respect-robots-txt",
        "false",
        "--output",
        "json",
    ]))
    .await;
    let err = result.expect_err("A crawl with zero pages must fail");
    assert!(err.to_string().contains("No pages could be fetched"));
}

#[tokio::test]
async fn test_json_report_saved_to_file() {
    let base_url = start_fixture_site().await;
    let dir = tempdir().unwrap();
    let report_path = dir.path().join("report.json");
    let report_arg = report_path.to_str().unwrap();

    run(cli(&[
        base_url.as_str(),
        "--output",
        "json",
        "--max-pages",
        "10",
        "--save",
        report_arg,
    ]))
    .await
    .expect("Audit of the fixture site should succeed");

    let saved = fs::read_to_string(&report_path).expect("Report file should exist");
    let result: AuditResult = serde_json::from_str(&saved).expect("Report should be valid JSON");
    assert_eq!(result.summary.total_pages, result.pages.len());
    assert!(result.pages.iter().any(|p| p.url.ends_with("/about")));
    assert!(
        result
            .pages
            .iter()
            .all(|p| !p.url.contains("/private/")),
        "robots.txt disallows /private/"
    );
}
