use reqwest::{Client, ClientBuilder, header};
use std::time::Duration;

/// Product token matched against robots.txt user-agent groups
pub const ROBOTS_AGENT: &str = "sitelens";

/// Browser-like user agent, so sites serve the same markup real visitors get
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15 sitelens/0.1";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Client for page fetches: browser-like headers, compression, bounded redirects
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static(ACCEPT_LANGUAGE),
    );

    ClientBuilder::new()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

/// Client for third-party JSON APIs
pub fn build_api_client(timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT_JSON));

    ClientBuilder::new()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()
}
