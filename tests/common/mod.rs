#![allow(dead_code)]

use async_trait::async_trait;
use sitelens::config::EngineSettings;
use sitelens::crawler::CrawlerConfig;
use sitelens::error::FetchError;
use sitelens::renderer::{FetchTiming, RenderedPage, Renderer};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// In-memory site. Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticRenderer {
    pages: HashMap<String, (u16, String)>,
    /// Rendered DOM that differs from the served document
    rendered: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    /// Requested URL to the URL that answers it
    redirects: HashMap<String, String>,
    default_delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
}

fn key(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: impl Into<String>) -> Self {
        self.status(url, 200, html)
    }

    pub fn status(mut self, url: &str, status: u16, html: impl Into<String>) -> Self {
        self.pages.insert(key(url), (status, html.into()));
        self
    }

    pub fn rendered(mut self, url: &str, html: impl Into<String>) -> Self {
        self.rendered.insert(key(url), html.into());
        self
    }

    /// Serves `to` for requests to `from`, reporting `to` as the final URL
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(key(from), key(to));
        self
    }

    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(key(url), delay);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    /// URLs in fetch order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn fetch(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let (key, final_url) = match self.redirects.get(url.as_str()) {
            Some(target) => (target.clone(), Url::parse(target).unwrap()),
            None => (url.to_string(), url.clone()),
        };

        if let Some(delay) = self.delays.get(&key).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }

        let (status_code, html) = self
            .pages
            .get(&key)
            .cloned()
            .unwrap_or((404, "<html><body>Not found</body></html>".to_string()));
        let rendered_html = self.rendered.get(&key).cloned().unwrap_or_else(|| html.clone());

        Ok(RenderedPage {
            status_code,
            final_url,
            initial_html: html,
            rendered_html,
            timing: FetchTiming::default(),
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// A reasonably healthy page linking to `links`
pub fn html_page(title: &str, body: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">Read about {}</a>\n", href, href))
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>{title}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta name="description" content="{title} explained in enough detail to make a useful search snippet for readers.">
</head>
<body>
  <h1>{title}</h1>
  <h2>Overview</h2>
  <p>{body}</p>
  <nav>{anchors}</nav>
</body>
</html>"#
    )
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        concurrency: 4,
        respect_robots_txt: false,
        show_progress: false,
        page_timeout: Duration::from_secs(5),
        crawl_timeout: Duration::from_secs(30),
        ..EngineSettings::default()
    }
}

pub fn crawler_config() -> CrawlerConfig {
    CrawlerConfig::from_settings(&test_settings(), Default::default())
}
