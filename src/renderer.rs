//! Page fetching behind a swappable `Renderer`.
//!
//! The crawler and analyzers only see `RenderedPage`; whether the DOM came from a
//! plain HTTP body or a headless browser is decided here.

use crate::config::{EngineSettings, RendererKind};
use crate::error::{AuditError, FetchError};
use crate::http_client::build_http_client;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTiming {
    /// Time until the server document was received
    pub response_ms: u64,
    /// Extra time spent waiting for client-side rendering to settle
    pub render_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub status_code: u16,
    /// URL after redirects
    pub final_url: Url,
    /// Server-delivered document, before script execution
    pub initial_html: String,
    /// DOM serialization after rendering settled
    pub rendered_html: String,
    pub timing: FetchTiming,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<RenderedPage, FetchError>;

    fn name(&self) -> &'static str;
}

/// Plain HTTP renderer. No scripts run, so both documents are the response body.
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(timeout: Duration) -> Result<Self, AuditError> {
        let client =
            build_http_client(timeout).map_err(|e| AuditError::Renderer(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Fetches the server document: (status, final url, body, elapsed ms).
async fn fetch_initial(client: &Client, url: &Url) -> Result<(u16, Url, String, u64), FetchError> {
    let started = Instant::now();
    let response = client.get(url.clone()).send().await?;
    let status_code = response.status().as_u16();
    let final_url = response.url().clone();

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let ct_lower = content_type.to_lowercase();
        if !ct_lower.contains("text/html") && !ct_lower.contains("application/xhtml") {
            tracing::warn!(
                url = %url,
                content_type = %content_type,
                "Non-HTML content type detected, parsing may fail"
            );
        }
    }

    let body = response.text().await?;
    Ok((
        status_code,
        final_url,
        body,
        started.elapsed().as_millis() as u64,
    ))
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn fetch(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let (status_code, final_url, body, response_ms) = fetch_initial(&self.client, url).await?;
        Ok(RenderedPage {
            status_code,
            final_url,
            rendered_html: body.clone(),
            initial_html: body,
            timing: FetchTiming {
                response_ms,
                render_ms: 0,
            },
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Kept free inside the page timeout for closing the browser tab.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Single deadline for every render step of one fetch.
///
/// Lands before the crawler's page timeout, so a page that never settles still
/// yields the DOM it has instead of a timeout failure.
pub fn render_deadline(
    fetch_started: Instant,
    render_started: Instant,
    page_timeout: Duration,
    render_timeout: Duration,
) -> Instant {
    let page_limit = fetch_started + page_timeout.saturating_sub(CLOSE_GRACE);
    (render_started + render_timeout)
        .min(page_limit)
        .max(render_started)
}

/// Point where DOM polling stops so the settle delay still fits before `deadline`.
pub fn settle_cutoff(render_started: Instant, deadline: Instant, settle_delay: Duration) -> Instant {
    deadline
        .checked_sub(settle_delay)
        .unwrap_or(render_started)
        .max(render_started)
}

/// Builds the renderer selected in the settings.
pub async fn create_renderer(settings: &EngineSettings) -> Result<Arc<dyn Renderer>, AuditError> {
    match settings.renderer {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(settings.page_timeout)?)),
        #[cfg(feature = "browser")]
        RendererKind::Browser => Ok(Arc::new(
            browser::BrowserRenderer::launch(
                settings.page_timeout,
                settings.render_timeout,
                settings.settle_delay,
            )
            .await?,
        )),
        #[cfg(not(feature = "browser"))]
        RendererKind::Browser => Err(AuditError::Renderer(
            "the browser renderer requires building with `--features browser`".to_string(),
        )),
    }
}

#[cfg(feature = "browser")]
pub mod browser {
    use super::*;
    use chromiumoxide::Page;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use tokio::time::{sleep_until, timeout, timeout_at};

    /// Poll interval while waiting for the DOM to stop changing
    const SETTLE_POLL: Duration = Duration::from_millis(250);
    /// Consecutive unchanged polls treated as "network idle"
    const STABLE_POLLS: usize = 2;

    /// Closes the tab even when the render future is dropped mid-way.
    struct OpenPage(Option<Page>);

    impl OpenPage {
        async fn close(mut self, url: &Url) {
            if let Some(page) = self.0.take() {
                match timeout(CLOSE_GRACE, page.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(url = %url, error = %e, "Page close error"),
                    Err(_) => tracing::debug!(url = %url, "Page close timed out"),
                }
            }
        }
    }

    impl Drop for OpenPage {
        fn drop(&mut self) {
            if let Some(page) = self.0.take() {
                tokio::spawn(async move {
                    let _ = timeout(CLOSE_GRACE, page.close()).await;
                });
            }
        }
    }

    /// Headless Chromium renderer. Executes scripts and waits for the DOM to settle.
    pub struct BrowserRenderer {
        client: Client,
        browser: Arc<Browser>,
        page_timeout: Duration,
        render_timeout: Duration,
        settle_delay: Duration,
    }

    impl BrowserRenderer {
        pub async fn launch(
            page_timeout: Duration,
            render_timeout: Duration,
            settle_delay: Duration,
        ) -> Result<Self, AuditError> {
            let config = BrowserConfig::builder()
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu")
                .build()
                .map_err(AuditError::Renderer)?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| AuditError::Renderer(format!("Browser launch failed: {e}")))?;

            tokio::spawn(async move { while handler.next().await.is_some() {} });

            let client = build_http_client(page_timeout)
                .map_err(|e| AuditError::Renderer(e.to_string()))?;

            Ok(Self {
                client,
                browser: Arc::new(browser),
                page_timeout,
                render_timeout,
                settle_delay,
            })
        }

        /// Renders the page; past the deadline falls back to whatever DOM is available.
        async fn render(&self, url: &Url, fallback: &str, deadline: Instant) -> String {
            let now = Instant::now();
            let cutoff =
                tokio::time::Instant::from_std(settle_cutoff(now, deadline, self.settle_delay));
            let deadline = tokio::time::Instant::from_std(deadline);

            let page = match timeout_at(deadline, self.browser.new_page(url.as_str())).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    tracing::warn!(url = %url, error = %e, "Failed to open page, using initial HTML");
                    return fallback.to_string();
                }
                Err(_) => {
                    tracing::warn!(url = %url, "Render timed out opening page, using initial HTML");
                    return fallback.to_string();
                }
            };

            let open = OpenPage(Some(page.clone()));
            let latest = self.settle(&page, url, fallback, cutoff, deadline).await;
            open.close(url).await;
            latest
        }

        async fn settle(
            &self,
            page: &Page,
            url: &Url,
            fallback: &str,
            cutoff: tokio::time::Instant,
            deadline: tokio::time::Instant,
        ) -> String {
            let _ = timeout_at(cutoff, page.wait_for_navigation()).await;

            let mut latest = fallback.to_string();
            let mut last_len = None;
            let mut stable = 0;
            while tokio::time::Instant::now() < cutoff && stable < STABLE_POLLS {
                match timeout_at(cutoff, page.content()).await {
                    Ok(Ok(html)) => {
                        if last_len == Some(html.len()) {
                            stable += 1;
                        } else {
                            stable = 0;
                            last_len = Some(html.len());
                        }
                        latest = html;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(url = %url, error = %e, "DOM poll failed");
                        break;
                    }
                    Err(_) => break,
                }
                sleep_until((tokio::time::Instant::now() + SETTLE_POLL).min(cutoff)).await;
            }
            if stable < STABLE_POLLS {
                tracing::warn!(url = %url, "Rendering did not settle in time, using current DOM");
            }

            // Late hydration frameworks keep mutating after the DOM looks idle
            sleep_until((tokio::time::Instant::now() + self.settle_delay).min(deadline)).await;
            if let Ok(Ok(html)) = timeout_at(deadline, page.content()).await {
                latest = html;
            }
            latest
        }
    }

    #[async_trait]
    impl Renderer for BrowserRenderer {
        async fn fetch(&self, url: &Url) -> Result<RenderedPage, FetchError> {
            let fetch_started = Instant::now();
            let (status_code, final_url, initial_html, response_ms) =
                fetch_initial(&self.client, url).await?;

            if !(200..300).contains(&status_code) {
                return Ok(RenderedPage {
                    status_code,
                    final_url,
                    rendered_html: initial_html.clone(),
                    initial_html,
                    timing: FetchTiming {
                        response_ms,
                        render_ms: 0,
                    },
                });
            }

            let started = Instant::now();
            let deadline =
                render_deadline(fetch_started, started, self.page_timeout, self.render_timeout);
            let rendered_html = self.render(&final_url, &initial_html, deadline).await;
            Ok(RenderedPage {
                status_code,
                final_url,
                initial_html,
                rendered_html,
                timing: FetchTiming {
                    response_ms,
                    render_ms: started.elapsed().as_millis() as u64,
                },
            })
        }

        fn name(&self) -> &'static str {
            "browser"
        }
    }
}
