use crate::analyzer::{AnalyzerOptions, PageAnalyzer, PageInput};
use crate::config::EngineSettings;
use crate::error::{AuditError, FetchError};
use crate::http_client::{ROBOTS_AGENT, build_http_client};
use crate::models::{CrawlEdge, CrawlTarget, CrawlTermination, FailedPage, FailureKind, PageRecord};
use crate::renderer::{RenderedPage, Renderer};
use crate::robots::RobotsPolicy;
use crate::url_normalizer::{SiteScope, is_crawlable_link, normalize_url};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Idle workers re-check the frontier at least this often
const IDLE_POLL: Duration = Duration::from_millis(25);

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub concurrency: usize,
    pub page_timeout: Duration,
    pub crawl_timeout: Duration,
    pub requests_per_second: Option<f64>,
    pub respect_robots_txt: bool,
    pub show_progress: bool,
    pub analyzer: AnalyzerOptions,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default(), AnalyzerOptions::default())
    }
}

impl CrawlerConfig {
    pub fn from_settings(settings: &EngineSettings, analyzer: AnalyzerOptions) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            page_timeout: settings.page_timeout,
            crawl_timeout: settings.crawl_timeout,
            requests_per_second: settings.requests_per_second,
            respect_robots_txt: settings.respect_robots_txt,
            show_progress: settings.show_progress,
            analyzer,
        }
    }
}

/// A fetched page plus the visible text used for keyword extraction
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub record: PageRecord,
    pub visible_text: String,
}

#[derive(Debug, Clone)]
pub struct CrawlOutput {
    /// In discovery order
    pub pages: Vec<CrawledPage>,
    pub failed: Vec<FailedPage>,
    pub edges: Vec<CrawlEdge>,
    pub termination: CrawlTermination,
}

impl CrawlOutput {
    pub fn attempted(&self) -> usize {
        self.pages.len() + self.failed.len()
    }
}

enum NextTarget {
    Fetch(u64, CrawlTarget),
    Wait,
    Done,
}

/// Crawl state shared by the workers. Only ever touched behind one lock,
/// and never held across a fetch.
#[derive(Default)]
struct Frontier {
    max_pages: usize,
    queue: VecDeque<(u64, CrawlTarget)>,
    /// Canonical URLs already enqueued, fetched or reached by redirect
    seen: HashSet<String>,
    in_flight: HashMap<u64, CrawlTarget>,
    dispatched: usize,
    next_seq: u64,
    pages: Vec<(u64, CrawledPage)>,
    failed: Vec<(u64, FailedPage)>,
    edges: Vec<CrawlEdge>,
}

impl Frontier {
    fn new(start: String, max_pages: usize) -> Self {
        let mut frontier = Self {
            max_pages,
            ..Self::default()
        };
        frontier.enqueue(CrawlTarget {
            url: start,
            depth: 0,
            discovered_from: None,
        });
        frontier
    }

    fn enqueue(&mut self, target: CrawlTarget) -> bool {
        if !self.seen.insert(target.url.clone()) {
            return false;
        }
        if let Some(from) = &target.discovered_from {
            self.edges.push(CrawlEdge {
                from: from.clone(),
                to: target.url.clone(),
                depth: target.depth,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back((seq, target));
        true
    }

    fn next_target(&mut self) -> NextTarget {
        if self.dispatched >= self.max_pages {
            return NextTarget::Done;
        }
        match self.queue.pop_front() {
            Some((seq, target)) => {
                self.dispatched += 1;
                self.in_flight.insert(seq, target.clone());
                NextTarget::Fetch(seq, target)
            }
            None if self.in_flight.is_empty() => NextTarget::Done,
            None => NextTarget::Wait,
        }
    }

    fn complete_page(&mut self, seq: u64, page: CrawledPage, links: Vec<CrawlTarget>) {
        self.in_flight.remove(&seq);
        if let Some(final_url) = &page.record.final_url {
            self.seen.insert(final_url.clone());
        }
        for link in links {
            self.enqueue(link);
        }
        self.pages.push((seq, page));
    }

    fn complete_failure(&mut self, seq: u64, failure: FailedPage) {
        self.in_flight.remove(&seq);
        self.failed.push((seq, failure));
    }

    /// Turns fetches cut off by the crawl budget into timeout markers
    fn abandon_in_flight(&mut self, crawl_timeout: Duration) {
        for (seq, target) in self.in_flight.drain() {
            self.failed.push((
                seq,
                FailedPage {
                    url: target.url,
                    depth: target.depth,
                    status_code: None,
                    kind: FailureKind::Timeout,
                    message: format!(
                        "crawl time budget of {}s exhausted before the fetch finished",
                        crawl_timeout.as_secs()
                    ),
                },
            ));
        }
    }

    fn finish(mut self, timed_out: bool) -> CrawlOutput {
        let termination = if timed_out {
            CrawlTermination::TimedOut
        } else if self.dispatched >= self.max_pages && !self.queue.is_empty() {
            CrawlTermination::PageBudgetReached
        } else {
            CrawlTermination::FrontierExhausted
        };

        self.pages.sort_by_key(|(seq, _)| *seq);
        self.failed.sort_by_key(|(seq, _)| *seq);

        CrawlOutput {
            pages: self.pages.into_iter().map(|(_, page)| page).collect(),
            failed: self.failed.into_iter().map(|(_, page)| page).collect(),
            edges: self.edges,
            termination,
        }
    }
}

/// Everything a worker needs, shared across all of them
struct WorkerContext {
    renderer: Arc<dyn Renderer>,
    analyzer: PageAnalyzer,
    frontier: Mutex<Frontier>,
    wake: Notify,
    limiter: Option<DirectLimiter>,
    robots: RobotsPolicy,
    /// Grows once the start page reveals where its redirects landed
    scope: RwLock<SiteScope>,
    max_depth: usize,
    page_timeout: Duration,
    progress: Option<ProgressBar>,
}

pub struct Crawler {
    renderer: Arc<dyn Renderer>,
    client: reqwest::Client,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(renderer: Arc<dyn Renderer>, config: CrawlerConfig) -> Result<Self, AuditError> {
        let client = build_http_client(config.page_timeout)
            .map_err(|e| AuditError::Renderer(e.to_string()))?;
        Ok(Self {
            renderer,
            client,
            config,
        })
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] {spinner:.cyan} Crawling: {pos} pages")
                .expect("Progress bar template should be valid"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    /// Request spacing from the configured rate and the site's Crawl-delay, whichever is slower
    fn rate_limiter(&self, robots: &RobotsPolicy) -> Option<DirectLimiter> {
        let from_rate = self
            .config
            .requests_per_second
            .filter(|rps| rps.is_finite() && *rps > 0.0)
            .map(|rps| Duration::from_secs_f64(1.0 / rps));
        let from_robots = if self.config.respect_robots_txt {
            robots.crawl_delay(ROBOTS_AGENT)
        } else {
            None
        };

        let period = match (from_rate, from_robots) {
            (Some(a), Some(b)) => a.max(b),
            (a, b) => a.or(b)?,
        };
        Quota::with_period(period).map(RateLimiter::direct)
    }

    /// Crawls same-origin pages breadth-first from `start_url`.
    ///
    /// At most `max_pages` fetches are attempted, failures included, and no page deeper
    /// than `max_depth` is enqueued. Running out of pages or time yields a partial
    /// result rather than an error.
    pub async fn crawl(&self, start_url: &Url, max_pages: usize, max_depth: usize) -> CrawlOutput {
        let start = normalize_url(start_url);
        info!(
            url = %start,
            max_pages,
            max_depth,
            workers = self.config.concurrency,
            renderer = self.renderer.name(),
            "Starting crawl"
        );

        let robots = if self.config.respect_robots_txt {
            RobotsPolicy::fetch(&self.client, start_url).await
        } else {
            RobotsPolicy::allow_all()
        };

        let ctx = Arc::new(WorkerContext {
            renderer: Arc::clone(&self.renderer),
            analyzer: PageAnalyzer::new(self.config.analyzer),
            frontier: Mutex::new(Frontier::new(start, max_pages.max(1))),
            wake: Notify::new(),
            limiter: self.rate_limiter(&robots),
            robots,
            scope: RwLock::new(SiteScope::new(start_url)),
            max_depth,
            page_timeout: self.config.page_timeout,
            progress: self.progress_bar(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency.max(1) {
            let ctx = Arc::clone(&ctx);
            workers.spawn(async move { run_worker(worker_id, ctx).await });
        }

        let joined = tokio::time::timeout(self.config.crawl_timeout, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Crawl worker failed");
                }
            }
        })
        .await;

        let timed_out = joined.is_err();
        if timed_out {
            warn!(
                url = %start_url,
                budget_secs = self.config.crawl_timeout.as_secs(),
                "Crawl time budget exhausted, returning partial results"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        if let Some(pb) = &ctx.progress {
            pb.finish_and_clear();
        }

        let output = {
            let mut frontier = ctx.frontier.lock().await;
            if timed_out {
                frontier.abandon_in_flight(self.config.crawl_timeout);
            }
            std::mem::take(&mut *frontier).finish(timed_out)
        };

        info!(
            pages = output.pages.len(),
            failed = output.failed.len(),
            termination = ?output.termination,
            "Crawl complete"
        );
        output
    }
}

async fn run_worker(worker_id: usize, ctx: Arc<WorkerContext>) {
    debug!(worker_id, "Worker started");
    loop {
        let next = ctx.frontier.lock().await.next_target();
        let (seq, target) = match next {
            NextTarget::Fetch(seq, target) => (seq, target),
            NextTarget::Wait => {
                let _ = tokio::time::timeout(IDLE_POLL, ctx.wake.notified()).await;
                continue;
            }
            NextTarget::Done => break,
        };

        if let Some(limiter) = &ctx.limiter {
            limiter.until_ready().await;
        }

        debug!(worker_id, url = %target.url, depth = target.depth, "Fetching");
        match fetch_target(&ctx, &target).await {
            Ok(page) if (200..300).contains(&page.status_code) => {
                if target.depth == 0 {
                    ctx.scope
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .adopt(&page.final_url);
                }
                let (crawled, links) = analyze_fetched(&ctx, &target, &page);
                ctx.frontier.lock().await.complete_page(seq, crawled, links);
            }
            Ok(page) => {
                let failure = status_failure(&target, &page);
                warn!(url = %target.url, status = page.status_code, "Page returned an error status");
                ctx.frontier.lock().await.complete_failure(seq, failure);
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "Failed to fetch page");
                let kind = match e {
                    FetchError::Timeout(_) => FailureKind::Timeout,
                    FetchError::Network(_) | FetchError::InvalidResponse(_) => FailureKind::Network,
                };
                ctx.frontier.lock().await.complete_failure(
                    seq,
                    FailedPage {
                        url: target.url.clone(),
                        depth: target.depth,
                        status_code: None,
                        kind,
                        message: e.to_string(),
                    },
                );
            }
        }

        if let Some(pb) = &ctx.progress {
            pb.inc(1);
        }
        ctx.wake.notify_waiters();
    }
    debug!(worker_id, "Worker finished");
}

async fn fetch_target(ctx: &WorkerContext, target: &CrawlTarget) -> Result<RenderedPage, FetchError> {
    let url = Url::parse(&target.url).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
    let timeout_ms = ctx.page_timeout.as_millis() as u64;
    match tokio::time::timeout(ctx.page_timeout, ctx.renderer.fetch(&url)).await {
        Ok(Ok(page)) => Ok(page),
        Ok(Err(FetchError::Timeout(_))) | Err(_) => Err(FetchError::Timeout(timeout_ms)),
        Ok(Err(e)) => Err(e),
    }
}

fn status_failure(target: &CrawlTarget, page: &RenderedPage) -> FailedPage {
    let redirected = normalize_url(&page.final_url) != target.url;
    let (kind, message) = if redirected && page.status_code >= 400 {
        (
            FailureKind::RedirectToError,
            format!(
                "redirected to {} which returned HTTP {}",
                page.final_url, page.status_code
            ),
        )
    } else {
        (
            FailureKind::HttpStatus,
            format!("HTTP {}", page.status_code),
        )
    };
    FailedPage {
        url: target.url.clone(),
        depth: target.depth,
        status_code: Some(page.status_code),
        kind,
        message,
    }
}

/// Runs page analysis and picks the links worth following
fn analyze_fetched(
    ctx: &WorkerContext,
    target: &CrawlTarget,
    page: &RenderedPage,
) -> (CrawledPage, Vec<CrawlTarget>) {
    let analysis = ctx.analyzer.analyze_page(&PageInput {
        url: &target.url,
        final_url: &page.final_url,
        status_code: page.status_code,
        depth: target.depth,
        initial_html: &page.initial_html,
        rendered_html: &page.rendered_html,
        response_time_ms: page.timing.response_ms,
    });

    let next_depth = target.depth + 1;
    let mut links = Vec::new();
    if next_depth <= ctx.max_depth {
        let scope = ctx
            .scope
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut local = HashSet::new();
        for link in &analysis.links {
            let Some(link) = scope.canonicalize(link) else {
                continue;
            };
            if !is_crawlable_link(&link) {
                continue;
            }
            if !ctx.robots.is_allowed(&link, ROBOTS_AGENT) {
                debug!(url = %link, "Skipping URL disallowed by robots.txt");
                continue;
            }
            let canonical = normalize_url(&link);
            if canonical == target.url || !local.insert(canonical.clone()) {
                continue;
            }
            links.push(CrawlTarget {
                url: canonical,
                depth: next_depth,
                discovered_from: Some(target.url.clone()),
            });
        }
    }

    (
        CrawledPage {
            record: analysis.record,
            visible_text: analysis.visible_text,
        },
        links,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str, depth: usize) -> CrawlTarget {
        CrawlTarget {
            url: url.to_string(),
            depth,
            discovered_from: Some("https://example.com/".to_string()),
        }
    }

    #[test]
    fn test_frontier_never_enqueues_twice() {
        let mut frontier = Frontier::new("https://example.com/".to_string(), 10);
        assert!(frontier.enqueue(target("https://example.com/a", 1)));
        assert!(!frontier.enqueue(target("https://example.com/a", 1)));
        assert!(!frontier.enqueue(target("https://example.com/", 1)));
        assert_eq!(frontier.queue.len(), 2);
        assert_eq!(frontier.edges.len(), 1);
    }

    #[test]
    fn test_frontier_respects_page_budget() {
        let mut frontier = Frontier::new("https://example.com/".to_string(), 2);
        frontier.enqueue(target("https://example.com/a", 1));
        frontier.enqueue(target("https://example.com/b", 1));

        assert!(matches!(frontier.next_target(), NextTarget::Fetch(0, _)));
        assert!(matches!(frontier.next_target(), NextTarget::Fetch(1, _)));
        assert!(matches!(frontier.next_target(), NextTarget::Done));

        let output = frontier.finish(false);
        assert_eq!(output.termination, CrawlTermination::PageBudgetReached);
    }

    #[test]
    fn test_frontier_waits_while_fetches_in_flight() {
        let mut frontier = Frontier::new("https://example.com/".to_string(), 10);
        let NextTarget::Fetch(seq, start) = frontier.next_target() else {
            panic!("expected the seed URL");
        };
        assert!(matches!(frontier.next_target(), NextTarget::Wait));

        frontier.complete_failure(
            seq,
            FailedPage {
                url: start.url,
                depth: 0,
                status_code: Some(500),
                kind: FailureKind::HttpStatus,
                message: "HTTP 500".to_string(),
            },
        );
        assert!(matches!(frontier.next_target(), NextTarget::Done));
        let output = frontier.finish(false);
        assert_eq!(output.termination, CrawlTermination::FrontierExhausted);
        assert_eq!(output.failed.len(), 1);
    }

    #[test]
    fn test_abandoned_fetches_become_timeout_markers() {
        let mut frontier = Frontier::new("https://example.com/".to_string(), 10);
        let _ = frontier.next_target();
        frontier.abandon_in_flight(Duration::from_secs(300));
        let output = frontier.finish(true);
        assert_eq!(output.termination, CrawlTermination::TimedOut);
        assert_eq!(output.failed[0].kind, FailureKind::Timeout);
    }

    #[test]
    fn test_status_failure_detects_redirect_to_error() {
        let page = RenderedPage {
            status_code: 404,
            final_url: Url::parse("https://example.com/missing").unwrap(),
            initial_html: String::new(),
            rendered_html: String::new(),
            timing: Default::default(),
        };
        let failure = status_failure(&target("https://example.com/old", 1), &page);
        assert_eq!(failure.kind, FailureKind::RedirectToError);

        let failure = status_failure(&target("https://example.com/missing", 1), &page);
        assert_eq!(failure.kind, FailureKind::HttpStatus);
        assert_eq!(failure.status_code, Some(404));
    }
}
