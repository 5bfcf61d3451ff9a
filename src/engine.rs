//! The audit pipeline: crawl, aggregate, score, add-ons, QA.

use crate::aggregator::aggregate;
use crate::analyzer::AnalyzerOptions;
use crate::competitor::{self, CompetitorCrawler};
use crate::config::{AuditOptions, EngineSettings};
use crate::crawler::{CrawlOutput, Crawler, CrawlerConfig};
use crate::error::{AddOnError, AuditError, Result};
use crate::keywords::{self, DEFAULT_MAX_KEYWORDS};
use crate::models::{
    AuditResult, AuditSummary, CategorizedIssues, CompetitorAnalysis, CompetitorSite,
    PerformanceMetrics,
};
use crate::performance::{self, PageSpeedClient};
use crate::qa::{QaReport, QaValidator};
use crate::renderer::{self, Renderer};
use crate::scorer::Scorer;
use crate::url_normalizer::normalize_url;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

/// Parses and checks the audit's start URL
pub fn parse_start_url(input: &str) -> Result<Url> {
    let url = Url::parse(input.trim()).map_err(|e| AuditError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(AuditError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(AuditError::InvalidUrl {
            url: input.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

pub struct AuditEngine {
    settings: EngineSettings,
    renderer: Arc<dyn Renderer>,
}

impl AuditEngine {
    /// Builds the renderer selected in `settings`.
    pub async fn new(settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let renderer = renderer::create_renderer(&settings).await?;
        Ok(Self { settings, renderer })
    }

    pub fn with_renderer(settings: EngineSettings, renderer: Arc<dyn Renderer>) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, renderer })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn run_audit(&self, url: &str, options: AuditOptions) -> Result<AuditResult> {
        let (result, _) = self.run_audit_with_report(url, options).await?;
        Ok(result)
    }

    /// Runs one audit and returns the QA outcome alongside the result.
    ///
    /// Only an unusable start URL or a crawl that fetched nothing is an error.
    /// Failed pages, failed add-ons and unresolved QA issues all degrade into a
    /// partial result.
    pub async fn run_audit_with_report(
        &self,
        url: &str,
        options: AuditOptions,
    ) -> Result<(AuditResult, QaReport)> {
        let start = parse_start_url(url)?;
        let (max_pages, max_depth) = options.crawl_budget();
        let analyzer = AnalyzerOptions {
            alt_text_recommendations: options.add_ons.alt_text_recommendations,
        };
        let crawler_config = CrawlerConfig::from_settings(&self.settings, analyzer);

        let competitor_task = self.spawn_competitor_crawl(&options, &crawler_config);

        let crawler = Crawler::new(Arc::clone(&self.renderer), crawler_config)?;
        let CrawlOutput {
            pages,
            failed,
            edges,
            termination,
        } = crawler.crawl(&start, max_pages, max_depth).await;

        if pages.is_empty() {
            if let Some(task) = competitor_task {
                task.abort();
            }
            return Err(AuditError::NoPagesFetched {
                url: normalize_url(&start),
                failed: failed.len(),
            });
        }

        let own_keywords = options.add_ons.competitor_analysis.then(|| {
            keywords::site_keywords(
                pages.iter().map(|p| p.visible_text.as_str()),
                DEFAULT_MAX_KEYWORDS,
            )
        });
        let mut records: Vec<_> = pages.into_iter().map(|p| p.record).collect();
        let primary = records.iter().position(|p| p.depth == 0).unwrap_or(0);
        let primary_fetch_url = records[primary]
            .final_url
            .clone()
            .unwrap_or_else(|| records[primary].url.clone());

        let scorer = Scorer::new(self.settings.scoring);
        let schema_deep_dive = options.add_ons.schema_deep_dive;
        let (metrics, (site_wide, scores, mut issues)) = tokio::join!(
            self.fetch_performance(&options, &primary_fetch_url),
            async {
                let aggregation = aggregate(&records);
                let (scores, issues) =
                    scorer.score(&records, &failed, aggregation.issues, schema_deep_dive);
                (aggregation.site_wide, scores, issues)
            }
        );

        if let Some(metrics) = metrics {
            issues.extend(performance::performance_issues(
                &metrics,
                &records[primary].url,
            ));
            records[primary].performance_metrics = Some(metrics);
        }

        let competitor_analysis = match (competitor_task, own_keywords) {
            (Some(task), Some(own)) => {
                let sites = match task.await {
                    Ok(sites) => sites,
                    Err(e) => {
                        warn!(error = %AddOnError::from(e), "Competitor analysis failed");
                        Vec::new()
                    }
                };
                self.competitor_analysis(own, sites, &options)
            }
            _ => None,
        };

        let issues = CategorizedIssues::from_issues(issues);
        let summary = AuditSummary::derive(scores, &issues, records.len(), failed.len());
        let result = AuditResult {
            url: normalize_url(&start),
            generated_at: chrono::Utc::now().to_rfc3339(),
            options,
            pages: records,
            failed_pages: failed,
            edges,
            crawl_termination: termination,
            issues,
            summary,
            site_wide,
            competitor_analysis,
        };

        let validator = QaValidator::new(
            self.settings.scoring,
            self.settings.qa_max_attempts,
            self.settings.qa_target_score,
        );
        let (result, report) = validator.run(result);

        info!(
            url = %result.url,
            pages = result.summary.total_pages,
            failed = result.summary.failed_pages,
            issues = result.summary.total_issues,
            overall = result.summary.scores.overall,
            qa_state = ?report.state,
            "Audit complete"
        );
        Ok((result, report))
    }

    fn spawn_competitor_crawl(
        &self,
        options: &AuditOptions,
        config: &CrawlerConfig,
    ) -> Option<JoinHandle<Vec<CompetitorSite>>> {
        if !options.add_ons.competitor_analysis {
            return None;
        }
        if options.competitor_urls.is_empty() {
            info!("Competitor analysis requested without competitor URLs, skipping");
            return None;
        }

        let crawler = CompetitorCrawler::new(
            Arc::clone(&self.renderer),
            config.clone(),
            self.settings.competitor_page_cap,
        );
        let urls = options.competitor_urls.clone();
        let cap = competitor::competitor_cap(&options.add_ons);
        Some(tokio::spawn(async move { crawler.crawl_all(&urls, cap).await }))
    }

    fn competitor_analysis(
        &self,
        own_keywords: std::collections::BTreeSet<String>,
        sites: Vec<CompetitorSite>,
        options: &AuditOptions,
    ) -> Option<CompetitorAnalysis> {
        if sites.is_empty() {
            warn!("No competitor could be analyzed, omitting competitor analysis");
            return None;
        }
        Some(competitor::compare(
            own_keywords,
            sites,
            competitor::gap_limit(&options.add_ons),
        ))
    }

    async fn fetch_performance(
        &self,
        options: &AuditOptions,
        url: &str,
    ) -> Option<PerformanceMetrics> {
        if !options.add_ons.performance_metrics {
            return None;
        }
        let client = PageSpeedClient::from_settings(&self.settings)
            .inspect_err(|e| warn!(error = %e, "Performance metrics unavailable"))
            .ok()?;
        client
            .fetch_metrics(url)
            .await
            .inspect_err(|e| warn!(url = %url, error = %e, "Performance metrics unavailable"))
            .ok()
    }
}
