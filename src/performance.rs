//! Core Web Vitals for the primary page from the PageSpeed Insights v5 API.

use crate::config::EngineSettings;
use crate::error::AddOnError;
use crate::http_client::build_api_client;
use crate::models::{
    Issue, IssueCategory, IssueKind, IssueSeverity, MetricValue, Opportunity, PerformanceMetrics,
};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

/// Lighthouse runs routinely take tens of seconds
const API_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_OPPORTUNITIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PsiResponse {
    lighthouse_result: Option<LighthouseResult>,
    #[serde(default)]
    loading_experience: Option<LoadingExperience>,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    categories: Categories,
    #[serde(default)]
    audits: HashMap<String, Audit>,
}

#[derive(Debug, Default, Deserialize)]
struct Categories {
    performance: Option<CategoryResult>,
}

#[derive(Debug, Deserialize)]
struct CategoryResult {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Audit {
    title: Option<String>,
    score: Option<f64>,
    numeric_value: Option<f64>,
    details: Option<AuditDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditDetails {
    #[serde(rename = "type")]
    kind: Option<String>,
    overall_savings_ms: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadingExperience {
    #[serde(default)]
    metrics: HashMap<String, FieldMetric>,
}

#[derive(Debug, Deserialize)]
struct FieldMetric {
    percentile: Option<f64>,
}

/// Metrics of one strategy run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyReport {
    pub performance_score: Option<f64>,
    pub lcp: Option<f64>,
    pub fcp: Option<f64>,
    pub cls: Option<f64>,
    pub inp: Option<f64>,
    pub ttfb: Option<f64>,
    pub opportunities: Vec<Opportunity>,
}

impl StrategyReport {
    fn from_response(response: PsiResponse) -> Result<Self, AddOnError> {
        let lighthouse = response
            .lighthouse_result
            .ok_or(AddOnError::MissingField("lighthouseResult"))?;
        let numeric = |id: &str| lighthouse.audits.get(id).and_then(|a| a.numeric_value);

        let inp = response
            .loading_experience
            .and_then(|exp| {
                exp.metrics
                    .get("INTERACTION_TO_NEXT_PAINT")
                    .and_then(|m| m.percentile)
            });

        let mut opportunities: Vec<Opportunity> = lighthouse
            .audits
            .iter()
            .filter(|(_, audit)| {
                audit
                    .details
                    .as_ref()
                    .is_some_and(|d| d.kind.as_deref() == Some("opportunity"))
                    && audit.score.is_some_and(|score| score < 0.9)
            })
            .map(|(id, audit)| Opportunity {
                id: id.clone(),
                title: audit.title.clone().unwrap_or_else(|| id.clone()),
                savings_ms: audit.details.as_ref().and_then(|d| d.overall_savings_ms),
            })
            .collect();
        opportunities.sort_by(|a, b| {
            b.savings_ms
                .unwrap_or(0.0)
                .total_cmp(&a.savings_ms.unwrap_or(0.0))
                .then_with(|| a.id.cmp(&b.id))
        });
        opportunities.truncate(MAX_OPPORTUNITIES);

        Ok(Self {
            performance_score: lighthouse
                .categories
                .performance
                .and_then(|p| p.score)
                .map(|s| (s * 100.0).round()),
            lcp: numeric("largest-contentful-paint"),
            fcp: numeric("first-contentful-paint"),
            cls: numeric("cumulative-layout-shift"),
            inp,
            ttfb: numeric("server-response-time"),
            opportunities,
        })
    }
}

/// Combines the two runs; a failed run leaves its half empty.
pub fn combine(mobile: Option<StrategyReport>, desktop: Option<StrategyReport>) -> PerformanceMetrics {
    let mobile = mobile.unwrap_or_default();
    let desktop = desktop.unwrap_or_default();
    let pair = |m: Option<f64>, d: Option<f64>| MetricValue {
        mobile: m,
        desktop: d,
    };
    PerformanceMetrics {
        performance_score: pair(mobile.performance_score, desktop.performance_score),
        lcp: pair(mobile.lcp, desktop.lcp),
        fcp: pair(mobile.fcp, desktop.fcp),
        cls: pair(mobile.cls, desktop.cls),
        inp: pair(mobile.inp, desktop.inp),
        ttfb: pair(mobile.ttfb, desktop.ttfb),
        mobile_opportunities: mobile.opportunities,
        desktop_opportunities: desktop.opportunities,
    }
}

pub struct PageSpeedClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl PageSpeedClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        requests_per_minute: u32,
    ) -> Result<Self, AddOnError> {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client: build_api_client(API_TIMEOUT)?,
            endpoint: endpoint.into(),
            api_key,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self, AddOnError> {
        Self::new(
            settings.pagespeed_endpoint.clone(),
            settings.pagespeed_api_key.clone(),
            settings.pagespeed_requests_per_minute,
        )
    }

    pub async fn run(&self, url: &str, strategy: Strategy) -> Result<StrategyReport, AddOnError> {
        self.limiter.until_ready().await;

        let mut query: Vec<(&str, &str)> = vec![
            ("url", url),
            ("strategy", strategy.as_str()),
            ("category", "performance"),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }

        tracing::debug!(url = %url, strategy = strategy.as_str(), "Requesting PageSpeed Insights");
        let response = self.client.get(&self.endpoint).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AddOnError::PerformanceStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: PsiResponse = response.json().await?;
        StrategyReport::from_response(parsed)
    }

    /// Mobile and desktop run concurrently. Fails only when both runs fail.
    pub async fn fetch_metrics(&self, url: &str) -> Result<PerformanceMetrics, AddOnError> {
        let (mobile, desktop) = tokio::join!(
            self.run(url, Strategy::Mobile),
            self.run(url, Strategy::Desktop)
        );

        match (mobile, desktop) {
            (Err(e), Err(_)) => Err(e),
            (mobile, desktop) => {
                let mobile = mobile
                    .inspect_err(|e| tracing::warn!(url = %url, error = %e, "Mobile performance run failed"))
                    .ok();
                let desktop = desktop
                    .inspect_err(|e| tracing::warn!(url = %url, error = %e, "Desktop performance run failed"))
                    .ok();
                Ok(combine(mobile, desktop))
            }
        }
    }
}

/// Severity for a lower-is-better metric against its good and poor thresholds
fn rate(value: Option<f64>, good: f64, poor: f64) -> Option<IssueSeverity> {
    let value = value?;
    if value > poor {
        Some(IssueSeverity::High)
    } else if value > good {
        Some(IssueSeverity::Medium)
    } else {
        None
    }
}

fn worst(metric: &MetricValue, good: f64, poor: f64) -> Option<(IssueSeverity, f64)> {
    [metric.mobile, metric.desktop]
        .into_iter()
        .flatten()
        .filter_map(|v| rate(Some(v), good, poor).map(|sev| (sev, v)))
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)))
}

fn describe(metric: &MetricValue, unit: &str) -> String {
    let fmt = |v: Option<f64>| match v {
        Some(v) if unit == "ms" => format!("{:.0} ms", v),
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    };
    format!("mobile {}, desktop {}", fmt(metric.mobile), fmt(metric.desktop))
}

/// Performance-category issues for the primary page.
pub fn performance_issues(metrics: &PerformanceMetrics, primary_url: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    // Scores are higher-is-better, so rate the shortfall from 100
    let shortfall = MetricValue {
        mobile: metrics.performance_score.mobile.map(|s| 100.0 - s),
        desktop: metrics.performance_score.desktop.map(|s| 100.0 - s),
    };
    if let Some((severity, _)) = worst(&shortfall, 10.0, 50.0) {
        issues.push(
            Issue::new(
                IssueKind::PoorPerformanceScore,
                IssueCategory::Performance,
                severity,
                format!(
                    "Low Lighthouse performance score ({})",
                    describe(&metrics.performance_score, "")
                ),
            )
            .with_pages([primary_url]),
        );
    }

    let checks: [(&MetricValue, f64, f64, IssueKind, &str, &str); 3] = [
        (
            &metrics.lcp,
            2500.0,
            4000.0,
            IssueKind::SlowLargestContentfulPaint,
            "Slow Largest Contentful Paint",
            "ms",
        ),
        (
            &metrics.cls,
            0.1,
            0.25,
            IssueKind::HighLayoutShift,
            "High Cumulative Layout Shift",
            "",
        ),
        (
            &metrics.inp,
            200.0,
            500.0,
            IssueKind::SlowInteraction,
            "Slow Interaction to Next Paint",
            "ms",
        ),
    ];
    for (metric, good, poor, kind, label, unit) in checks {
        if let Some((severity, _)) = worst(metric, good, poor) {
            issues.push(
                Issue::new(
                    kind,
                    IssueCategory::Performance,
                    severity,
                    format!("{} ({})", label, describe(metric, unit)),
                )
                .with_pages([primary_url]),
            );
        }
    }

    if let Some(top) = metrics
        .mobile_opportunities
        .first()
        .or(metrics.desktop_opportunities.first())
        && let Some(first) = issues.first_mut()
    {
        first.details = Some(format!("Biggest opportunity: {}", top.title));
    }

    issues
}
