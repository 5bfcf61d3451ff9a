use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::AuditError;

/// Product tier, which selects the default crawl budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Starter,
    #[default]
    Standard,
    Professional,
    Agency,
}

impl Tier {
    /// Default (max_pages, max_depth) for the tier
    pub fn crawl_budget(&self) -> (usize, usize) {
        match self {
            Tier::Starter => (10, 1),
            Tier::Standard => (50, 2),
            Tier::Professional => (150, 3),
            Tier::Agency => (500, 4),
        }
    }
}

/// Optional analyzers and budget modifiers purchased with an audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddOns {
    pub performance_metrics: bool,
    pub competitor_analysis: bool,
    pub schema_deep_dive: bool,
    pub extra_crawl_depth: bool,
    /// Delivery SLA only; the engine ignores it.
    pub expedited: bool,
    pub alt_text_recommendations: bool,
    pub additional_keywords: u32,
    pub additional_competitors: u32,
}

/// Caller-supplied options for one audit run. Echoed back in the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    pub max_pages: Option<usize>,
    pub max_depth: Option<usize>,
    pub tier: Tier,
    pub add_ons: AddOns,
    pub competitor_urls: Vec<String>,
}

impl AuditOptions {
    /// Effective (max_pages, max_depth): explicit values win over the tier defaults.
    pub fn crawl_budget(&self) -> (usize, usize) {
        let (tier_pages, tier_depth) = self.tier.crawl_budget();
        let max_pages = self.max_pages.unwrap_or(tier_pages).max(1);
        let mut max_depth = self.max_depth.unwrap_or(tier_depth);
        if self.add_ons.extra_crawl_depth {
            max_depth += 1;
        }
        (max_pages, max_depth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub technical: u32,
    pub on_page: u32,
    pub content: u32,
    pub accessibility: u32,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            technical: 30,
            on_page: 30,
            content: 25,
            accessibility: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityPenalties {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            high: 15.0,
            medium: 8.0,
            low: 3.0,
        }
    }
}

/// Tunable scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weights: CategoryWeights,
    pub penalties: SeverityPenalties,
    /// Share of the full penalty applied even when a single page is affected.
    pub min_fraction_factor: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            penalties: SeverityPenalties::default(),
            min_fraction_factor: 0.3,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> std::result::Result<(), AuditError> {
        let w = &self.weights;
        let total = w.technical + w.on_page + w.content + w.accessibility;
        if total != 100 {
            return Err(AuditError::InvalidConfig(format!(
                "category weights must sum to 100, got {}",
                total
            )));
        }
        let p = &self.penalties;
        if [p.high, p.medium, p.low]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(AuditError::InvalidConfig(
                "severity penalties must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_fraction_factor) {
            return Err(AuditError::InvalidConfig(
                "min_fraction_factor must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Plain HTTP fetch, no script execution
    #[default]
    Http,
    /// Headless Chromium (requires the `browser` feature)
    Browser,
}

pub const DEFAULT_PAGESPEED_ENDPOINT: &str =
    "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Engine knobs that are not part of the per-audit options.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub concurrency: usize,
    pub page_timeout: Duration,
    pub crawl_timeout: Duration,
    pub render_timeout: Duration,
    pub settle_delay: Duration,
    pub requests_per_second: Option<f64>,
    pub respect_robots_txt: bool,
    pub renderer: RendererKind,
    pub show_progress: bool,
    pub pagespeed_api_key: Option<String>,
    pub pagespeed_endpoint: String,
    pub pagespeed_requests_per_minute: u32,
    pub competitor_page_cap: usize,
    pub qa_max_attempts: usize,
    pub qa_target_score: f64,
    pub scoring: ScoringPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_timeout: Duration::from_secs(30),
            crawl_timeout: Duration::from_secs(300),
            render_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_millis(2000),
            requests_per_second: None,
            respect_robots_txt: true,
            renderer: RendererKind::Http,
            show_progress: false,
            pagespeed_api_key: None,
            pagespeed_endpoint: DEFAULT_PAGESPEED_ENDPOINT.to_string(),
            pagespeed_requests_per_minute: 30,
            competitor_page_cap: 5,
            qa_max_attempts: 5,
            qa_target_score: 9.0,
            scoring: ScoringPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> std::result::Result<(), AuditError> {
        if self.concurrency == 0 {
            return Err(AuditError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(rps) = self.requests_per_second
            && !(rps.is_finite() && rps > 0.0)
        {
            return Err(AuditError::InvalidConfig(format!(
                "rate limit must be a positive number, got {}",
                rps
            )));
        }
        self.scoring.validate()
    }
}

/// Configuration file structure that mirrors CLI arguments
/// All fields are optional to allow partial configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// The URL to audit
    pub url: Option<String>,

    /// Product tier selecting the default crawl budget
    pub tier: Option<Tier>,

    /// Maximum crawl depth
    pub depth: Option<usize>,

    /// Maximum number of pages to crawl
    pub max_pages: Option<usize>,

    /// Competitor sites for keyword-gap analysis
    pub competitors: Option<Vec<String>>,

    /// Add-on analyzers
    pub add_ons: Option<AddOns>,

    /// Output format: text or json
    pub output: Option<String>,

    /// Save report to file
    pub save: Option<String>,

    /// Verbose output
    pub verbose: Option<bool>,

    /// Rate limit for requests per second
    pub rate_limit: Option<f64>,

    /// Number of concurrent requests
    pub concurrency: Option<usize>,

    /// Respect robots.txt rules
    pub respect_robots_txt: Option<bool>,

    /// Page renderer
    pub renderer: Option<RendererKind>,

    /// PageSpeed Insights API key
    pub pagespeed_api_key: Option<String>,

    /// Per-page fetch timeout in seconds
    pub page_timeout_secs: Option<u64>,

    /// Wall-clock budget for the whole crawl in seconds
    pub crawl_timeout_secs: Option<u64>,

    /// Browser render budget per page in seconds, capped by the page timeout
    pub render_timeout_secs: Option<u64>,

    /// Delay after rendering settles, in milliseconds
    pub settle_delay_ms: Option<u64>,

    /// Maximum QA repair attempts
    pub qa_max_attempts: Option<usize>,

    /// QA score (0-10) at which validation stops
    pub qa_target_score: Option<f64>,

    /// Scoring weights and penalties
    pub scoring: Option<ScoringPolicy>,
}

/// Configuration file format based on file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                _ => None,
            })
    }

    /// Get file extensions for this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let format = ConfigFormat::from_path(path)
            .with_context(|| format!("Unsupported config file format: {}", path.display()))?;

        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            ConfigFormat::Toml => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
        };

        Ok(config)
    }

    /// Default configuration file paths in priority order:
    /// current directory, then the user config directory
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for format in &[ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml] {
            for ext in format.extensions() {
                paths.push(PathBuf::from(format!("sitelens.{}", ext)));
            }
        }

        // XDG_CONFIG_HOME if set, otherwise ~/.config
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .and_then(|p| {
                if p.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(p))
                }
            })
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")));

        if let Some(config_home) = config_home {
            let app_config_dir = config_home.join("sitelens");
            for format in &[ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml] {
                for ext in format.extensions() {
                    paths.push(app_config_dir.join(format!("config.{}", ext)));
                }
            }
        }

        paths
    }

    /// Returns the first configuration file found, or None if no config exists
    pub fn from_default_paths() -> Result<Option<Self>> {
        for path in Self::default_paths() {
            if path.exists() {
                return Ok(Some(Self::from_file(&path)?));
            }
        }
        Ok(None)
    }

    /// Merge this configuration with CLI arguments
    /// CLI arguments take precedence over config file values
    pub fn merge_with_cli(&self, cli: &Cli) -> Cli {
        let add_ons = self.add_ons.clone().unwrap_or_default();
        Cli {
            url: cli.url.clone(),
            tier: if cli.tier != Tier::Standard {
                cli.tier
            } else {
                self.tier.unwrap_or(cli.tier)
            },
            depth: cli.depth.or(self.depth),
            max_pages: cli.max_pages.or(self.max_pages),
            competitors: if cli.competitors.is_empty() {
                self.competitors.clone().unwrap_or_default()
            } else {
                cli.competitors.clone()
            },
            performance: cli.performance || add_ons.performance_metrics,
            schema_deep_dive: cli.schema_deep_dive || add_ons.schema_deep_dive,
            extra_depth: cli.extra_depth || add_ons.extra_crawl_depth,
            alt_text: cli.alt_text || add_ons.alt_text_recommendations,
            expedited: cli.expedited || add_ons.expedited,
            additional_keywords: if cli.additional_keywords != 0 {
                cli.additional_keywords
            } else {
                add_ons.additional_keywords
            },
            additional_competitors: if cli.additional_competitors != 0 {
                cli.additional_competitors
            } else {
                add_ons.additional_competitors
            },
            output: if cli.output != "text" {
                cli.output.clone()
            } else {
                self.output.clone().unwrap_or_else(|| cli.output.clone())
            },
            save: cli.save.clone().or_else(|| self.save.clone()),
            verbose: if cli.verbose {
                cli.verbose
            } else {
                self.verbose.unwrap_or(cli.verbose)
            },
            rate_limit: cli.rate_limit.or(self.rate_limit),
            concurrency: if cli.concurrency != 4 {
                cli.concurrency
            } else {
                self.concurrency.unwrap_or(cli.concurrency)
            },
            respect_robots_txt: if !cli.respect_robots_txt {
                cli.respect_robots_txt
            } else {
                self.respect_robots_txt.unwrap_or(cli.respect_robots_txt)
            },
            renderer: if cli.renderer != RendererKind::Http {
                cli.renderer
            } else {
                self.renderer.unwrap_or(cli.renderer)
            },
            pagespeed_key: cli
                .pagespeed_key
                .clone()
                .or_else(|| self.pagespeed_api_key.clone()),
            config: cli.config.clone(),
        }
    }

    /// Engine settings from the merged CLI plus the file-only knobs
    pub fn engine_settings(&self, cli: &Cli) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            concurrency: cli.concurrency,
            requests_per_second: cli.rate_limit,
            respect_robots_txt: cli.respect_robots_txt,
            renderer: cli.renderer,
            show_progress: cli.output == "text" && !cli.verbose,
            pagespeed_api_key: cli
                .pagespeed_key
                .clone()
                .or_else(|| std::env::var("PAGESPEED_API_KEY").ok()),
            page_timeout: self
                .page_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.page_timeout),
            crawl_timeout: self
                .crawl_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.crawl_timeout),
            render_timeout: self
                .render_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.render_timeout),
            settle_delay: self
                .settle_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            qa_max_attempts: self.qa_max_attempts.unwrap_or(defaults.qa_max_attempts),
            qa_target_score: self.qa_target_score.unwrap_or(defaults.qa_target_score),
            scoring: self.scoring.unwrap_or_default(),
            ..defaults
        }
    }
}

impl From<&Cli> for AuditOptions {
    fn from(cli: &Cli) -> Self {
        AuditOptions {
            max_pages: cli.max_pages,
            max_depth: cli.depth,
            tier: cli.tier,
            add_ons: AddOns {
                performance_metrics: cli.performance,
                competitor_analysis: !cli.competitors.is_empty(),
                schema_deep_dive: cli.schema_deep_dive,
                extra_crawl_depth: cli.extra_depth,
                expedited: cli.expedited,
                alt_text_recommendations: cli.alt_text,
                additional_keywords: cli.additional_keywords,
                additional_competitors: cli.additional_competitors,
            },
            competitor_urls: cli.competitors.clone(),
        }
    }
}
