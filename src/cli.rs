use crate::config::{RendererKind, Tier};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "sitelens")]
#[command(about = "A website auditor: crawls a site and scores its technical, on-page, content and accessibility quality", long_about = None)]
pub struct Cli {
    /// The URL to audit
    #[arg(value_name = "URL")]
    pub url: String,

    /// Product tier; selects the default page and depth budget
    #[arg(short, long, value_enum, default_value_t = Tier::Standard)]
    pub tier: Tier,

    /// Maximum crawl depth (overrides the tier default)
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Maximum number of pages to crawl (overrides the tier default)
    #[arg(short, long)]
    pub max_pages: Option<usize>,

    /// Competitor site for keyword-gap analysis (repeatable)
    #[arg(long = "competitor", value_name = "URL")]
    pub competitors: Vec<String>,

    /// Fetch Core Web Vitals for the primary page
    #[arg(long)]
    pub performance: bool,

    /// Check structured data entities for recommended properties
    #[arg(long)]
    pub schema_deep_dive: bool,

    /// Crawl one level deeper than the tier allows
    #[arg(long)]
    pub extra_depth: bool,

    /// Suggest alt text for images that lack it
    #[arg(long)]
    pub alt_text: bool,

    /// Expedited delivery (no effect on the audit itself)
    #[arg(long)]
    pub expedited: bool,

    /// Extra keyword gaps to report
    #[arg(long, default_value_t = 0)]
    pub additional_keywords: u32,

    /// Extra competitors to analyze beyond the base allowance
    #[arg(long, default_value_t = 0)]
    pub additional_competitors: u32,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub output: String,

    /// Save the JSON result to file
    #[arg(short, long)]
    pub save: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Rate limit for requests per second (optional, e.g., 1.0 for 1 req/s)
    #[arg(short = 'r', long)]
    pub rate_limit: Option<f64>,

    /// Number of concurrent crawl workers (default: 4)
    #[arg(short = 'c', long, default_value_t = 4)]
    pub concurrency: usize,

    /// Respect robots.txt rules (default: true)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub respect_robots_txt: bool,

    /// Page renderer: http or browser
    #[arg(long, value_enum, default_value_t = RendererKind::Http)]
    pub renderer: RendererKind,

    /// PageSpeed Insights API key (falls back to PAGESPEED_API_KEY)
    #[arg(long)]
    pub pagespeed_key: Option<String>,

    /// Path to configuration file (JSON, TOML, or YAML)
    #[arg(long)]
    pub config: Option<String>,
}
