use crate::config::AuditOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A URL waiting in the crawl frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: String,
    pub depth: usize,
    pub discovered_from: Option<String>,
}

/// A link followed by the crawler, recorded when the target is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlEdge {
    pub from: String,
    pub to: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlTermination {
    FrontierExhausted,
    PageBudgetReached,
    TimedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenGraphTags {
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_url: Option<String>,
    pub og_type: Option<String>,
}

impl OpenGraphTags {
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.og_title.is_none() {
            missing.push("og:title");
        }
        if self.og_description.is_none() {
            missing.push("og:description");
        }
        if self.og_image.is_none() {
            missing.push("og:image");
        }
        missing
    }
}

/// How much of a page only exists after client-side rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmReadability {
    pub rendering_percentage: f64,
    pub similarity: f64,
}

/// A structured-data entity found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntity {
    pub schema_type: String,
    pub source: SchemaSource,
    pub properties: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    JsonLd,
    Microdata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAltRecommendation {
    pub src: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub mobile: Option<f64>,
    pub desktop: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub savings_ms: Option<f64>,
}

/// Core Web Vitals for the primary page, in milliseconds (CLS is unitless).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub performance_score: MetricValue,
    pub lcp: MetricValue,
    pub fcp: MetricValue,
    pub cls: MetricValue,
    pub inp: MetricValue,
    pub ttfb: MetricValue,
    pub mobile_opportunities: Vec<Opportunity>,
    pub desktop_opportunities: Vec<Opportunity>,
}

/// Everything extracted from one successfully fetched page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub final_url: Option<String>,
    pub status_code: u16,
    pub depth: usize,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub lang: Option<String>,
    pub has_viewport: bool,
    pub open_graph: OpenGraphTags,
    pub h1_count: usize,
    pub h2_count: usize,
    pub skipped_heading_levels: usize,
    pub word_count: usize,
    pub image_count: usize,
    pub images_without_alt: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_alt_recommendations: Vec<ImageAltRecommendation>,
    pub empty_link_count: usize,
    pub unlabeled_input_count: usize,
    pub internal_link_count: usize,
    pub has_schema_markup: bool,
    pub has_identity_schema: bool,
    pub schema_entities: Vec<SchemaEntity>,
    pub initial_html_length: usize,
    pub rendered_html_length: usize,
    pub llm_readability: LlmReadability,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HttpStatus,
    RedirectToError,
    Network,
    Timeout,
}

/// Marker for a fetch that produced no PageRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub url: String,
    pub depth: usize,
    pub status_code: Option<u16>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueCategory {
    Technical,
    OnPage,
    Content,
    Accessibility,
    Performance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    BrokenPage,
    ScriptDependentContent,
    MissingCanonical,
    MissingViewport,
    MissingSchemaMarkup,
    MissingIdentitySchema,
    IncompleteSchema,
    SlowResponse,
    MissingTitle,
    TitleTooShort,
    TitleTooLong,
    DuplicateTitle,
    TemplateDuplicateTitle,
    MissingMetaDescription,
    MetaDescriptionTooShort,
    MetaDescriptionTooLong,
    DuplicateMetaDescription,
    MissingH1,
    MultipleH1,
    MissingOpenGraph,
    ThinContent,
    MissingSubheadings,
    MissingImageAlt,
    MissingLangAttribute,
    EmptyLinkText,
    UnlabeledFormControl,
    SkippedHeadingLevel,
    PoorPerformanceScore,
    SlowLargestContentfulPaint,
    HighLayoutShift,
    SlowInteraction,
}

/// A website defect, with the pages it was found on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub affected_pages: BTreeSet<String>,
    /// Set for site-wide absences, whose page set may be empty.
    #[serde(default)]
    pub site_wide: bool,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        category: IssueCategory,
        severity: IssueSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            category,
            severity,
            message: message.into(),
            details: None,
            affected_pages: BTreeSet::new(),
            site_wide: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_pages<I, S>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_pages.extend(pages.into_iter().map(Into::into));
        self
    }

    pub fn site_wide(mut self) -> Self {
        self.site_wide = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedIssues {
    pub technical: Vec<Issue>,
    pub on_page: Vec<Issue>,
    pub content: Vec<Issue>,
    pub accessibility: Vec<Issue>,
    pub performance: Vec<Issue>,
}

impl CategorizedIssues {
    pub fn from_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut categorized = Self::default();
        for issue in issues {
            categorized.push(issue);
        }
        categorized.sort();
        categorized
    }

    pub fn push(&mut self, issue: Issue) {
        match issue.category {
            IssueCategory::Technical => self.technical.push(issue),
            IssueCategory::OnPage => self.on_page.push(issue),
            IssueCategory::Content => self.content.push(issue),
            IssueCategory::Accessibility => self.accessibility.push(issue),
            IssueCategory::Performance => self.performance.push(issue),
        }
    }

    /// Orders each category by severity, then by number of affected pages.
    pub fn sort(&mut self) {
        for list in self.lists_mut() {
            list.sort_by(|a, b| {
                a.severity
                    .cmp(&b.severity)
                    .then_with(|| b.affected_pages.len().cmp(&a.affected_pages.len()))
            });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.technical
            .iter()
            .chain(&self.on_page)
            .chain(&self.content)
            .chain(&self.accessibility)
            .chain(&self.performance)
    }

    pub fn lists_mut(&mut self) -> [&mut Vec<Issue>; 5] {
        [
            &mut self.technical,
            &mut self.on_page,
            &mut self.content,
            &mut self.accessibility,
            &mut self.performance,
        ]
    }

    pub fn count_severity(&self, severity: IssueSeverity) -> usize {
        self.iter().filter(|issue| issue.severity == severity).count()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub overall: i32,
    pub technical: i32,
    pub on_page: i32,
    pub content: i32,
    pub accessibility: i32,
}

impl CategoryScores {
    pub fn all(&self) -> [i32; 5] {
        [
            self.overall,
            self.technical,
            self.on_page,
            self.content,
            self.accessibility,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub scores: CategoryScores,
    pub total_pages: usize,
    pub failed_pages: usize,
    pub total_issues: usize,
    pub high_severity_issues: usize,
    pub medium_severity_issues: usize,
    pub low_severity_issues: usize,
}

impl AuditSummary {
    /// Severity totals are always derived from the issue lists, never tracked separately.
    pub fn derive(
        scores: CategoryScores,
        issues: &CategorizedIssues,
        total_pages: usize,
        failed_pages: usize,
    ) -> Self {
        Self {
            scores,
            total_pages,
            failed_pages,
            total_issues: issues.len(),
            high_severity_issues: issues.count_severity(IssueSeverity::High),
            medium_severity_issues: issues.count_severity(IssueSeverity::Medium),
            low_severity_issues: issues.count_severity(IssueSeverity::Low),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateTitleGroup {
    pub title: String,
    pub pages: BTreeSet<String>,
    pub template_based: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDescriptionGroup {
    pub description: String,
    pub pages: BTreeSet<String>,
}

/// Cross-page rollups computed once the full page set is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteWide {
    pub duplicate_title_groups: Vec<DuplicateTitleGroup>,
    pub pages_with_duplicate_titles: BTreeSet<String>,
    pub duplicate_description_groups: Vec<DuplicateDescriptionGroup>,
    pub has_identity_schema: bool,
    pub pages_with_schema: usize,
    pub script_dependent_pages: usize,
    pub total_images: usize,
    pub images_without_alt: usize,
    pub total_words: usize,
    pub average_word_count: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorSite {
    pub url: String,
    pub pages_crawled: usize,
    pub keywords: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorAnalysis {
    pub competitor_urls: Vec<String>,
    pub competitors: Vec<CompetitorSite>,
    pub own_keywords: BTreeSet<String>,
    pub competitor_keywords: BTreeSet<String>,
    pub keyword_gaps: BTreeSet<String>,
    pub shared_keywords: BTreeSet<String>,
}

/// The finished audit, handed to external consumers as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub url: String,
    pub generated_at: String,
    pub options: AuditOptions,
    pub pages: Vec<PageRecord>,
    pub failed_pages: Vec<FailedPage>,
    pub edges: Vec<CrawlEdge>,
    pub crawl_termination: CrawlTermination,
    pub issues: CategorizedIssues,
    pub summary: AuditSummary,
    pub site_wide: SiteWide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor_analysis: Option<CompetitorAnalysis>,
}

impl AuditResult {
    /// Every URL an issue may legitimately reference.
    pub fn known_urls(&self) -> HashSet<&str> {
        self.pages
            .iter()
            .map(|page| page.url.as_str())
            .chain(self.failed_pages.iter().map(|page| page.url.as_str()))
            .collect()
    }

    pub fn primary_page(&self) -> Option<&PageRecord> {
        self.pages.iter().find(|page| page.depth == 0)
    }
}
