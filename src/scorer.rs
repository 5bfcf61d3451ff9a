use crate::config::ScoringPolicy;
use crate::models::{
    CategoryScores, FailedPage, FailureKind, Issue, IssueCategory, IssueKind, IssueSeverity,
    PageRecord,
};
use crate::readability::SCRIPT_DEPENDENT_THRESHOLD;
use crate::schema;
use std::collections::{BTreeMap, BTreeSet};

pub const TITLE_MIN_CHARS: usize = 30;
pub const TITLE_MAX_CHARS: usize = 60;
pub const META_DESCRIPTION_MIN_CHARS: usize = 70;
pub const META_DESCRIPTION_MAX_CHARS: usize = 160;
pub const THIN_CONTENT_WORDS: usize = 300;
pub const SLOW_RESPONSE_MS: u64 = 3000;

/// A per-page rule. Pages failing the same rule are reported as one issue.
struct PageCheck {
    kind: IssueKind,
    category: IssueCategory,
    severity: IssueSeverity,
    message: &'static str,
    details: &'static str,
    applies: fn(&PageRecord) -> bool,
}

fn chars(text: &Option<String>) -> Option<usize> {
    text.as_ref().map(|t| t.chars().count())
}

const PAGE_CHECKS: &[PageCheck] = &[
    PageCheck {
        kind: IssueKind::ScriptDependentContent,
        category: IssueCategory::Technical,
        severity: IssueSeverity::High,
        message: "Content depends on JavaScript rendering; content may be missed by automated readers",
        details: "Server-render the primary content so crawlers and LLM readers that skip scripts can see it",
        applies: |p| p.llm_readability.rendering_percentage > SCRIPT_DEPENDENT_THRESHOLD,
    },
    PageCheck {
        kind: IssueKind::MissingViewport,
        category: IssueCategory::Technical,
        severity: IssueSeverity::Medium,
        message: "Missing viewport meta tag",
        details: "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
        applies: |p| !p.has_viewport,
    },
    PageCheck {
        kind: IssueKind::SlowResponse,
        category: IssueCategory::Technical,
        severity: IssueSeverity::Medium,
        message: "Slow server response (over 3 seconds)",
        details: "Investigate server processing time, caching and hosting capacity",
        applies: |p| p.response_time_ms > SLOW_RESPONSE_MS,
    },
    PageCheck {
        kind: IssueKind::MissingCanonical,
        category: IssueCategory::Technical,
        severity: IssueSeverity::Low,
        message: "Missing canonical link",
        details: "Declare <link rel=\"canonical\"> to consolidate duplicate URLs",
        applies: |p| p.canonical_url.is_none(),
    },
    PageCheck {
        kind: IssueKind::MissingSchemaMarkup,
        category: IssueCategory::Technical,
        severity: IssueSeverity::Low,
        message: "No structured data found",
        details: "Add JSON-LD describing the page content",
        applies: |p| !p.has_schema_markup,
    },
    PageCheck {
        kind: IssueKind::MissingTitle,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::High,
        message: "Missing title tag",
        details: "Every page needs a unique, descriptive <title>",
        applies: |p| p.title.is_none(),
    },
    PageCheck {
        kind: IssueKind::TitleTooShort,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Title is too short (recommended: 30-60 characters)",
        details: "Expand the title with the page's main topic",
        applies: |p| chars(&p.title).is_some_and(|n| n < TITLE_MIN_CHARS),
    },
    PageCheck {
        kind: IssueKind::TitleTooLong,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Title is too long (recommended: 30-60 characters)",
        details: "Search results truncate long titles",
        applies: |p| chars(&p.title).is_some_and(|n| n > TITLE_MAX_CHARS),
    },
    PageCheck {
        kind: IssueKind::MissingMetaDescription,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Medium,
        message: "Missing meta description",
        details: "Write a summary that search engines can show as the snippet",
        applies: |p| p.meta_description.is_none(),
    },
    PageCheck {
        kind: IssueKind::MetaDescriptionTooShort,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Meta description is too short (recommended: 70-160 characters)",
        details: "Describe the page in one or two full sentences",
        applies: |p| chars(&p.meta_description).is_some_and(|n| n < META_DESCRIPTION_MIN_CHARS),
    },
    PageCheck {
        kind: IssueKind::MetaDescriptionTooLong,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Meta description is too long (recommended: 70-160 characters)",
        details: "Search results truncate long descriptions",
        applies: |p| chars(&p.meta_description).is_some_and(|n| n > META_DESCRIPTION_MAX_CHARS),
    },
    PageCheck {
        kind: IssueKind::MissingH1,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Medium,
        message: "Missing H1 heading",
        details: "Add one H1 stating the page's main topic",
        applies: |p| p.h1_count == 0,
    },
    PageCheck {
        kind: IssueKind::MultipleH1,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Multiple H1 headings",
        details: "Keep a single H1 and demote the others",
        applies: |p| p.h1_count > 1,
    },
    PageCheck {
        kind: IssueKind::MissingOpenGraph,
        category: IssueCategory::OnPage,
        severity: IssueSeverity::Low,
        message: "Incomplete Open Graph tags (og:title, og:description, og:image)",
        details: "Social shares fall back to guesses without Open Graph tags",
        applies: |p| !p.open_graph.missing_required().is_empty(),
    },
    PageCheck {
        kind: IssueKind::ThinContent,
        category: IssueCategory::Content,
        severity: IssueSeverity::Medium,
        message: "Thin content (fewer than 300 words)",
        details: "Expand the page with substantive, original content",
        applies: |p| p.word_count < THIN_CONTENT_WORDS,
    },
    PageCheck {
        kind: IssueKind::MissingSubheadings,
        category: IssueCategory::Content,
        severity: IssueSeverity::Low,
        message: "Long content without H2 subheadings",
        details: "Break long text into sections with descriptive H2 headings",
        applies: |p| p.h2_count == 0 && p.word_count >= THIN_CONTENT_WORDS,
    },
    PageCheck {
        kind: IssueKind::MissingImageAlt,
        category: IssueCategory::Accessibility,
        severity: IssueSeverity::Medium,
        message: "Images missing alt text",
        details: "Describe informative images with alt text; use alt=\"\" for decorative ones",
        applies: |p| p.images_without_alt > 0,
    },
    PageCheck {
        kind: IssueKind::MissingLangAttribute,
        category: IssueCategory::Accessibility,
        severity: IssueSeverity::Medium,
        message: "Missing lang attribute on <html>",
        details: "Screen readers need the document language to pick a voice",
        applies: |p| p.lang.is_none(),
    },
    PageCheck {
        kind: IssueKind::EmptyLinkText,
        category: IssueCategory::Accessibility,
        severity: IssueSeverity::Medium,
        message: "Links without an accessible name",
        details: "Give every link visible text, an aria-label, or an image with alt text",
        applies: |p| p.empty_link_count > 0,
    },
    PageCheck {
        kind: IssueKind::UnlabeledFormControl,
        category: IssueCategory::Accessibility,
        severity: IssueSeverity::Medium,
        message: "Form controls without labels",
        details: "Associate each input with a <label> or aria-label",
        applies: |p| p.unlabeled_input_count > 0,
    },
    PageCheck {
        kind: IssueKind::SkippedHeadingLevel,
        category: IssueCategory::Accessibility,
        severity: IssueSeverity::Low,
        message: "Heading levels are skipped",
        details: "Nest headings in order (H2 after H1, H3 after H2)",
        applies: |p| p.skipped_heading_levels > 0,
    },
];

/// Issues found by checking each page on its own, one issue per failing rule.
pub fn page_issues(pages: &[PageRecord], schema_deep_dive: bool) -> Vec<Issue> {
    let total = pages.len();
    let mut issues: Vec<Issue> = PAGE_CHECKS
        .iter()
        .filter_map(|check| {
            let affected: Vec<&str> = pages
                .iter()
                .filter(|p| (check.applies)(p))
                .map(|p| p.url.as_str())
                .collect();
            if affected.is_empty() {
                return None;
            }
            let mut issue = Issue::new(
                check.kind,
                check.category,
                check.severity,
                format!("{} ({} of {} pages)", check.message, affected.len(), total),
            )
            .with_details(check.details)
            .with_pages(affected);

            if check.kind == IssueKind::MissingImageAlt {
                let images: usize = pages.iter().map(|p| p.images_without_alt).sum();
                issue.details = Some(format!("{} images affected. {}", images, check.details));
            }
            Some(issue)
        })
        .collect();

    if schema_deep_dive {
        issues.extend(incomplete_schema_issues(pages));
    }
    issues
}

/// One issue per schema type whose entities lack recommended properties.
fn incomplete_schema_issues(pages: &[PageRecord]) -> Vec<Issue> {
    let mut by_type: BTreeMap<&str, (BTreeSet<&'static str>, BTreeSet<&str>)> = BTreeMap::new();
    for page in pages {
        for entity in &page.schema_entities {
            let missing = schema::missing_recommended_properties(entity);
            if missing.is_empty() {
                continue;
            }
            let (props, urls) = by_type.entry(entity.schema_type.as_str()).or_default();
            props.extend(missing);
            urls.insert(page.url.as_str());
        }
    }

    by_type
        .into_iter()
        .map(|(schema_type, (props, urls))| {
            Issue::new(
                IssueKind::IncompleteSchema,
                IssueCategory::Technical,
                IssueSeverity::Low,
                format!("{} structured data is missing recommended properties", schema_type),
            )
            .with_details(format!(
                "Add: {}",
                props.into_iter().collect::<Vec<_>>().join(", ")
            ))
            .with_pages(urls)
        })
        .collect()
}

/// Pages that answered with an error status, directly or after a redirect.
pub fn broken_page_issue(failed: &[FailedPage]) -> Option<Issue> {
    let broken: Vec<&FailedPage> = failed
        .iter()
        .filter(|f| matches!(f.kind, FailureKind::HttpStatus | FailureKind::RedirectToError))
        .collect();
    if broken.is_empty() {
        return None;
    }
    let details = broken
        .iter()
        .map(|f| format!("{}: {}", f.url, f.message))
        .collect::<Vec<_>>()
        .join("\n");
    Some(
        Issue::new(
            IssueKind::BrokenPage,
            IssueCategory::Technical,
            IssueSeverity::High,
            format!("{} linked pages return errors", broken.len()),
        )
        .with_details(details)
        .with_pages(broken.iter().map(|f| f.url.clone())),
    )
}

pub struct Scorer {
    policy: ScoringPolicy,
}

impl Scorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    fn severity_penalty(&self, severity: IssueSeverity) -> f64 {
        match severity {
            IssueSeverity::High => self.policy.penalties.high,
            IssueSeverity::Medium => self.policy.penalties.medium,
            IssueSeverity::Low => self.policy.penalties.low,
        }
    }

    /// Penalty scaled by how much of the site the issue touches
    pub fn issue_penalty(&self, issue: &Issue, total_pages: usize) -> f64 {
        let fraction = if issue.site_wide || total_pages == 0 {
            1.0
        } else {
            (issue.affected_pages.len() as f64 / total_pages as f64).min(1.0)
        };
        let floor = self.policy.min_fraction_factor;
        self.severity_penalty(issue.severity) * (floor + (1.0 - floor) * fraction)
    }

    fn category_score<'a>(
        &self,
        issues: impl Iterator<Item = &'a Issue>,
        category: IssueCategory,
        total_pages: usize,
    ) -> i32 {
        let penalty: f64 = issues
            .filter(|issue| issue.category == category)
            .map(|issue| self.issue_penalty(issue, total_pages))
            .sum();
        (100.0 - penalty).clamp(0.0, 100.0).round() as i32
    }

    /// Category scores from the final issue list. Performance issues are reported but not scored.
    pub fn category_scores(&self, issues: &[Issue], total_pages: usize) -> CategoryScores {
        let technical = self.category_score(issues.iter(), IssueCategory::Technical, total_pages);
        let on_page = self.category_score(issues.iter(), IssueCategory::OnPage, total_pages);
        let content = self.category_score(issues.iter(), IssueCategory::Content, total_pages);
        let accessibility =
            self.category_score(issues.iter(), IssueCategory::Accessibility, total_pages);

        let w = &self.policy.weights;
        let weighted = technical as f64 * w.technical as f64
            + on_page as f64 * w.on_page as f64
            + content as f64 * w.content as f64
            + accessibility as f64 * w.accessibility as f64;
        let overall = (weighted / 100.0).clamp(0.0, 100.0).round() as i32;

        CategoryScores {
            overall,
            technical,
            on_page,
            content,
            accessibility,
        }
    }

    /// Issues for every page plus the given site-level ones, and the resulting scores.
    /// `total_pages` for penalty scaling counts failed fetches too.
    pub fn score(
        &self,
        pages: &[PageRecord],
        failed: &[FailedPage],
        site_issues: Vec<Issue>,
        schema_deep_dive: bool,
    ) -> (CategoryScores, Vec<Issue>) {
        let mut issues = page_issues(pages, schema_deep_dive);
        issues.extend(broken_page_issue(failed));
        issues.extend(site_issues);

        let scores = self.category_scores(&issues, pages.len() + failed.len());
        (scores, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LlmReadability, OpenGraphTags, SchemaEntity, SchemaSource};

    /// A page that passes every per-page rule
    fn healthy(id: usize) -> PageRecord {
        PageRecord {
            url: format!("https://example.com/p{}", id),
            status_code: 200,
            title: Some("A descriptive page title for testing here".to_string()),
            meta_description: Some(
                "A meta description that is long enough to be within the recommended range."
                    .to_string(),
            ),
            canonical_url: Some(format!("https://example.com/p{}", id)),
            lang: Some("en".to_string()),
            has_viewport: true,
            open_graph: OpenGraphTags {
                og_title: Some("t".to_string()),
                og_description: Some("d".to_string()),
                og_image: Some("i".to_string()),
                ..Default::default()
            },
            h1_count: 1,
            h2_count: 2,
            word_count: 500,
            has_schema_markup: true,
            llm_readability: LlmReadability {
                rendering_percentage: 0.0,
                similarity: 100.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_pages_have_no_issues() {
        let pages: Vec<PageRecord> = (0..3).map(healthy).collect();
        assert!(page_issues(&pages, false).is_empty());

        let (scores, issues) = Scorer::new(ScoringPolicy::default()).score(&pages, &[], vec![], false);
        assert!(issues.is_empty());
        assert_eq!(scores.all(), [100; 5]);
    }

    #[test]
    fn test_issues_group_pages_by_rule() {
        let mut pages: Vec<PageRecord> = (0..4).map(healthy).collect();
        pages[1].title = None;
        pages[3].title = None;
        pages[2].images_without_alt = 3;

        let issues = page_issues(&pages, false);
        let missing_title = issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingTitle)
            .unwrap();
        assert_eq!(missing_title.affected_pages.len(), 2);
        assert!(missing_title.message.contains("2 of 4 pages"));

        let alt = issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingImageAlt)
            .unwrap();
        assert_eq!(alt.category, IssueCategory::Accessibility);
        assert!(alt.details.as_deref().unwrap().starts_with("3 images"));
    }

    #[test]
    fn test_script_dependent_page_is_high_technical() {
        let mut page = healthy(0);
        page.llm_readability.rendering_percentage = 160.0;
        let issues = page_issues(&[page], false);
        let issue = &issues[0];
        assert_eq!(issue.kind, IssueKind::ScriptDependentContent);
        assert_eq!(issue.severity, IssueSeverity::High);
        assert_eq!(issue.category, IssueCategory::Technical);
        assert!(issue.message.contains("may be missed by automated readers"));
    }

    #[test]
    fn test_schema_deep_dive_only_when_enabled() {
        let mut page = healthy(0);
        page.schema_entities.push(SchemaEntity {
            schema_type: "Product".to_string(),
            source: SchemaSource::JsonLd,
            properties: ["name".to_string()].into_iter().collect(),
        });
        assert!(page_issues(std::slice::from_ref(&page), false).is_empty());

        let issues = page_issues(&[page], true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::IncompleteSchema);
        assert!(issues[0].details.as_deref().unwrap().contains("offers"));
    }

    #[test]
    fn test_broken_pages_exclude_network_failures() {
        let failed = vec![
            FailedPage {
                url: "https://example.com/gone".to_string(),
                depth: 1,
                status_code: Some(404),
                kind: FailureKind::HttpStatus,
                message: "HTTP 404".to_string(),
            },
            FailedPage {
                url: "https://example.com/slow".to_string(),
                depth: 1,
                status_code: None,
                kind: FailureKind::Timeout,
                message: "timed out".to_string(),
            },
        ];
        let issue = broken_page_issue(&failed).unwrap();
        assert_eq!(issue.affected_pages.len(), 1);
        assert!(issue.affected_pages.contains("https://example.com/gone"));
    }

    #[test]
    fn test_penalty_scales_with_affected_fraction() {
        let scorer = Scorer::new(ScoringPolicy::default());
        let one = Issue::new(
            IssueKind::MissingH1,
            IssueCategory::OnPage,
            IssueSeverity::High,
            "x",
        )
        .with_pages(["https://example.com/a"]);
        let all = one.clone().with_pages((0..10).map(|i| format!("https://example.com/{}", i)));

        let small = scorer.issue_penalty(&one, 10);
        let large = scorer.issue_penalty(&all, 10);
        assert!((small - 15.0 * (0.3 + 0.7 * 0.1)).abs() < 1e-9);
        assert!((large - 15.0).abs() < 1e-9);
        assert!(small < large);
    }

    #[test]
    fn test_site_wide_issue_uses_full_penalty() {
        let scorer = Scorer::new(ScoringPolicy::default());
        let issue = Issue::new(
            IssueKind::MissingIdentitySchema,
            IssueCategory::Technical,
            IssueSeverity::Medium,
            "x",
        )
        .site_wide();
        assert!((scorer.issue_penalty(&issue, 50) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_clamped_to_bounds() {
        let pages: Vec<PageRecord> = (0..5)
            .map(|i| PageRecord {
                url: format!("https://example.com/{}", i),
                status_code: 200,
                llm_readability: LlmReadability {
                    rendering_percentage: 500.0,
                    similarity: 16.0,
                },
                skipped_heading_levels: 1,
                empty_link_count: 1,
                unlabeled_input_count: 2,
                images_without_alt: 1,
                ..Default::default()
            })
            .collect();
        let mut site_issues = Vec::new();
        for _ in 0..10 {
            site_issues.push(
                Issue::new(
                    IssueKind::MissingIdentitySchema,
                    IssueCategory::Technical,
                    IssueSeverity::High,
                    "x",
                )
                .site_wide(),
            );
        }

        let (scores, _) = Scorer::new(ScoringPolicy::default()).score(&pages, &[], site_issues, false);
        for score in scores.all() {
            assert!((0..=100).contains(&score));
        }
        assert_eq!(scores.technical, 0);
    }

    #[test]
    fn test_overall_is_weighted_combination() {
        let scorer = Scorer::new(ScoringPolicy::default());
        let issue = Issue::new(
            IssueKind::MissingLangAttribute,
            IssueCategory::Accessibility,
            IssueSeverity::High,
            "x",
        )
        .site_wide();
        let scores = scorer.category_scores(&[issue], 1);
        assert_eq!(scores.accessibility, 85);
        // 100*0.30 + 100*0.30 + 100*0.25 + 85*0.15 = 97.75
        assert_eq!(scores.overall, 98);
    }

    #[test]
    fn test_performance_issues_are_not_scored() {
        let scorer = Scorer::new(ScoringPolicy::default());
        let issue = Issue::new(
            IssueKind::PoorPerformanceScore,
            IssueCategory::Performance,
            IssueSeverity::High,
            "x",
        )
        .site_wide();
        assert_eq!(scorer.category_scores(&[issue], 1).all(), [100; 5]);
    }
}
