//! Post-hoc consistency validation of a finished audit, with bounded automatic repair.
//!
//! Each check inspects the result and offers a pure repair. The validator loops
//! validate -> repair until the quality score reaches its target, nothing fixable
//! is left, or the attempt budget runs out.

use crate::config::ScoringPolicy;
use crate::keywords::is_garbage_keyword;
use crate::models::{AuditResult, AuditSummary, CategorizedIssues, IssueCategory, IssueKind};
use crate::readability;
use crate::scorer::Scorer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QaSeverity {
    Critical,
    Major,
    Minor,
}

impl QaSeverity {
    pub fn weight(&self) -> f64 {
        match self {
            QaSeverity::Critical => 3.0,
            QaSeverity::Major => 1.5,
            QaSeverity::Minor => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaIssue {
    pub check: String,
    pub severity: QaSeverity,
    pub message: String,
    pub fixable: bool,
}

impl QaIssue {
    fn new(check: &str, severity: QaSeverity, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity,
            message: message.into(),
            fixable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaState {
    Validated,
    NeedsRepair,
    Exhausted,
    Unrepairable,
}

impl QaState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QaState::NeedsRepair)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub state: QaState,
    pub attempts: usize,
    pub score: f64,
    /// Issues still present after the last validation
    pub remaining_issues: Vec<QaIssue>,
}

/// 10 minus the weighted issue count, floored at 0
pub fn quality_score(issues: &[QaIssue]) -> f64 {
    let penalty: f64 = issues.iter().map(|i| i.severity.weight()).sum();
    (10.0 - penalty).max(0.0)
}

pub trait QaCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, result: &AuditResult) -> Vec<QaIssue>;

    /// Returns a repaired copy; never touches anything the check does not own.
    fn repair(&self, result: AuditResult) -> AuditResult;
}

/// Summary counts and category buckets must match the issue lists.
pub struct IssueCountCheck;

impl QaCheck for IssueCountCheck {
    fn name(&self) -> &'static str {
        "issue_count_consistency"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        let mut issues = Vec::new();
        let derived = AuditSummary::derive(
            result.summary.scores,
            &result.issues,
            result.pages.len(),
            result.failed_pages.len(),
        );
        if derived != result.summary {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Major,
                format!(
                    "summary reports {} issues ({} high, {} medium, {} low) but the lists hold {} ({} high, {} medium, {} low)",
                    result.summary.total_issues,
                    result.summary.high_severity_issues,
                    result.summary.medium_severity_issues,
                    result.summary.low_severity_issues,
                    derived.total_issues,
                    derived.high_severity_issues,
                    derived.medium_severity_issues,
                    derived.low_severity_issues,
                ),
            ));
        }

        let misplaced = [
            (IssueCategory::Technical, &result.issues.technical),
            (IssueCategory::OnPage, &result.issues.on_page),
            (IssueCategory::Content, &result.issues.content),
            (IssueCategory::Accessibility, &result.issues.accessibility),
            (IssueCategory::Performance, &result.issues.performance),
        ]
        .iter()
        .map(|(category, list)| list.iter().filter(|i| i.category != *category).count())
        .sum::<usize>();
        if misplaced > 0 {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Major,
                format!("{} issues are filed under the wrong category", misplaced),
            ));
        }
        issues
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        result.issues = CategorizedIssues::from_issues(result.issues.iter().cloned());
        result.summary = AuditSummary::derive(
            result.summary.scores,
            &result.issues,
            result.pages.len(),
            result.failed_pages.len(),
        );
        result
    }
}

/// Readability values must be finite, non-negative and match the formula.
pub struct ReadabilityCheck;

impl QaCheck for ReadabilityCheck {
    fn name(&self) -> &'static str {
        "readability_formula"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        result
            .pages
            .iter()
            .filter(|p| {
                !readability::is_consistent(
                    &p.llm_readability,
                    p.initial_html_length,
                    p.rendered_html_length,
                )
            })
            .map(|p| {
                QaIssue::new(
                    self.name(),
                    QaSeverity::Major,
                    format!(
                        "{}: readability {:?} does not match lengths {} / {}",
                        p.url, p.llm_readability, p.initial_html_length, p.rendered_html_length
                    ),
                )
            })
            .collect()
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        for page in &mut result.pages {
            page.llm_readability =
                readability::compute(page.initial_html_length, page.rendered_html_length);
        }
        result
    }
}

/// Competitor keyword sets hold only clean keywords and obey the set algebra.
pub struct KeywordQualityCheck;

impl QaCheck for KeywordQualityCheck {
    fn name(&self) -> &'static str {
        "keyword_quality"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        let Some(analysis) = &result.competitor_analysis else {
            return Vec::new();
        };
        let mut issues = Vec::new();

        let garbage: BTreeSet<&String> = analysis
            .own_keywords
            .iter()
            .chain(&analysis.competitor_keywords)
            .chain(&analysis.keyword_gaps)
            .chain(&analysis.shared_keywords)
            .filter(|k| is_garbage_keyword(k))
            .collect();
        if !garbage.is_empty() {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Major,
                format!(
                    "{} garbage keywords: {}",
                    garbage.len(),
                    garbage.into_iter().take(10).cloned().collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let gaps: BTreeSet<String> = analysis
            .competitor_keywords
            .difference(&analysis.own_keywords)
            .cloned()
            .collect();
        let shared: BTreeSet<String> = analysis
            .competitor_keywords
            .intersection(&analysis.own_keywords)
            .cloned()
            .collect();
        if gaps != analysis.keyword_gaps || shared != analysis.shared_keywords {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Major,
                "keyword gaps or shared keywords do not follow from the keyword sets",
            ));
        }
        issues
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        if let Some(analysis) = result.competitor_analysis.as_mut() {
            let clean = |set: &BTreeSet<String>| -> BTreeSet<String> {
                set.iter().filter(|k| !is_garbage_keyword(k)).cloned().collect()
            };
            analysis.own_keywords = clean(&analysis.own_keywords);
            analysis.competitor_keywords = clean(&analysis.competitor_keywords);
            analysis.keyword_gaps = analysis
                .competitor_keywords
                .difference(&analysis.own_keywords)
                .cloned()
                .collect();
            analysis.shared_keywords = analysis
                .competitor_keywords
                .intersection(&analysis.own_keywords)
                .cloned()
                .collect();
        }
        result
    }
}

/// Scores lie in 0..=100 and overall is the weighted combination of the categories.
pub struct ScoreBoundsCheck {
    policy: ScoringPolicy,
}

impl ScoreBoundsCheck {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    fn weighted_overall(&self, result: &AuditResult) -> i32 {
        let s = &result.summary.scores;
        let w = &self.policy.weights;
        let weighted = s.technical.clamp(0, 100) as f64 * w.technical as f64
            + s.on_page.clamp(0, 100) as f64 * w.on_page as f64
            + s.content.clamp(0, 100) as f64 * w.content as f64
            + s.accessibility.clamp(0, 100) as f64 * w.accessibility as f64;
        (weighted / 100.0).round() as i32
    }
}

impl QaCheck for ScoreBoundsCheck {
    fn name(&self) -> &'static str {
        "score_bounds"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        let mut issues = Vec::new();
        let out_of_range: Vec<i32> = result
            .summary
            .scores
            .all()
            .into_iter()
            .filter(|s| !(0..=100).contains(s))
            .collect();
        if !out_of_range.is_empty() {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Critical,
                format!("scores outside 0-100: {:?}", out_of_range),
            ));
        }
        let expected = self.weighted_overall(result);
        if (expected - result.summary.scores.overall).abs() > 1 {
            issues.push(QaIssue::new(
                self.name(),
                QaSeverity::Major,
                format!(
                    "overall score {} does not match the weighted categories ({})",
                    result.summary.scores.overall, expected
                ),
            ));
        }
        issues
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        let scores = &mut result.summary.scores;
        scores.technical = scores.technical.clamp(0, 100);
        scores.on_page = scores.on_page.clamp(0, 100);
        scores.content = scores.content.clamp(0, 100);
        scores.accessibility = scores.accessibility.clamp(0, 100);
        let overall = self.weighted_overall(&result);
        result.summary.scores.overall = overall.clamp(0, 100);
        result
    }
}

fn duplicate_title_issue_urls(result: &AuditResult) -> BTreeSet<String> {
    result
        .issues
        .iter()
        .filter(|i| {
            matches!(
                i.kind,
                IssueKind::DuplicateTitle | IssueKind::TemplateDuplicateTitle
            )
        })
        .flat_map(|i| i.affected_pages.iter().cloned())
        .collect()
}

/// URLs in duplicate-title issues and the site-wide duplicate set must agree.
pub struct DuplicateTitleCheck;

impl QaCheck for DuplicateTitleCheck {
    fn name(&self) -> &'static str {
        "duplicate_title_invariant"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        let from_issues = duplicate_title_issue_urls(result);
        let recorded = &result.site_wide.pages_with_duplicate_titles;
        let drift = from_issues.symmetric_difference(recorded).count();
        if drift == 0 {
            return Vec::new();
        }
        // A single stray URL is tolerated as minor
        let severity = if drift == 1 {
            QaSeverity::Minor
        } else {
            QaSeverity::Major
        };
        vec![QaIssue::new(
            self.name(),
            severity,
            format!(
                "{} pages appear in duplicate-title issues but {} are recorded site-wide",
                from_issues.len(),
                recorded.len()
            ),
        )]
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        result.site_wide.pages_with_duplicate_titles = duplicate_title_issue_urls(&result);
        result
    }
}

/// Issues reference only audited URLs, and only site-wide issues may reference none.
pub struct AffectedPagesCheck {
    policy: ScoringPolicy,
}

impl AffectedPagesCheck {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }
}

impl QaCheck for AffectedPagesCheck {
    fn name(&self) -> &'static str {
        "affected_page_integrity"
    }

    fn check(&self, result: &AuditResult) -> Vec<QaIssue> {
        let known = result.known_urls();
        let mut issues = Vec::new();
        for issue in result.issues.iter() {
            if issue.affected_pages.is_empty() && !issue.site_wide {
                issues.push(QaIssue::new(
                    self.name(),
                    QaSeverity::Major,
                    format!("{:?} issue has no affected pages", issue.kind),
                ));
            }
            let unknown = issue
                .affected_pages
                .iter()
                .filter(|url| !known.contains(url.as_str()))
                .count();
            if unknown > 0 {
                issues.push(QaIssue::new(
                    self.name(),
                    QaSeverity::Major,
                    format!(
                        "{:?} issue references {} URLs that were not audited",
                        issue.kind, unknown
                    ),
                ));
            }
        }
        issues
    }

    fn repair(&self, mut result: AuditResult) -> AuditResult {
        let known: BTreeSet<String> = result.known_urls().into_iter().map(str::to_string).collect();
        let before = result.issues.clone();
        for list in result.issues.lists_mut() {
            for issue in list.iter_mut() {
                issue.affected_pages.retain(|url| known.contains(url));
            }
            list.retain(|issue| issue.site_wide || !issue.affected_pages.is_empty());
        }
        if result.issues == before {
            return result;
        }

        // Penalties scale with affected pages, so the scores follow the trimmed issues
        let issues: Vec<_> = result.issues.iter().cloned().collect();
        let total_pages = result.pages.len() + result.failed_pages.len();
        let scores = Scorer::new(self.policy).category_scores(&issues, total_pages);
        result.summary = AuditSummary::derive(
            scores,
            &result.issues,
            result.pages.len(),
            result.failed_pages.len(),
        );
        result
    }
}

pub struct QaValidator {
    checks: Vec<Box<dyn QaCheck>>,
    max_attempts: usize,
    target_score: f64,
}

impl QaValidator {
    pub fn new(policy: ScoringPolicy, max_attempts: usize, target_score: f64) -> Self {
        Self::with_checks(
            vec![
                Box::new(AffectedPagesCheck::new(policy)),
                Box::new(DuplicateTitleCheck),
                Box::new(ReadabilityCheck),
                Box::new(KeywordQualityCheck),
                Box::new(ScoreBoundsCheck::new(policy)),
                Box::new(IssueCountCheck),
            ],
            max_attempts,
            target_score,
        )
    }

    pub fn with_checks(checks: Vec<Box<dyn QaCheck>>, max_attempts: usize, target_score: f64) -> Self {
        Self {
            checks,
            max_attempts,
            target_score,
        }
    }

    pub fn validate(&self, result: &AuditResult) -> Vec<QaIssue> {
        self.checks.iter().flat_map(|c| c.check(result)).collect()
    }

    fn classify(&self, issues: &[QaIssue], attempts: usize) -> QaState {
        let has_critical = issues.iter().any(|i| i.severity == QaSeverity::Critical);
        if quality_score(issues) >= self.target_score && !has_critical {
            QaState::Validated
        } else if !issues.iter().any(|i| i.fixable) {
            QaState::Unrepairable
        } else if attempts >= self.max_attempts {
            QaState::Exhausted
        } else {
            QaState::NeedsRepair
        }
    }

    /// Applies the repair of every check that reported a fixable issue.
    pub fn repair(&self, result: AuditResult, issues: &[QaIssue]) -> AuditResult {
        self.checks
            .iter()
            .filter(|check| issues.iter().any(|i| i.fixable && i.check == check.name()))
            .fold(result, |result, check| check.repair(result))
    }

    pub fn run(&self, mut result: AuditResult) -> (AuditResult, QaReport) {
        let mut attempts = 0;
        loop {
            let issues = self.validate(&result);
            let state = self.classify(&issues, attempts);
            tracing::debug!(attempts, issues = issues.len(), state = ?state, "QA pass");

            if state == QaState::NeedsRepair {
                result = self.repair(result, &issues);
                attempts += 1;
                continue;
            }

            let score = quality_score(&issues);
            match state {
                QaState::Exhausted => tracing::warn!(
                    attempts,
                    score,
                    remaining = issues.len(),
                    "QA repair attempts exhausted, returning result with unresolved issues"
                ),
                QaState::Unrepairable => tracing::warn!(
                    score,
                    remaining = issues.len(),
                    "QA found issues that cannot be repaired automatically"
                ),
                _ => tracing::info!(attempts, score, "QA validation passed"),
            }
            for issue in &issues {
                tracing::debug!(check = %issue.check, severity = ?issue.severity, "{}", issue.message);
            }

            return (
                result,
                QaReport {
                    state,
                    attempts,
                    score,
                    remaining_issues: issues,
                },
            );
        }
    }
}
