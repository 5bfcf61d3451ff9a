use crate::models::{AuditResult, CrawlTermination, Issue, IssueSeverity};
use anyhow::{Context, Result};
use colored::*;
use std::fs::File;
use std::io::Write;

/// Issues listed per category before the rest are summarized
const MAX_ISSUES_PER_CATEGORY: usize = 10;
/// Affected URLs printed under each issue
const MAX_URLS_PER_ISSUE: usize = 3;

pub struct Reporter;

impl Reporter {
    fn score_label(score: i32) -> ColoredString {
        let text = format!("{:>3}", score);
        if score >= 90 {
            text.bright_green()
        } else if score >= 70 {
            text.yellow()
        } else {
            text.bright_red()
        }
    }

    fn severity_label(severity: IssueSeverity) -> ColoredString {
        match severity {
            IssueSeverity::High => "HIGH".bright_red(),
            IssueSeverity::Medium => "MED ".yellow(),
            IssueSeverity::Low => "LOW ".bright_cyan(),
        }
    }

    fn count_label(count: usize, color: Color) -> ColoredString {
        if count > 0 {
            count.to_string().color(color)
        } else {
            count.to_string().bright_green()
        }
    }

    fn print_issue(issue: &Issue) {
        println!(
            "    [{}] {}",
            Self::severity_label(issue.severity),
            issue.message
        );
        if let Some(details) = &issue.details {
            println!("           {}", details.dimmed());
        }
        for url in issue.affected_pages.iter().take(MAX_URLS_PER_ISSUE) {
            println!("           - {}", url);
        }
        if issue.affected_pages.len() > MAX_URLS_PER_ISSUE {
            println!(
                "           {}",
                format!(
                    "... and {} more",
                    issue.affected_pages.len() - MAX_URLS_PER_ISSUE
                )
                .dimmed()
            );
        }
    }

    pub fn print_text_report(result: &AuditResult) {
        println!("\n{}", "=".repeat(80).bright_blue());
        println!("{}", "SiteLens - Audit Report".bright_cyan().bold());
        println!("{}", "=".repeat(80).bright_blue());
        println!();

        println!("{}: {}", "URL".bright_white().bold(), result.url);
        println!("{}: {}", "Generated".bright_white().bold(), result.generated_at);
        let termination = match result.crawl_termination {
            CrawlTermination::FrontierExhausted => "all reachable pages crawled".normal(),
            CrawlTermination::PageBudgetReached => "page budget reached".yellow(),
            CrawlTermination::TimedOut => "crawl time budget exhausted".bright_red(),
        };
        println!("{}: {}", "Crawl".bright_white().bold(), termination);
        println!();

        let summary = &result.summary;
        println!("{}", "Scores".bright_yellow().bold().underline());
        println!("  Overall:        {}", Self::score_label(summary.scores.overall).bold());
        println!("  Technical:      {}", Self::score_label(summary.scores.technical));
        println!("  On-page:        {}", Self::score_label(summary.scores.on_page));
        println!("  Content:        {}", Self::score_label(summary.scores.content));
        println!("  Accessibility:  {}", Self::score_label(summary.scores.accessibility));
        println!();

        println!("{}", "Summary".bright_yellow().bold().underline());
        println!(
            "  Pages Audited:   {}",
            summary.total_pages.to_string().bright_green()
        );
        println!(
            "  Failed Fetches:  {}",
            Self::count_label(summary.failed_pages, Color::BrightRed)
        );
        println!(
            "  High Severity:   {}",
            Self::count_label(summary.high_severity_issues, Color::BrightRed)
        );
        println!(
            "  Medium Severity: {}",
            Self::count_label(summary.medium_severity_issues, Color::Yellow)
        );
        println!(
            "  Low Severity:    {}",
            summary.low_severity_issues.to_string().bright_cyan()
        );
        println!(
            "  Average Words:   {:.0}",
            result.site_wide.average_word_count
        );
        println!();

        let categories = [
            ("Technical", &result.issues.technical),
            ("On-page", &result.issues.on_page),
            ("Content", &result.issues.content),
            ("Accessibility", &result.issues.accessibility),
            ("Performance", &result.issues.performance),
        ];
        for (name, issues) in categories {
            if issues.is_empty() {
                continue;
            }
            println!(
                "{} ({})",
                name.bright_yellow().bold().underline(),
                issues.len()
            );
            for issue in issues.iter().take(MAX_ISSUES_PER_CATEGORY) {
                Self::print_issue(issue);
            }
            if issues.len() > MAX_ISSUES_PER_CATEGORY {
                println!(
                    "    {}",
                    format!("... {} more", issues.len() - MAX_ISSUES_PER_CATEGORY).dimmed()
                );
            }
            println!();
        }

        if let Some(metrics) = result
            .primary_page()
            .and_then(|p| p.performance_metrics.as_ref())
        {
            println!("{}", "Performance".bright_yellow().bold().underline());
            let fmt = |v: Option<f64>| v.map_or("n/a".to_string(), |v| format!("{:.0}", v));
            println!(
                "  Score  mobile {:>6}  desktop {:>6}",
                fmt(metrics.performance_score.mobile),
                fmt(metrics.performance_score.desktop)
            );
            println!(
                "  LCP ms mobile {:>6}  desktop {:>6}",
                fmt(metrics.lcp.mobile),
                fmt(metrics.lcp.desktop)
            );
            println!(
                "  INP ms mobile {:>6}  desktop {:>6}",
                fmt(metrics.inp.mobile),
                fmt(metrics.inp.desktop)
            );
            println!();
        }

        if let Some(analysis) = &result.competitor_analysis {
            println!("{}", "Competitors".bright_yellow().bold().underline());
            for site in &analysis.competitors {
                println!("  {} ({} pages)", site.url, site.pages_crawled);
            }
            println!(
                "  Shared keywords: {}",
                analysis.shared_keywords.len().to_string().bright_green()
            );
            if !analysis.keyword_gaps.is_empty() {
                let gaps: Vec<&str> = analysis.keyword_gaps.iter().map(String::as_str).collect();
                println!("  Keyword gaps:    {}", gaps.join(", ").yellow());
            }
            println!();
        }

        println!("{}", "=".repeat(80).bright_blue());
    }

    pub fn save_json_report(result: &AuditResult, filename: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(result)?;
        let mut file =
            File::create(filename).with_context(|| format!("Failed to create {}", filename))?;
        file.write_all(json.as_bytes())?;
        println!("Report saved to: {}", filename.bright_green());
        Ok(())
    }
}
