//! Cross-page patterns that only show up once every page is known.

use crate::models::{
    DuplicateDescriptionGroup, DuplicateTitleGroup, Issue, IssueCategory, IssueKind,
    IssueSeverity, PageRecord, SiteWide,
};
use crate::readability;
use std::collections::{BTreeSet, HashMap};

/// Smallest duplicate group that can be explained by a shared template
const TEMPLATE_MIN_GROUP: usize = 3;
/// Share of the crawled pages a template group must cover
const TEMPLATE_MIN_SHARE: f64 = 0.5;
/// Allowed distance of each member's word count from the group mean
const TEMPLATE_WORD_TOLERANCE: f64 = 50.0;

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub site_wide: SiteWide,
    pub issues: Vec<Issue>,
}

/// Trimmed, lowercased, whitespace collapsed
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Groups pages by a normalized key, keeping first-seen order. Only groups of two or more.
fn duplicate_groups<'a, F>(pages: &'a [PageRecord], key: F) -> Vec<(String, Vec<&'a PageRecord>)>
where
    F: Fn(&'a PageRecord) -> Option<&'a str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&PageRecord>)> = Vec::new();

    for page in pages {
        let Some(raw) = key(page) else { continue };
        let normalized = normalize_title(raw);
        if normalized.is_empty() {
            continue;
        }
        match index.get(&normalized) {
            Some(&i) => groups[i].1.push(page),
            None => {
                index.insert(normalized, groups.len());
                groups.push((raw.trim().to_string(), vec![page]));
            }
        }
    }

    groups.retain(|(_, members)| members.len() > 1);
    groups
}

/// A shared title reads as template reuse when the group is large, covers most of the site
/// and its members are structurally alike.
pub fn is_template_group(members: &[&PageRecord], total_pages: usize) -> bool {
    let size = members.len();
    if size < TEMPLATE_MIN_GROUP || total_pages == 0 {
        return false;
    }
    if (size as f64) / (total_pages as f64) < TEMPLATE_MIN_SHARE {
        return false;
    }

    let mean = members.iter().map(|p| p.word_count as f64).sum::<f64>() / size as f64;
    if members
        .iter()
        .any(|p| (p.word_count as f64 - mean).abs() > TEMPLATE_WORD_TOLERANCE)
    {
        return false;
    }

    let first = members[0];
    members
        .iter()
        .all(|p| p.h1_count == first.h1_count && p.h2_count == first.h2_count)
}

pub fn aggregate(pages: &[PageRecord]) -> Aggregation {
    let total_pages = pages.len();
    let mut site_wide = SiteWide::default();
    let mut issues = Vec::new();

    for (title, members) in duplicate_groups(pages, |p| p.title.as_deref()) {
        let urls: BTreeSet<String> = members.iter().map(|p| p.url.clone()).collect();
        let template_based = is_template_group(&members, total_pages);

        let issue = if template_based {
            Issue::new(
                IssueKind::TemplateDuplicateTitle,
                IssueCategory::OnPage,
                IssueSeverity::Low,
                format!(
                    "{} pages share the template title \"{}\"",
                    urls.len(),
                    title
                ),
            )
            .with_details("Give each page generated from this template a distinguishing title")
        } else {
            Issue::new(
                IssueKind::DuplicateTitle,
                IssueCategory::OnPage,
                IssueSeverity::Medium,
                format!("{} pages have the duplicate title \"{}\"", urls.len(), title),
            )
            .with_details("Each page should have a unique title describing its own content")
        };
        issues.push(issue.with_pages(urls.iter().cloned()));

        site_wide
            .pages_with_duplicate_titles
            .extend(urls.iter().cloned());
        site_wide.duplicate_title_groups.push(DuplicateTitleGroup {
            title,
            pages: urls,
            template_based,
        });
    }

    for (description, members) in duplicate_groups(pages, |p| p.meta_description.as_deref()) {
        let urls: BTreeSet<String> = members.iter().map(|p| p.url.clone()).collect();
        issues.push(
            Issue::new(
                IssueKind::DuplicateMetaDescription,
                IssueCategory::OnPage,
                IssueSeverity::Medium,
                format!("{} pages share the same meta description", urls.len()),
            )
            .with_details(description.clone())
            .with_pages(urls.iter().cloned()),
        );
        site_wide
            .duplicate_description_groups
            .push(DuplicateDescriptionGroup {
                description,
                pages: urls,
            });
    }

    site_wide.has_identity_schema = pages.iter().any(|p| p.has_identity_schema);
    if total_pages > 0 && !site_wide.has_identity_schema {
        issues.push(
            Issue::new(
                IssueKind::MissingIdentitySchema,
                IssueCategory::Technical,
                IssueSeverity::Medium,
                "No page declares Organization or Person structured data",
            )
            .with_details(
                "Add JSON-LD describing the organization (name and url) or person behind the site",
            )
            .site_wide(),
        );
    }

    site_wide.pages_with_schema = pages.iter().filter(|p| p.has_schema_markup).count();
    site_wide.script_dependent_pages = pages
        .iter()
        .filter(|p| readability::is_script_dependent(p.initial_html_length, p.rendered_html_length))
        .count();
    site_wide.total_images = pages.iter().map(|p| p.image_count).sum();
    site_wide.images_without_alt = pages.iter().map(|p| p.images_without_alt).sum();
    site_wide.total_words = pages.iter().map(|p| p.word_count).sum();
    site_wide.average_word_count = if total_pages == 0 {
        0.0
    } else {
        ((site_wide.total_words as f64 / total_pages as f64) * 100.0).round() / 100.0
    };

    Aggregation { site_wide, issues }
}
