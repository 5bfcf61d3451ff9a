//! Competitor crawl and keyword-gap analysis.

use crate::config::AddOns;
use crate::crawler::{Crawler, CrawlerConfig};
use crate::error::AddOnError;
use crate::keywords::{self, DEFAULT_MAX_KEYWORDS, dedup_key};
use crate::models::{CompetitorAnalysis, CompetitorSite};
use crate::renderer::Renderer;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use url::Url;

/// Competitors analyzed without the `additional_competitors` add-on
pub const BASE_COMPETITOR_CAP: usize = 3;
/// Keyword gaps reported without the `additional_keywords` add-on
pub const BASE_GAP_LIMIT: usize = 25;
/// Competitors are only crawled one level below their start page
pub const COMPETITOR_MAX_DEPTH: usize = 1;

pub fn competitor_cap(add_ons: &AddOns) -> usize {
    BASE_COMPETITOR_CAP + add_ons.additional_competitors as usize
}

pub fn gap_limit(add_ons: &AddOns) -> usize {
    BASE_GAP_LIMIT + add_ons.additional_keywords as usize
}

/// Compares the audited site's keywords with the competitors'.
///
/// Keywords match on their hyphen and case insensitive form, and a competitor keyword
/// matching an own keyword takes the own spelling. Gaps are ranked by how many
/// competitors use them, and only the top `gap_limit` stay in `competitor_keywords`,
/// so `keyword_gaps == competitor_keywords - own_keywords` holds exactly.
pub fn compare(
    own_keywords: BTreeSet<String>,
    competitors: Vec<CompetitorSite>,
    gap_limit: usize,
) -> CompetitorAnalysis {
    let own_keywords = keywords::clean_keywords(&own_keywords);
    let own_forms: HashMap<String, &String> =
        own_keywords.iter().map(|k| (dedup_key(k), k)).collect();

    // dedup key -> (number of competitors using it, first spelling seen)
    let mut usage: HashMap<String, (usize, String)> = HashMap::new();
    for site in &competitors {
        let mut counted = HashSet::new();
        for keyword in keywords::clean_keywords(&site.keywords) {
            let key = dedup_key(&keyword);
            if counted.insert(key.clone()) {
                usage.entry(key).or_insert((0, keyword)).0 += 1;
            }
        }
    }

    let mut shared_keywords = BTreeSet::new();
    let mut gap_candidates: Vec<(usize, String)> = Vec::new();
    for (key, (count, form)) in usage {
        match own_forms.get(&key) {
            Some(own) => {
                shared_keywords.insert((*own).clone());
            }
            None => gap_candidates.push((count, form)),
        }
    }
    gap_candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    let keyword_gaps: BTreeSet<String> = gap_candidates
        .into_iter()
        .take(gap_limit)
        .map(|(_, form)| form)
        .collect();

    let competitor_keywords: BTreeSet<String> =
        shared_keywords.union(&keyword_gaps).cloned().collect();

    CompetitorAnalysis {
        competitor_urls: competitors.iter().map(|c| c.url.clone()).collect(),
        competitors,
        own_keywords,
        competitor_keywords,
        keyword_gaps,
        shared_keywords,
    }
}

/// Crawls competitor sites with a small page budget
pub struct CompetitorCrawler {
    renderer: Arc<dyn Renderer>,
    config: CrawlerConfig,
    page_cap: usize,
}

impl CompetitorCrawler {
    pub fn new(renderer: Arc<dyn Renderer>, mut config: CrawlerConfig, page_cap: usize) -> Self {
        config.show_progress = false;
        Self {
            renderer,
            config,
            page_cap: page_cap.max(1),
        }
    }

    async fn crawl_one(&self, url: &str) -> Result<CompetitorSite, AddOnError> {
        let failure = |reason: String| AddOnError::Competitor {
            url: url.to_string(),
            reason,
        };
        let start = Url::parse(url).map_err(|e| failure(e.to_string()))?;
        if !matches!(start.scheme(), "http" | "https") {
            return Err(failure(format!("unsupported scheme '{}'", start.scheme())));
        }

        let crawler = Crawler::new(Arc::clone(&self.renderer), self.config.clone())
            .map_err(|e| failure(e.to_string()))?;
        let output = crawler
            .crawl(&start, self.page_cap, COMPETITOR_MAX_DEPTH)
            .await;
        if output.pages.is_empty() {
            return Err(failure(format!(
                "no pages could be fetched ({} attempted)",
                output.failed.len()
            )));
        }

        let keywords = keywords::site_keywords(
            output.pages.iter().map(|p| p.visible_text.as_str()),
            DEFAULT_MAX_KEYWORDS,
        );
        Ok(CompetitorSite {
            url: url.to_string(),
            pages_crawled: output.pages.len(),
            keywords,
        })
    }

    /// Crawls every competitor concurrently. Failed competitors are logged and skipped.
    pub async fn crawl_all(&self, urls: &[String], cap: usize) -> Vec<CompetitorSite> {
        let mut unique: Vec<&String> = Vec::new();
        for url in urls {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        if unique.len() > cap {
            tracing::warn!(
                requested = unique.len(),
                cap,
                "More competitors than the plan allows, analyzing the first ones only"
            );
            unique.truncate(cap);
        }

        let results = join_all(unique.iter().map(|url| self.crawl_one(url))).await;
        results
            .into_iter()
            .filter_map(|result| {
                result
                    .inspect_err(|e| tracing::warn!(error = %e, "Competitor analysis skipped a site"))
                    .ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn site(url: &str, words: &[&str]) -> CompetitorSite {
        CompetitorSite {
            url: url.to_string(),
            pages_crawled: 1,
            keywords: set(words),
        }
    }

    #[test]
    fn test_keyword_set_algebra() {
        let analysis = compare(
            set(&["alpha", "bravo", "charlie"]),
            vec![site("https://rival.test", &["bravo", "charlie", "delta"])],
            BASE_GAP_LIMIT,
        );
        assert_eq!(analysis.keyword_gaps, set(&["delta"]));
        assert_eq!(analysis.shared_keywords, set(&["bravo", "charlie"]));
        assert_eq!(analysis.competitor_keywords, set(&["bravo", "charlie", "delta"]));
        assert_eq!(analysis.competitor_urls, vec!["https://rival.test"]);
    }

    #[test]
    fn test_hyphen_variants_count_as_shared() {
        let analysis = compare(
            set(&["e-commerce", "shipping"]),
            vec![site("https://rival.test", &["ecommerce", "returns"])],
            BASE_GAP_LIMIT,
        );
        assert_eq!(analysis.shared_keywords, set(&["e-commerce"]));
        assert_eq!(analysis.keyword_gaps, set(&["returns"]));
    }

    #[test]
    fn test_gap_limit_keeps_set_algebra_exact() {
        let analysis = compare(
            set(&["alpha"]),
            vec![
                site("https://one.test", &["alpha", "golf", "hotel", "india"]),
                site("https://two.test", &["hotel", "india", "juliet"]),
            ],
            2,
        );
        assert_eq!(analysis.keyword_gaps, set(&["hotel", "india"]));
        let difference: BTreeSet<String> = analysis
            .competitor_keywords
            .difference(&analysis.own_keywords)
            .cloned()
            .collect();
        assert_eq!(difference, analysis.keyword_gaps);
        let intersection: BTreeSet<String> = analysis
            .competitor_keywords
            .intersection(&analysis.own_keywords)
            .cloned()
            .collect();
        assert_eq!(intersection, analysis.shared_keywords);
    }

    #[test]
    fn test_garbage_is_cleaned_before_comparison() {
        let analysis = compare(
            set(&["alpha", "ab"]),
            vec![site("https://rival.test", &["x-y-z", "2024", "delta"])],
            BASE_GAP_LIMIT,
        );
        assert_eq!(analysis.own_keywords, set(&["alpha"]));
        assert_eq!(analysis.keyword_gaps, set(&["delta"]));
    }

    #[test]
    fn test_caps_from_add_ons() {
        let add_ons = AddOns {
            additional_competitors: 2,
            additional_keywords: 10,
            ..Default::default()
        };
        assert_eq!(competitor_cap(&add_ons), 5);
        assert_eq!(gap_limit(&add_ons), 35);
        assert_eq!(competitor_cap(&AddOns::default()), 3);
    }
}
