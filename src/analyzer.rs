use crate::models::{ImageAltRecommendation, LlmReadability, OpenGraphTags, PageRecord};
use crate::url_normalizer::is_same_origin;
use crate::{readability, schema};
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

// Cached selectors to avoid repeated parsing
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector should be valid"));
static META_DESC_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='description']").expect("meta description selector should be valid")
});
static VIEWPORT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='viewport']").expect("viewport selector should be valid")
});
static CANONICAL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("link[rel='canonical']").expect("canonical selector should be valid")
});
static OG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property^='og:']").expect("open graph selector should be valid")
});
static HTML_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("html").expect("html selector should be valid"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector should be valid"));
static HEADING_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6").expect("heading selector should be valid")
});
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("img selector should be valid"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("a[href] selector should be valid"));
static FORM_CONTROL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("input, select, textarea").expect("form control selector should be valid")
});
static LABEL_FOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("label[for]").expect("label selector should be valid"));

/// Elements whose text never counts as visible content.
const NON_VISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Input types that need no label.
const UNLABELED_INPUT_TYPES: &[&str] = &["hidden", "submit", "button", "reset", "image"];

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzerOptions {
    pub alt_text_recommendations: bool,
}

/// Raw material for one page analysis.
#[derive(Debug, Clone)]
pub struct PageInput<'a> {
    pub url: &'a str,
    pub final_url: &'a Url,
    pub status_code: u16,
    pub depth: usize,
    pub initial_html: &'a str,
    pub rendered_html: &'a str,
    pub response_time_ms: u64,
}

/// A PageRecord plus what the crawler and keyword extraction need from the same parse.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub record: PageRecord,
    pub links: Vec<Url>,
    pub visible_text: String,
}

pub struct PageAnalyzer {
    options: AnalyzerOptions,
}

impl Default for PageAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerOptions::default())
    }
}

/// Analyzes one page with default options.
pub fn analyze(url: &Url, initial_html: &str, rendered_html: &str, status_code: u16) -> PageRecord {
    PageAnalyzer::default()
        .analyze_page(&PageInput {
            url: url.as_str(),
            final_url: url,
            status_code,
            depth: 0,
            initial_html,
            rendered_html,
            response_time_ms: 0,
        })
        .record
}

impl PageAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    /// Extracts metadata, structure, schema, readability and accessibility signals.
    /// Everything is read from the rendered DOM so client-rendered sites are covered.
    pub fn analyze_page(&self, input: &PageInput<'_>) -> PageAnalysis {
        let document = Html::parse_document(input.rendered_html);
        let base = input.final_url;

        let entities = schema::extract_entities(&document);
        let has_identity_schema = schema::has_identity_schema(&entities);
        let (h1_count, h2_count, skipped_heading_levels) = Self::heading_stats(&document);
        let (image_count, images_without_alt, image_alt_recommendations) =
            self.image_stats(&document, base);
        let links = Self::extract_links(&document, base);
        let internal_link_count = links.iter().filter(|link| is_same_origin(link, base)).count();
        let visible_text = Self::visible_text(&document);
        let word_count = Self::count_words(&visible_text);

        let final_url = crate::url_normalizer::normalize_url(base);
        let final_url = (final_url != input.url).then_some(final_url);

        let record = PageRecord {
            url: input.url.to_string(),
            final_url,
            status_code: input.status_code,
            depth: input.depth,
            title: Self::extract_title(&document),
            meta_description: Self::extract_meta_description(&document),
            canonical_url: Self::extract_canonical(&document, base),
            lang: Self::extract_lang(&document),
            has_viewport: document.select(&VIEWPORT_SELECTOR).next().is_some(),
            open_graph: Self::extract_open_graph(&document),
            h1_count,
            h2_count,
            skipped_heading_levels,
            word_count,
            image_count,
            images_without_alt,
            image_alt_recommendations,
            empty_link_count: Self::count_empty_links(&document),
            unlabeled_input_count: Self::count_unlabeled_controls(&document),
            internal_link_count,
            has_schema_markup: !entities.is_empty(),
            has_identity_schema,
            schema_entities: entities,
            initial_html_length: input.initial_html.len(),
            rendered_html_length: input.rendered_html.len(),
            llm_readability: Self::readability(input.initial_html, input.rendered_html),
            response_time_ms: input.response_time_ms,
            performance_metrics: None,
        };

        PageAnalysis {
            record,
            links,
            visible_text,
        }
    }

    fn readability(initial_html: &str, rendered_html: &str) -> LlmReadability {
        readability::compute(initial_html.len(), rendered_html.len())
    }

    fn non_empty(text: String) -> Option<String> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn extract_title(document: &Html) -> Option<String> {
        document
            .select(&TITLE_SELECTOR)
            .next()
            .and_then(|el| Self::non_empty(el.text().collect::<String>()))
    }

    fn extract_meta_description(document: &Html) -> Option<String> {
        document
            .select(&META_DESC_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("content"))
            .and_then(|s| Self::non_empty(s.to_string()))
    }

    fn extract_canonical(document: &Html, base: &Url) -> Option<String> {
        document
            .select(&CANONICAL_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| base.join(href.trim()).ok())
            .map(|url| url.to_string())
    }

    fn extract_lang(document: &Html) -> Option<String> {
        document
            .select(&HTML_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .and_then(|lang| Self::non_empty(lang.to_string()))
    }

    fn extract_open_graph(document: &Html) -> OpenGraphTags {
        let mut tags = OpenGraphTags::default();
        for element in document.select(&OG_SELECTOR) {
            let (Some(property), Some(content)) =
                (element.value().attr("property"), element.value().attr("content"))
            else {
                continue;
            };
            let content = Self::non_empty(content.to_string());
            match property {
                "og:title" => tags.og_title = content,
                "og:description" => tags.og_description = content,
                "og:image" => tags.og_image = content,
                "og:url" => tags.og_url = content,
                "og:type" => tags.og_type = content,
                _ => {}
            }
        }
        tags
    }

    /// (h1 count, h2 count, number of skipped heading levels in document order)
    fn heading_stats(document: &Html) -> (usize, usize, usize) {
        let mut h1 = 0;
        let mut h2 = 0;
        let mut skipped = 0;
        let mut previous: Option<u8> = None;

        for heading in document.select(&HEADING_SELECTOR) {
            let level = heading.value().name().as_bytes()[1] - b'0';
            match level {
                1 => h1 += 1,
                2 => h2 += 1,
                _ => {}
            }
            if let Some(prev) = previous
                && level > prev + 1
            {
                skipped += 1;
            }
            previous = Some(level);
        }

        (h1, h2, skipped)
    }

    fn image_stats(
        &self,
        document: &Html,
        base: &Url,
    ) -> (usize, usize, Vec<ImageAltRecommendation>) {
        let mut count = 0;
        let mut missing = 0;
        let mut recommendations = Vec::new();

        for element in document.select(&IMG_SELECTOR) {
            count += 1;
            // alt="" is a valid marker for decorative images
            if element.value().attr("alt").is_some() {
                continue;
            }
            missing += 1;

            if self.options.alt_text_recommendations {
                let src = element
                    .value()
                    .attr("src")
                    .or_else(|| element.value().attr("data-src"))
                    .unwrap_or("");
                let absolute = base
                    .join(src)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| src.to_string());
                recommendations.push(ImageAltRecommendation {
                    recommendation: alt_text_recommendation(&absolute),
                    src: absolute,
                });
            }
        }

        (count, missing, recommendations)
    }

    fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
        document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .collect()
    }

    fn has_accessible_name(anchor: ElementRef<'_>) -> bool {
        let attr_present = |name: &str| {
            anchor
                .value()
                .attr(name)
                .is_some_and(|value| !value.trim().is_empty())
        };
        if attr_present("aria-label") || attr_present("aria-labelledby") || attr_present("title")
        {
            return true;
        }
        if anchor.text().any(|t| !t.trim().is_empty()) {
            return true;
        }
        anchor
            .select(&IMG_SELECTOR)
            .any(|img| img.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()))
    }

    fn count_empty_links(document: &Html) -> usize {
        document
            .select(&ANCHOR_SELECTOR)
            .filter(|anchor| !Self::has_accessible_name(*anchor))
            .count()
    }

    fn count_unlabeled_controls(document: &Html) -> usize {
        let labelled_ids: HashSet<&str> = document
            .select(&LABEL_FOR_SELECTOR)
            .filter_map(|label| label.value().attr("for"))
            .collect();

        document
            .select(&FORM_CONTROL_SELECTOR)
            .filter(|control| {
                let el = control.value();
                if el.name() == "input"
                    && el
                        .attr("type")
                        .is_some_and(|t| UNLABELED_INPUT_TYPES.contains(&t.to_lowercase().as_str()))
                {
                    return false;
                }
                let has_attr_label = ["aria-label", "aria-labelledby", "title"]
                    .iter()
                    .any(|attr| el.attr(attr).is_some_and(|v| !v.trim().is_empty()));
                let has_for_label = el.id().is_some_and(|id| labelled_ids.contains(id));
                let wrapped_in_label = control.ancestors().any(|node| {
                    node.value()
                        .as_element()
                        .is_some_and(|ancestor| ancestor.name() == "label")
                });
                !(has_attr_label || has_for_label || wrapped_in_label)
            })
            .count()
    }

    /// Visible text of the body, excluding script, style and similar elements.
    pub fn visible_text(document: &Html) -> String {
        let mut text = String::new();
        match document.select(&BODY_SELECTOR).next() {
            Some(body) => collect_visible_text(body, &mut text),
            None => collect_visible_text(document.root_element(), &mut text),
        }
        text
    }

    fn count_words(text: &str) -> usize {
        text.split_whitespace()
            .filter(|word| word.chars().any(char::is_alphanumeric))
            .count()
    }
}

fn collect_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if !NON_VISIBLE_ELEMENTS.contains(&el.name()) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_visible_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

/// Suggests alt text from the image file name.
fn alt_text_recommendation(src: &str) -> String {
    let stem = Url::parse(src)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| src.rsplit('/').next().unwrap_or("").to_string());
    let stem = stem.split('.').next().unwrap_or("");
    let words: Vec<String> = stem
        .split(|c: char| c == '-' || c == '_' || c == ' ' || c == '+')
        .filter(|w| !w.is_empty() && w.chars().any(char::is_alphabetic))
        .filter(|w| !(w.len() > 12 && w.chars().all(|c| c.is_ascii_hexdigit())))
        .map(str::to_lowercase)
        .collect();

    if words.is_empty() {
        "Add alt text describing what this image shows and why it is on the page.".to_string()
    } else {
        format!(
            "Add alt text describing the image, for example \"{}\"; avoid repeating the file name verbatim.",
            words.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>  Rust Crawling Guide  </title>
  <meta name="description" content="Learn to crawl">
  <meta name="viewport" content="width=device-width">
  <link rel="canonical" href="/guide">
  <meta property="og:title" content="Guide">
  <style>.x { color: red }</style>
</head>
<body>
  <h1>Crawling</h1>
  <h2>Basics</h2>
  <h4>Skipped</h4>
  <p>Crawlers fetch pages and follow links.</p>
  <script>var hidden = "not counted words here";</script>
  <img src="/img/team-photo.jpg">
  <img src="/img/logo.png" alt="Logo">
  <img src="/img/spacer.gif" alt="">
  <a href="/about">About us</a>
  <a href="https://other.test/x"><img src="/i.png" alt="Partner"></a>
  <a href="/empty"></a>
  <form>
    <label for="email">Email</label><input id="email" type="email">
    <label>Name <input type="text"></label>
    <input type="text" name="unlabeled">
    <input type="hidden" name="token">
    <textarea aria-label="Message"></textarea>
  </form>
</body>
</html>"#;

    fn analyze_fixture(options: AnalyzerOptions) -> PageAnalysis {
        let url = Url::parse("https://example.com/guide").unwrap();
        PageAnalyzer::new(options).analyze_page(&PageInput {
            url: "https://example.com/guide",
            final_url: &url,
            status_code: 200,
            depth: 1,
            initial_html: PAGE,
            rendered_html: PAGE,
            response_time_ms: 120,
        })
    }

    #[test]
    fn test_metadata_extraction() {
        let record = analyze_fixture(AnalyzerOptions::default()).record;
        assert_eq!(record.title.as_deref(), Some("Rust Crawling Guide"));
        assert_eq!(record.meta_description.as_deref(), Some("Learn to crawl"));
        assert_eq!(
            record.canonical_url.as_deref(),
            Some("https://example.com/guide")
        );
        assert_eq!(record.lang.as_deref(), Some("en"));
        assert!(record.has_viewport);
        assert_eq!(record.open_graph.og_title.as_deref(), Some("Guide"));
        assert!(record.open_graph.og_image.is_none());
        assert_eq!(record.final_url, None);
    }

    #[test]
    fn test_structure_and_accessibility() {
        let record = analyze_fixture(AnalyzerOptions::default()).record;
        assert_eq!(record.h1_count, 1);
        assert_eq!(record.h2_count, 1);
        assert_eq!(record.skipped_heading_levels, 1);
        assert_eq!(record.image_count, 4);
        assert_eq!(record.images_without_alt, 1);
        assert_eq!(record.empty_link_count, 1);
        assert_eq!(record.unlabeled_input_count, 1);
        assert_eq!(record.internal_link_count, 2);
        assert!(record.image_alt_recommendations.is_empty());
    }

    #[test]
    fn test_word_count_excludes_script_and_style() {
        let analysis = analyze_fixture(AnalyzerOptions::default());
        assert!(!analysis.visible_text.contains("hidden"));
        assert!(!analysis.visible_text.contains("color"));
        assert!(!analysis.visible_text.contains("Rust Crawling Guide"));
        // Crawling, Basics, Skipped, 6 paragraph words, About us, Email, Name
        assert_eq!(analysis.record.word_count, 13);
    }

    #[test]
    fn test_alt_text_recommendations_when_enabled() {
        let record = analyze_fixture(AnalyzerOptions {
            alt_text_recommendations: true,
        })
        .record;
        assert_eq!(record.image_alt_recommendations.len(), 1);
        let first = &record.image_alt_recommendations[0];
        assert_eq!(first.src, "https://example.com/img/team-photo.jpg");
        assert!(first.recommendation.contains("\"team photo\""));
    }

    #[test]
    fn test_readability_uses_both_documents() {
        let url = Url::parse("https://example.com/").unwrap();
        let initial = "x".repeat(1000);
        let rendered = "x".repeat(2600);
        let record = analyze(&url, &initial, &rendered, 200);
        assert_eq!(record.initial_html_length, 1000);
        assert_eq!(record.rendered_html_length, 2600);
        assert_eq!(record.llm_readability.rendering_percentage, 160.0);
        assert_eq!(record.llm_readability.similarity, 38.46);
    }

    #[test]
    fn test_title_comes_from_rendered_dom() {
        let url = Url::parse("https://example.com/").unwrap();
        let initial = "<html><head></head><body><div id=app></div></body></html>";
        let rendered = "<html><head><title>Hydrated</title></head><body><div id=app><h1>Hi</h1></div></body></html>";
        let record = analyze(&url, initial, rendered, 200);
        assert_eq!(record.title.as_deref(), Some("Hydrated"));
        assert_eq!(record.h1_count, 1);
    }

    #[test]
    fn test_redirected_final_url_recorded() {
        let final_url = Url::parse("https://example.com/new-home").unwrap();
        let record = PageAnalyzer::default()
            .analyze_page(&PageInput {
                url: "https://example.com/",
                final_url: &final_url,
                status_code: 200,
                depth: 0,
                initial_html: "<html></html>",
                rendered_html: "<html></html>",
                response_time_ms: 0,
            })
            .record;
        assert_eq!(
            record.final_url.as_deref(),
            Some("https://example.com/new-home")
        );
    }
}
