//! Keyword extraction: tokenization, stopword removal, cleaning and frequency thresholding.

use std::collections::{BTreeSet, HashMap, HashSet};

pub const MIN_KEYWORD_LEN: usize = 3;
pub const DEFAULT_MIN_FREQUENCY: usize = 2;
pub const DEFAULT_MAX_KEYWORDS: usize = 60;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "cannot", "could", "did", "didn't", "do", "does", "doesn't",
    "doing", "don't", "down", "during", "each", "even", "ever", "every", "few", "for", "from",
    "further", "get", "gets", "got", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "if", "in", "into", "is", "isn't",
    "it", "it's", "its", "itself", "just", "let", "like", "made", "make", "many", "may", "me",
    "might", "more", "most", "much", "must", "my", "myself", "need", "new", "no", "nor", "not",
    "now", "of", "off", "on", "once", "one", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "per", "same", "see", "she", "should", "so", "some", "such", "than",
    "that", "that's", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "upon", "us", "use",
    "used", "using", "very", "via", "was", "wasn't", "we", "well", "were", "weren't", "what",
    "when", "where", "whether", "which", "while", "who", "whom", "why", "will", "with", "within",
    "without", "won't", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Navigation and legal boilerplate present on nearly every site.
const BOILERPLATE: &[&str] = &[
    "click", "menu", "skip", "toggle", "navigation", "copyright", "reserved", "rights", "cookie",
    "cookies", "privacy", "policy", "terms", "login", "logout", "signup", "subscribe", "read",
    "learn", "home", "page", "next", "previous", "back", "top",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token) || BOILERPLATE.contains(&token)
}

/// Splits text into lowercase candidate tokens. Hyphens and apostrophes stay inside tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|raw| raw.trim_matches(|c| c == '-' || c == '\'').to_lowercase())
        .filter(|token| !token.is_empty())
}

/// Returns the cleaned keyword, or `None` when the token is not a usable keyword.
pub fn clean_token(token: &str) -> Option<String> {
    let token = token
        .trim()
        .trim_matches(|c| c == '-' || c == '\'')
        .to_lowercase();

    if token.chars().count() < MIN_KEYWORD_LEN {
        return None;
    }
    if !token.chars().any(char::is_alphabetic) {
        return None;
    }
    // "e-m-a-i-l" and similar artifacts of hyphen splitting.
    if token.contains('-') && token.split('-').all(|part| part.chars().count() <= 1) {
        return None;
    }
    if token.contains("--") {
        return None;
    }
    if is_stopword(&token) {
        return None;
    }
    Some(token)
}

/// A token already in the keyword sets that fails cleaning or is not in normal form.
pub fn is_garbage_keyword(token: &str) -> bool {
    clean_token(token).as_deref() != Some(token)
}

/// Key under which near-duplicate spellings collapse ("E-mail", "email").
pub fn dedup_key(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-' && *c != '\'')
        .collect()
}

/// Cleans a keyword collection and removes near-duplicates, keeping the first spelling seen.
pub fn clean_keywords<I, S>(tokens: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = BTreeSet::new();
    for token in tokens {
        if let Some(keyword) = clean_token(token.as_ref())
            && seen.insert(dedup_key(&keyword))
        {
            cleaned.insert(keyword);
        }
    }
    cleaned
}

/// Term frequencies over all pages of one site.
#[derive(Debug, Default, Clone)]
pub struct KeywordCounter {
    counts: HashMap<String, usize>,
    /// First spelling seen for each dedup key.
    forms: HashMap<String, String>,
}

impl KeywordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str) {
        for token in tokenize(text) {
            if let Some(keyword) = clean_token(&token) {
                let key = dedup_key(&keyword);
                *self.counts.entry(key.clone()).or_default() += 1;
                self.forms.entry(key).or_insert(keyword);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Most frequent keywords seen at least `min_frequency` times. Small sites where
    /// nothing repeats fall back to single occurrences.
    pub fn top_keywords(&self, min_frequency: usize, limit: usize) -> BTreeSet<String> {
        let mut ranked: Vec<(&String, &usize)> = self
            .counts
            .iter()
            .filter(|(_, count)| **count >= min_frequency)
            .collect();
        if ranked.is_empty() && min_frequency > 1 {
            return self.top_keywords(1, limit);
        }
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        clean_keywords(
            ranked
                .into_iter()
                .take(limit)
                .map(|(key, _)| self.forms.get(key).unwrap_or(key).as_str()),
        )
    }
}

/// Extracts the keyword set of a site from its pages' visible text.
pub fn site_keywords<'a, I>(texts: I, limit: usize) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counter = KeywordCounter::new();
    for text in texts {
        counter.add_text(text);
    }
    counter.top_keywords(DEFAULT_MIN_FREQUENCY, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_hyphenated_words() {
        let tokens: Vec<_> = tokenize("Rust-based, (fast) CRAWLER's!").collect();
        assert_eq!(tokens, vec!["rust-based", "fast", "crawler's"]);
    }

    #[test]
    fn test_clean_token_rules() {
        assert_eq!(clean_token("Crawler"), Some("crawler".to_string()));
        assert_eq!(clean_token("ab"), None);
        assert_eq!(clean_token("the"), None);
        assert_eq!(clean_token("2024"), None);
        assert_eq!(clean_token("e-m-a-i-l"), None);
        assert_eq!(clean_token("a-b"), None);
        assert_eq!(clean_token("-seo-"), Some("seo".to_string()));
        assert_eq!(clean_token("e-commerce"), Some("e-commerce".to_string()));
    }

    #[test]
    fn test_garbage_detection() {
        assert!(is_garbage_keyword("x"));
        assert!(is_garbage_keyword("Upper"));
        assert!(is_garbage_keyword("s-e-o"));
        assert!(!is_garbage_keyword("analytics"));
    }

    #[test]
    fn test_clean_keywords_dedups_case_and_hyphen_variants() {
        let cleaned = clean_keywords(["E-mail", "email", "EMAIL", "marketing", "of"]);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.contains("e-mail"));
        assert!(cleaned.contains("marketing"));
    }

    #[test]
    fn test_frequency_threshold() {
        let keywords = site_keywords(
            [
                "rust crawler audit rust crawler",
                "rust audit accessibility once",
            ],
            10,
        );
        assert!(keywords.contains("rust"));
        assert!(keywords.contains("crawler"));
        assert!(keywords.contains("audit"));
        assert!(!keywords.contains("once"));
        assert!(!keywords.contains("accessibility"));
    }

    #[test]
    fn test_small_site_falls_back_to_single_occurrences() {
        let keywords = site_keywords(["unique words everywhere"], 10);
        assert_eq!(keywords.len(), 3);
    }

    #[test]
    fn test_limit_applies() {
        let keywords = site_keywords(["alpha alpha beta beta gamma gamma delta delta"], 2);
        assert_eq!(keywords.len(), 2);
        assert!(keywords.contains("alpha"));
        assert!(keywords.contains("beta"));
    }
}
