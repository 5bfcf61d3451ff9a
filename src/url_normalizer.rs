//! Canonical URL forms used as the crawl dedup key.

use url::Url;

/// File extensions that never lead to an HTML document.
const NON_DOCUMENT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "avif", "bmp", "pdf", "zip", "gz", "tar",
    "rar", "7z", "mp3", "mp4", "webm", "avi", "mov", "wav", "ogg", "css", "js", "json", "xml",
    "txt", "woff", "woff2", "ttf", "eot", "exe", "dmg", "doc", "docx", "xls", "xlsx", "ppt",
    "pptx", "csv",
];

/// Parses and canonicalizes a URL string.
pub fn normalize(input: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(input.trim())?;
    Ok(normalize_url(&url))
}

/// Canonical form: no fragment, lowercase host, default port dropped,
/// no trailing slash except on the root path.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            // Only fails for cannot-be-a-base URLs, which have no host anyway.
            let _ = url.set_host(Some(&lowered));
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        url.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    url.to_string()
}

fn host_key(url: &Url) -> Option<String> {
    url.host_str()
        .map(|host| host.to_lowercase().trim_start_matches("www.").to_string())
}

/// Same site for crawling purposes: host (ignoring `www.`) and port must match.
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    host_key(a) == host_key(b) && a.port_or_known_default() == b.port_or_known_default()
}

/// Origins that belong to the audited site.
///
/// Links are rewritten onto the canonical origin before normalization, so
/// `http://`, `https://` and `www.` spellings of one page share a dedup key.
#[derive(Debug, Clone)]
pub struct SiteScope {
    canonical: Url,
    known: Vec<Url>,
}

impl SiteScope {
    pub fn new(start: &Url) -> Self {
        Self {
            canonical: start.clone(),
            known: vec![start.clone()],
        }
    }

    /// Makes the origin a redirect landed on canonical. Earlier origins stay in scope.
    pub fn adopt(&mut self, final_url: &Url) {
        if same_exact_origin(&self.canonical, final_url) {
            return;
        }
        if !self.known.iter().any(|known| same_exact_origin(known, final_url)) {
            self.known.push(final_url.clone());
        }
        self.canonical = final_url.clone();
    }

    pub fn canonical(&self) -> &Url {
        &self.canonical
    }

    pub fn contains(&self, link: &Url) -> bool {
        self.known.iter().any(|known| is_same_origin(link, known))
    }

    /// The link on the canonical origin, or `None` when it is off-site.
    pub fn canonicalize(&self, link: &Url) -> Option<Url> {
        if !self.contains(link) {
            return None;
        }
        if same_exact_origin(link, &self.canonical) {
            return Some(link.clone());
        }
        let mut rewritten = link.clone();
        rewritten.set_scheme(self.canonical.scheme()).ok()?;
        rewritten.set_host(self.canonical.host_str()).ok()?;
        rewritten.set_port(self.canonical.port()).ok()?;
        Some(rewritten)
    }
}

fn same_exact_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_lowercase) == b.host_str().map(str::to_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Whether a link can point at a crawlable HTML document.
pub fn is_crawlable_link(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => !NON_DOCUMENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => true,
    }
}
