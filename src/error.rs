use thiserror::Error;

/// Fatal failures of an audit run. Everything else degrades into a partial result.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid URL scheme '{0}': only http and https are supported")]
    UnsupportedScheme(String),

    #[error("No pages could be fetched from {url} ({failed} attempted)")]
    NoPagesFetched { url: String, failed: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Renderer unavailable: {0}")]
    Renderer(String),
}

/// Per-page fetch failures. These are recorded as failure markers and never stop a crawl.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(0)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failures of the optional add-on analyzers. Logged and dropped from the result.
#[derive(Error, Debug)]
pub enum AddOnError {
    #[error("performance API request failed: {0}")]
    PerformanceApi(#[from] reqwest::Error),

    #[error("performance API returned HTTP {status}: {body}")]
    PerformanceStatus { status: u16, body: String },

    #[error("performance API response missing field: {0}")]
    MissingField(&'static str),

    #[error("competitor crawl failed for {url}: {reason}")]
    Competitor { url: String, reason: String },

    #[error("add-on task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AuditError>;
