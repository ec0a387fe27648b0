//! Errors that end a crawl.
//!
//! Body-fetch failures and events for unknown requests are recovered inside
//! the network layer and never show up here.

/// A fatal crawl error, reported once at the caller's boundary.
#[derive(thiserror::Error, Debug)]
pub enum ScoutError {
    #[error("invalid options: {0}")]
    Configuration(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0}ms")]
    Timeout(u64),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoutError {
    /// Wrap a collaborator error, keeping its whole cause chain on one line.
    pub(crate) fn navigation(e: anyhow::Error) -> Self {
        Self::Navigation(format!("{e:#}"))
    }

    pub(crate) fn evaluation(e: anyhow::Error) -> Self {
        Self::Evaluation(format!("{e:#}"))
    }

    pub(crate) fn browser(e: anyhow::Error) -> Self {
        Self::BrowserUnavailable(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
