//! Crawl options: parsing, defaults, and validation.
//!
//! Options arrive as one JSON object with camelCase keys. Every key is
//! optional; unknown keys are ignored. Anything malformed is rejected here,
//! before a browser is launched.

use crate::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BODY_CAPTURE_GRACE_MS: u64 = 5_000;

/// Requests allowed in flight for the page to count as idle, and for how long.
pub const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// When navigation counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitUntil {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    #[default]
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

impl WaitUntil {
    /// In-flight request ceiling for the network-idle conditions.
    pub fn idle_threshold(self) -> Option<usize> {
        match self {
            WaitUntil::NetworkIdle0 => Some(0),
            WaitUntil::NetworkIdle2 => Some(2),
            WaitUntil::Load | WaitUntil::DomContentLoaded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Everything a caller can ask of one crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlOptions {
    pub wait_for: WaitUntil,
    /// Navigation timeout in milliseconds.
    pub timeout: u64,
    /// Write a full-page PNG here.
    pub screenshot: Option<String>,
    pub extract_links: bool,
    pub extract_text: bool,
    pub extract_network_requests: bool,
    pub capture_response_bodies: bool,
    pub discover_apis: bool,
    pub wait_for_selector: Option<String>,
    /// Expression evaluated in the page after load.
    pub javascript: Option<String>,
    pub scroll: bool,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub viewport: Viewport,
    /// How long to wait for in-flight body fetches before reporting.
    pub body_capture_grace_ms: u64,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            wait_for: WaitUntil::default(),
            timeout: DEFAULT_TIMEOUT_MS,
            screenshot: None,
            extract_links: false,
            extract_text: false,
            extract_network_requests: false,
            capture_response_bodies: false,
            discover_apis: false,
            wait_for_selector: None,
            javascript: None,
            scroll: false,
            headers: BTreeMap::new(),
            viewport: Viewport::default(),
            body_capture_grace_ms: DEFAULT_BODY_CAPTURE_GRACE_MS,
        }
    }
}

impl CrawlOptions {
    /// Parse and validate an options object. `None` or blank input yields defaults.
    pub fn from_json(input: Option<&str>) -> Result<Self> {
        let options = match input.map(str::trim) {
            None | Some("") => Self::default(),
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| ScoutError::Configuration(e.to_string()))?;
                if !value.is_object() {
                    return Err(ScoutError::Configuration(
                        "options must be a JSON object".to_string(),
                    ));
                }
                serde_json::from_value::<Self>(value)
                    .map_err(|e| ScoutError::Configuration(e.to_string()))?
            }
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            return Err(ScoutError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScoutError::Configuration(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if let Some(selector) = &self.wait_for_selector {
            if selector.trim().is_empty() {
                return Err(ScoutError::Configuration(
                    "waitForSelector must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether the network log is needed at all.
    pub fn observes_network(&self) -> bool {
        self.extract_network_requests
            || self.capture_response_bodies
            || self.discover_apis
            || self.wait_for.idle_threshold().is_some()
    }

    /// Whether the finalized log goes into the result.
    pub fn reports_network_requests(&self) -> bool {
        self.extract_network_requests || self.capture_response_bodies
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn body_capture_grace(&self) -> Duration {
        Duration::from_millis(self.body_capture_grace_ms)
    }
}

/// Check the crawl target before anything starts.
pub fn validate_target(url: &str) -> Result<url::Url> {
    url::Url::parse(url.trim())
        .map_err(|e| ScoutError::Configuration(format!("invalid URL {url:?}: {e}")))
}
