//! Standalone scan of one JavaScript bundle fetched over HTTP.
//!
//! No browser is involved: the bundle is downloaded as text and run through
//! the bundle pattern list, which adds object-key and `.json` families to
//! the page patterns and drops static asset paths.

use super::scanner::scan_bundle;
use crate::config::validate_target;
use crate::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("scout/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 5;

/// What one bundle scan found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleScan {
    pub url: String,
    /// Length of the downloaded text in bytes.
    pub size_bytes: usize,
    /// Endpoint literals, sorted and deduplicated.
    pub endpoints: Vec<String>,
}

fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ScoutError::Fetch(format!("failed to build HTTP client: {e}")))
}

/// Download `url` and scan its text for endpoint literals.
pub async fn fetch_and_scan(url: &str, timeout: Duration) -> Result<BundleScan> {
    let target = validate_target(url)?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(ScoutError::Configuration(format!(
            "bundle URL must be http or https, got {:?}",
            target.scheme()
        )));
    }

    let response = client(timeout)?
        .get(target.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ScoutError::Fetch(format!("{target}: {e}")))?;
    let text = response
        .text()
        .await
        .map_err(|e| ScoutError::Fetch(format!("{target}: failed to read body: {e}")))?;

    let outcome = scan_bundle(&text);
    tracing::debug!(
        url = %target,
        bytes = text.len(),
        endpoints = outcome.endpoints.len(),
        "scanned bundle"
    );

    Ok(BundleScan {
        url: target.to_string(),
        size_bytes: text.len(),
        endpoints: outcome.endpoints.into_iter().collect(),
    })
}
