//! Decides whether a request looks like a programmatic API call.
//!
//! Pure and total: the same `(resource_type, mime_type, url)` always gives the
//! same answer, and nothing here touches a browser.

use super::record::NetworkRequestRecord;
use regex::Regex;
use std::sync::OnceLock;

/// Resource categories that are always static assets.
const STATIC_ASSET_TYPES: &[&str] = &["image", "font", "stylesheet", "media"];

/// MIME substrings that mark a structured-data response.
const API_MIME_MARKERS: &[&str] = &["json", "xml", "graphql"];

fn api_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/(api|graphql|rest|v[0-9]+|data|ajax|rpc|_next/data)\b")
            .expect("api path regex is valid")
    })
}

fn data_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(json|xml)(\?|$)").expect("data file regex is valid"))
}

/// Classify a finalized or in-progress record.
pub fn is_api_like(record: &NetworkRequestRecord) -> bool {
    classify(
        &record.resource_type,
        record.mime_type.as_deref(),
        &record.url,
    )
}

/// The decision table itself; first matching rule wins.
pub fn classify(resource_type: &str, mime_type: Option<&str>, url: &str) -> bool {
    if STATIC_ASSET_TYPES.contains(&resource_type) {
        return false;
    }

    let mime = mime_type.unwrap_or("").to_lowercase();
    if API_MIME_MARKERS.iter().any(|marker| mime.contains(marker)) {
        return true;
    }

    if api_path_regex().is_match(url) || data_file_regex().is_match(url) {
        return true;
    }

    matches!(resource_type, "xhr" | "fetch")
}
