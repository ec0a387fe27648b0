//! Endpoint aggregation: network log + script scan → one discovery report.

use crate::network::classifier::is_api_like;
use crate::network::record::NetworkRequestRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Characters of a captured body kept in the report.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// An API-like request seen on the wire, reduced for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkApi {
    pub url: String,
    pub method: String,
    pub status: Option<i64>,
    pub mime_type: Option<String>,
    pub has_body: bool,
    pub body_preview: Option<String>,
    pub post_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySummary {
    pub api_calls_found: usize,
    pub endpoints_in_js: usize,
    pub js_files_loaded: usize,
}

/// Snapshot of everything discovered for one navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDiscoveryReport {
    pub network_apis: Vec<NetworkApi>,
    pub js_endpoints: Vec<String>,
    pub js_files: Vec<String>,
    pub summary: DiscoverySummary,
}

impl NetworkApi {
    fn from_record(record: &NetworkRequestRecord) -> Self {
        let body = record.response_body.as_deref().filter(|b| !b.is_empty());
        Self {
            url: record.url.clone(),
            method: record.method.clone(),
            status: record.status,
            mime_type: record.mime_type.clone(),
            has_body: body.is_some(),
            body_preview: body.map(preview),
            post_data: record.post_data.clone(),
        }
    }
}

/// First [`BODY_PREVIEW_CHARS`] characters (not bytes) of a body.
pub fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Compose the report. The summary is computed from the collections, so
/// it always matches their lengths.
pub fn build_report(
    log: &[NetworkRequestRecord],
    js_endpoints: BTreeSet<String>,
) -> ApiDiscoveryReport {
    let network_apis: Vec<NetworkApi> = log
        .iter()
        .filter(|record| is_api_like(record))
        .map(NetworkApi::from_record)
        .collect();

    let js_files: Vec<String> = log
        .iter()
        .filter(|record| record.is_script() && !record.url.is_empty())
        .map(|record| record.url.clone())
        .collect();

    let js_endpoints: Vec<String> = js_endpoints.into_iter().collect();

    let summary = DiscoverySummary {
        api_calls_found: network_apis.len(),
        endpoints_in_js: js_endpoints.len(),
        js_files_loaded: js_files.len(),
    };

    ApiDiscoveryReport {
        network_apis,
        js_endpoints,
        js_files,
        summary,
    }
}
