//! Per-request records built from network lifecycle events.

use super::event::{HeaderMap, RequestSent, ResponseInfo};
use serde::{Deserialize, Serialize};

/// Peer address the response was served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddress {
    pub ip: Option<String>,
    pub port: Option<i64>,
}

/// One observed request, from "request sent" to its terminal event.
///
/// `status`, `response_headers`, `mime_type` and `remote_address` are only
/// populated by a response event; `response_body` only by body capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequestRecord {
    pub request_id: String,
    pub url: String,
    pub method: String,
    /// Lowercase resource category (`document`, `xhr`, `fetch`, `script`, ...).
    pub resource_type: String,
    pub request_headers: HeaderMap,
    pub post_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<RemoteAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl NetworkRequestRecord {
    /// Start a record from a "request sent" event.
    pub fn from_request(event: &RequestSent) -> Self {
        Self {
            request_id: event.request_id.clone(),
            url: event.url.clone(),
            method: event.method.clone(),
            resource_type: normalize_resource_type(event.resource_type.as_deref()),
            request_headers: event.headers.clone(),
            post_data: event.post_data.clone().filter(|p| !p.is_empty()),
            status: None,
            response_headers: None,
            mime_type: None,
            remote_address: None,
            response_body: None,
            failed: false,
            error_text: None,
        }
    }

    /// Enrich with response metadata.
    pub fn apply_response(&mut self, response: &ResponseInfo) {
        self.status = Some(response.status);
        self.response_headers = Some(response.headers.clone());
        self.mime_type = Some(response.mime_type.clone());
        self.remote_address = Some(RemoteAddress {
            ip: response.remote_ip.clone(),
            port: response.remote_port,
        });
    }

    /// Mark the request as failed. A failed record never carries a body.
    pub fn mark_failed(&mut self, error_text: &str) {
        self.failed = true;
        self.error_text = Some(error_text.to_string());
        self.response_body = None;
    }

    pub fn is_script(&self) -> bool {
        self.resource_type == "script"
    }
}

/// Lowercase the browser's resource category; a missing one becomes `"unknown"`.
pub fn normalize_resource_type(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(resource_type: Option<&str>) -> RequestSent {
        RequestSent {
            request_id: "42.1".to_string(),
            url: "https://example.com/api/items".to_string(),
            method: "POST".to_string(),
            resource_type: resource_type.map(str::to_string),
            headers: HeaderMap::from([("Accept".to_string(), "*/*".to_string())]),
            post_data: Some("{\"q\":1}".to_string()),
            redirect_response: None,
            timestamp: 1.0,
        }
    }

    #[test]
    fn test_normalize_resource_type() {
        assert_eq!(normalize_resource_type(Some("XHR")), "xhr");
        assert_eq!(normalize_resource_type(Some("Fetch")), "fetch");
        assert_eq!(normalize_resource_type(Some("")), "unknown");
        assert_eq!(normalize_resource_type(None), "unknown");
    }

    #[test]
    fn test_from_request_has_no_response_fields() {
        let record = NetworkRequestRecord::from_request(&request(Some("XHR")));
        assert_eq!(record.resource_type, "xhr");
        assert_eq!(record.post_data.as_deref(), Some("{\"q\":1}"));
        assert!(record.status.is_none());
        assert!(record.response_headers.is_none());
        assert!(record.mime_type.is_none());
        assert!(!record.failed);
    }

    #[test]
    fn test_apply_response_then_fail_clears_body() {
        let mut record = NetworkRequestRecord::from_request(&request(None));
        record.apply_response(&ResponseInfo {
            status: 502,
            headers: HeaderMap::new(),
            mime_type: "text/html".to_string(),
            remote_ip: Some("10.0.0.1".to_string()),
            remote_port: Some(443),
        });
        record.response_body = Some("partial".to_string());
        record.mark_failed("net::ERR_ABORTED");

        assert_eq!(record.status, Some(502));
        assert!(record.failed);
        assert!(record.response_body.is_none());
        assert_eq!(record.error_text.as_deref(), Some("net::ERR_ABORTED"));
    }

    #[test]
    fn test_serializes_camel_case_and_skips_absent_response() {
        let record = NetworkRequestRecord::from_request(&request(Some("Script")));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["resourceType"], "script");
        assert_eq!(json["requestId"], "42.1");
        assert!(json.get("status").is_none());
        assert!(json.get("responseBody").is_none());
        assert_eq!(json["failed"], false);
    }
}
