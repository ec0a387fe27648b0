//! Response body capture for finished requests.
//!
//! Capture is best-effort. The browser routinely has no body to give back
//! (redirects, evicted buffers, expired identifiers), so a failed fetch
//! leaves the record without a body and is never reported upward.

use super::classifier::is_api_like;
use super::record::NetworkRequestRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;

/// Raw body as handed back by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// Fetches the body of a finished request by its identifier.
#[async_trait]
pub trait BodySource: Send + Sync {
    async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody>;
}

/// The two independent capture flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturePolicy {
    pub capture_all_bodies: bool,
    pub discover_apis: bool,
}

impl CapturePolicy {
    pub fn new(capture_all_bodies: bool, discover_apis: bool) -> Self {
        Self {
            capture_all_bodies,
            discover_apis,
        }
    }

    /// Whether either flag asks for bodies at all.
    pub fn enabled(&self) -> bool {
        self.capture_all_bodies || self.discover_apis
    }

    /// `(capture-all OR discover-apis) AND api-like`.
    pub fn should_capture(&self, record: &NetworkRequestRecord) -> bool {
        self.enabled() && is_api_like(record)
    }
}

/// Turn a transport body into text. Base64 payloads are decoded and read as
/// UTF-8, replacing invalid sequences.
pub fn decode_body(raw: &ResponseBody) -> Result<String> {
    if !raw.base64_encoded {
        return Ok(raw.body.clone());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.body.as_bytes())
        .context("response body is not valid base64")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fetch and decode one body, swallowing any failure.
///
/// `None` means the browser had nothing to give back; the caller still
/// finalizes the record, just without a body.
pub async fn fetch_body_text(source: &dyn BodySource, request_id: &str) -> Option<String> {
    let fetched = source
        .fetch_body(request_id)
        .await
        .and_then(|raw| decode_body(&raw));
    match fetched {
        Ok(body) => Some(body),
        Err(e) => {
            tracing::debug!(request_id, "response body unavailable: {e:#}");
            None
        }
    }
}
