//! Browser-independent network lifecycle events.
//!
//! The renderer translates its protocol events into these four kinds so the
//! ingestor can be driven by Chromium, by a recorded trace, or by a test.

use std::collections::BTreeMap;

/// Request headers or response headers, flattened to strings.
pub type HeaderMap = BTreeMap<String, String>;

/// A request is about to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSent {
    pub request_id: String,
    pub url: String,
    pub method: String,
    /// Raw resource category as reported by the browser (e.g. `"XHR"`).
    pub resource_type: Option<String>,
    pub headers: HeaderMap,
    pub post_data: Option<String>,
    /// Set when this event is a redirect hop reusing `request_id`; carries
    /// the response that caused the redirect.
    pub redirect_response: Option<ResponseInfo>,
    pub timestamp: f64,
}

/// Response metadata shared by `ResponseReceived` and redirect hops.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub status: i64,
    pub headers: HeaderMap,
    pub mime_type: String,
    pub remote_ip: Option<String>,
    pub remote_port: Option<i64>,
}

/// One network lifecycle event for a single request identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    RequestSent(RequestSent),
    ResponseReceived {
        request_id: String,
        response: ResponseInfo,
        timestamp: f64,
    },
    LoadingFinished {
        request_id: String,
        timestamp: f64,
    },
    LoadingFailed {
        request_id: String,
        error_text: String,
        timestamp: f64,
    },
}

impl NetworkEvent {
    pub fn request_id(&self) -> &str {
        match self {
            NetworkEvent::RequestSent(sent) => &sent.request_id,
            NetworkEvent::ResponseReceived { request_id, .. }
            | NetworkEvent::LoadingFinished { request_id, .. }
            | NetworkEvent::LoadingFailed { request_id, .. } => request_id,
        }
    }

    /// Monotonic browser timestamp in seconds.
    pub fn timestamp(&self) -> f64 {
        match self {
            NetworkEvent::RequestSent(sent) => sent.timestamp,
            NetworkEvent::ResponseReceived { timestamp, .. }
            | NetworkEvent::LoadingFinished { timestamp, .. }
            | NetworkEvent::LoadingFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event finalizes its request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NetworkEvent::LoadingFinished { .. } | NetworkEvent::LoadingFailed { .. }
        )
    }
}

/// Stable sort of a drained batch by browser timestamp.
///
/// Each event kind arrives on its own listener channel, so a batch read in
/// one go can interleave kinds out of order. Ties keep arrival order.
pub fn order_batch(batch: &mut [NetworkEvent]) {
    batch.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: &str, ts: f64) -> NetworkEvent {
        NetworkEvent::LoadingFinished {
            request_id: id.to_string(),
            timestamp: ts,
        }
    }

    fn sent(id: &str, ts: f64) -> NetworkEvent {
        NetworkEvent::RequestSent(RequestSent {
            request_id: id.to_string(),
            url: "https://example.com/".to_string(),
            method: "GET".to_string(),
            resource_type: None,
            headers: HeaderMap::new(),
            post_data: None,
            redirect_response: None,
            timestamp: ts,
        })
    }

    #[test]
    fn test_order_batch_restores_lifecycle_order() {
        let mut batch = vec![finished("1", 2.0), sent("1", 1.0)];
        order_batch(&mut batch);
        assert!(matches!(batch[0], NetworkEvent::RequestSent(_)));
        assert!(batch[1].is_terminal());
    }

    #[test]
    fn test_order_batch_is_stable_on_ties() {
        let mut batch = vec![finished("a", 1.0), finished("b", 1.0), finished("c", 0.5)];
        order_batch(&mut batch);
        let ids: Vec<&str> = batch.iter().map(|e| e.request_id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
