//! Turns a stream of lifecycle events into finalized request records.
//!
//! The ingestor is single-writer: whoever owns it is the only code that
//! touches the identifier map or the log, so none of it is locked. Body
//! fetches run as futures held by the ingestor itself and are driven by
//! the owner through [`EventIngestor::settle_next`] and
//! [`EventIngestor::quiesce`].

use super::capture::{fetch_body_text, BodySource, CapturePolicy};
use super::event::{NetworkEvent, RequestSent, ResponseInfo};
use super::record::NetworkRequestRecord;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Counters for events that were dropped or surfaced instead of applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events for identifiers never seen by a "request sent".
    pub orphan_events: usize,
    /// Terminal events for identifiers that were already finalized.
    pub duplicate_terminals: usize,
    /// "Request sent" events that reused a live identifier without a redirect.
    pub identifier_collisions: usize,
    /// Body fetches abandoned when the quiescence grace period ran out.
    pub abandoned_bodies: usize,
}

type BodyFetch = BoxFuture<'static, (u64, Option<String>)>;

/// Per-navigation owner of the identifier map and the finalized log.
pub struct EventIngestor {
    policy: CapturePolicy,
    bodies: Arc<dyn BodySource>,
    in_progress: HashMap<String, NetworkRequestRecord>,
    finalized: HashSet<String>,
    log: Vec<NetworkRequestRecord>,
    /// Records whose body fetch is outstanding, keyed by fetch sequence.
    awaiting_body: BTreeMap<u64, NetworkRequestRecord>,
    fetches: FuturesUnordered<BodyFetch>,
    next_fetch: u64,
    stats: IngestStats,
}

impl EventIngestor {
    pub fn new(policy: CapturePolicy, bodies: Arc<dyn BodySource>) -> Self {
        Self {
            policy,
            bodies,
            in_progress: HashMap::new(),
            finalized: HashSet::new(),
            log: Vec::new(),
            awaiting_body: BTreeMap::new(),
            fetches: FuturesUnordered::new(),
            next_fetch: 0,
            stats: IngestStats::default(),
        }
    }

    /// Apply one lifecycle event.
    pub fn ingest(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::RequestSent(sent) => self.on_request_sent(sent),
            NetworkEvent::ResponseReceived {
                request_id,
                response,
                ..
            } => self.on_response_received(&request_id, &response),
            NetworkEvent::LoadingFinished { request_id, .. } => {
                self.on_loading_finished(&request_id)
            }
            NetworkEvent::LoadingFailed {
                request_id,
                error_text,
                ..
            } => self.on_loading_failed(&request_id, &error_text),
        }
    }

    fn on_request_sent(&mut self, sent: RequestSent) {
        // A reused identifier starts a fresh lifecycle.
        self.finalized.remove(&sent.request_id);

        if let Some(mut previous) = self.in_progress.remove(&sent.request_id) {
            match &sent.redirect_response {
                Some(redirect) => {
                    debug!(
                        request_id = %sent.request_id,
                        from = %previous.url,
                        to = %sent.url,
                        status = redirect.status,
                        "redirect hop"
                    );
                    previous.apply_response(redirect);
                    self.log.push(previous);
                }
                None => {
                    // The earlier request never reached a terminal event, so
                    // it is evicted like any other unfinished entry.
                    warn!(
                        request_id = %sent.request_id,
                        previous = %previous.url,
                        next = %sent.url,
                        "request identifier reused while still in flight; evicting earlier request"
                    );
                    self.stats.identifier_collisions += 1;
                }
            }
        }

        let record = NetworkRequestRecord::from_request(&sent);
        debug!(
            request_id = %record.request_id,
            method = %record.method,
            resource_type = %record.resource_type,
            url = %record.url,
            "request sent"
        );
        self.in_progress.insert(sent.request_id, record);
    }

    fn on_response_received(&mut self, request_id: &str, response: &ResponseInfo) {
        match self.in_progress.get_mut(request_id) {
            Some(record) => record.apply_response(response),
            None if self.finalized.contains(request_id) => {
                debug!(request_id, "response after finalization dropped");
            }
            None => self.drop_orphan(request_id, "response"),
        }
    }

    fn on_loading_finished(&mut self, request_id: &str) {
        let Some(record) = self.in_progress.remove(request_id) else {
            self.terminal_without_record(request_id, "loading finished");
            return;
        };
        self.finalized.insert(request_id.to_string());

        if self.policy.should_capture(&record) {
            self.start_body_fetch(record);
        } else {
            self.log.push(record);
        }
    }

    fn on_loading_failed(&mut self, request_id: &str, error_text: &str) {
        let Some(mut record) = self.in_progress.remove(request_id) else {
            self.terminal_without_record(request_id, "loading failed");
            return;
        };
        self.finalized.insert(request_id.to_string());
        debug!(request_id, url = %record.url, error_text, "request failed");
        record.mark_failed(error_text);
        self.log.push(record);
    }

    fn start_body_fetch(&mut self, record: NetworkRequestRecord) {
        let seq = self.next_fetch;
        self.next_fetch += 1;

        let bodies = Arc::clone(&self.bodies);
        let request_id = record.request_id.clone();
        self.awaiting_body.insert(seq, record);
        self.fetches.push(
            async move {
                let body = fetch_body_text(bodies.as_ref(), &request_id).await;
                (seq, body)
            }
            .boxed(),
        );
    }

    fn complete_body_fetch(&mut self, seq: u64, body: Option<String>) {
        if let Some(mut record) = self.awaiting_body.remove(&seq) {
            record.response_body = body;
            self.log.push(record);
        }
    }

    fn terminal_without_record(&mut self, request_id: &str, kind: &str) {
        if self.finalized.contains(request_id) {
            warn!(request_id, kind, "duplicate terminal event dropped");
            self.stats.duplicate_terminals += 1;
        } else {
            self.drop_orphan(request_id, kind);
        }
    }

    fn drop_orphan(&mut self, request_id: &str, kind: &str) {
        debug!(request_id, kind, "event for unknown request dropped");
        self.stats.orphan_events += 1;
    }

    /// Number of body fetches still outstanding.
    pub fn pending_bodies(&self) -> usize {
        self.fetches.len()
    }

    /// Requests seen but not yet finalized.
    pub fn in_flight(&self) -> usize {
        self.in_progress.len()
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// The finalized log so far, in finalization order.
    pub fn log(&self) -> &[NetworkRequestRecord] {
        &self.log
    }

    /// Wait for the next outstanding body fetch and append its record.
    ///
    /// Returns `false` when nothing was pending. Cancel-safe: a completed
    /// fetch is appended before the future yields.
    pub async fn settle_next(&mut self) -> bool {
        match self.fetches.next().await {
            Some((seq, body)) => {
                self.complete_body_fetch(seq, body);
                true
            }
            None => false,
        }
    }

    /// Wait until no body fetch is outstanding or `grace` elapses.
    ///
    /// Fetches still running at the deadline are dropped; their records are
    /// appended without a body. Returns how many were abandoned.
    pub async fn quiesce(&mut self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        while !self.fetches.is_empty() {
            match tokio::time::timeout_at(deadline, self.fetches.next()).await {
                Ok(Some((seq, body))) => self.complete_body_fetch(seq, body),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let abandoned = self.fetches.len();
        if abandoned > 0 {
            warn!(abandoned, "body capture grace period elapsed");
            self.fetches = FuturesUnordered::new();
            for (_, record) in std::mem::take(&mut self.awaiting_body) {
                self.log.push(record);
            }
            self.stats.abandoned_bodies += abandoned;
        }
        abandoned
    }

    /// Consume the ingestor, evicting requests that never finalized.
    ///
    /// Unfinished entries are not appended; they only existed for this
    /// navigation and are discarded with it.
    pub fn into_log(mut self) -> Vec<NetworkRequestRecord> {
        // Records still awaiting a body were finalized; they belong in the log.
        for (_, record) in std::mem::take(&mut self.awaiting_body) {
            self.log.push(record);
        }
        if !self.in_progress.is_empty() {
            debug!(
                unfinished = self.in_progress.len(),
                "evicting requests without a terminal event"
            );
        }
        debug!(
            finalized = self.log.len(),
            orphan_events = self.stats.orphan_events,
            duplicate_terminals = self.stats.duplicate_terminals,
            "network log closed"
        );
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::capture::ResponseBody;
    use crate::network::event::HeaderMap;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed body per request id; unknown ids fail like an evicted body.
    struct MapBodies {
        bodies: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapBodies {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                bodies: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BodySource for MapBodies {
        async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .get(request_id)
                .map(|b| ResponseBody {
                    body: b.clone(),
                    base64_encoded: false,
                })
                .ok_or_else(|| anyhow::anyhow!("No data found for resource with given identifier"))
        }
    }

    /// Never resolves.
    struct StuckBodies;

    #[async_trait]
    impl BodySource for StuckBodies {
        async fn fetch_body(&self, _request_id: &str) -> Result<ResponseBody> {
            futures::future::pending().await
        }
    }

    fn sent(id: &str, url: &str, kind: &str) -> NetworkEvent {
        NetworkEvent::RequestSent(RequestSent {
            request_id: id.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type: Some(kind.to_string()),
            headers: HeaderMap::new(),
            post_data: None,
            redirect_response: None,
            timestamp: 0.0,
        })
    }

    fn response_info(status: i64, mime: &str) -> ResponseInfo {
        ResponseInfo {
            status,
            headers: HeaderMap::from([("content-type".to_string(), mime.to_string())]),
            mime_type: mime.to_string(),
            remote_ip: Some("127.0.0.1".to_string()),
            remote_port: Some(8080),
        }
    }

    fn response(id: &str, status: i64, mime: &str) -> NetworkEvent {
        NetworkEvent::ResponseReceived {
            request_id: id.to_string(),
            response: response_info(status, mime),
            timestamp: 0.0,
        }
    }

    fn finished(id: &str) -> NetworkEvent {
        NetworkEvent::LoadingFinished {
            request_id: id.to_string(),
            timestamp: 0.0,
        }
    }

    fn failed(id: &str, error: &str) -> NetworkEvent {
        NetworkEvent::LoadingFailed {
            request_id: id.to_string(),
            error_text: error.to_string(),
            timestamp: 0.0,
        }
    }

    fn capturing(bodies: Arc<dyn BodySource>) -> EventIngestor {
        EventIngestor::new(CapturePolicy::new(true, false), bodies)
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_body() {
        let bodies = MapBodies::new(&[("2", "{\"a\":1}")]);
        let mut ingestor = capturing(bodies.clone());

        ingestor.ingest(sent("1", "https://site.test/", "Document"));
        ingestor.ingest(response("1", 200, "text/html"));
        ingestor.ingest(finished("1"));
        ingestor.ingest(sent("2", "https://site.test/api/list", "XHR"));
        ingestor.ingest(response("2", 200, "application/json"));
        ingestor.ingest(finished("2"));

        assert_eq!(ingestor.pending_bodies(), 1);
        assert_eq!(ingestor.quiesce(Duration::from_secs(1)).await, 0);

        let log = ingestor.into_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].resource_type, "document");
        assert!(log[0].response_body.is_none());
        assert_eq!(log[1].resource_type, "xhr");
        assert_eq!(log[1].status, Some(200));
        assert_eq!(log[1].response_body.as_deref(), Some("{\"a\":1}"));
        // Only the API-like request was fetched.
        assert_eq!(bodies.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_capture_without_flags() {
        let bodies = MapBodies::new(&[("1", "{}")]);
        let mut ingestor = EventIngestor::new(CapturePolicy::default(), bodies.clone());
        ingestor.ingest(sent("1", "https://site.test/api/x", "Fetch"));
        ingestor.ingest(response("1", 200, "application/json"));
        ingestor.ingest(finished("1"));

        assert_eq!(ingestor.pending_bodies(), 0);
        assert_eq!(ingestor.log().len(), 1);
        assert!(ingestor.log()[0].response_body.is_none());
        assert_eq!(bodies.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_fetch_failure_still_appends() {
        let mut ingestor = capturing(MapBodies::new(&[]));
        ingestor.ingest(sent("9", "https://site.test/api/redirected", "XHR"));
        ingestor.ingest(response("9", 302, "application/json"));
        ingestor.ingest(finished("9"));
        ingestor.quiesce(Duration::from_secs(1)).await;

        let log = ingestor.into_log();
        assert_eq!(log.len(), 1);
        assert!(log[0].response_body.is_none());
        assert!(!log[0].failed);
    }

    #[test]
    fn test_failed_load_never_fetches_body() {
        let bodies = MapBodies::new(&[("3", "body")]);
        let mut ingestor = capturing(bodies.clone());
        ingestor.ingest(sent("3", "https://site.test/api/down", "Fetch"));
        ingestor.ingest(failed("3", "net::ERR_CONNECTION_REFUSED"));

        assert_eq!(ingestor.pending_bodies(), 0);
        let log = ingestor.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].failed);
        assert!(log[0].response_body.is_none());
        assert!(log[0].status.is_none());
        assert_eq!(
            log[0].error_text.as_deref(),
            Some("net::ERR_CONNECTION_REFUSED")
        );
        assert_eq!(bodies.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_orphan_events_are_dropped() {
        let mut ingestor = capturing(MapBodies::new(&[]));
        ingestor.ingest(response("ghost", 200, "application/json"));
        ingestor.ingest(finished("ghost"));
        ingestor.ingest(failed("ghost2", "net::ERR_ABORTED"));

        assert!(ingestor.log().is_empty());
        assert_eq!(ingestor.stats().orphan_events, 3);
        assert_eq!(ingestor.stats().duplicate_terminals, 0);
    }

    #[test]
    fn test_first_terminal_event_wins() {
        let mut ingestor = capturing(MapBodies::new(&[]));
        ingestor.ingest(sent("5", "https://site.test/page", "Document"));
        ingestor.ingest(failed("5", "net::ERR_ABORTED"));
        ingestor.ingest(finished("5"));
        ingestor.ingest(failed("5", "net::ERR_ABORTED"));
        // Late enrichment after finalization is ignored too.
        ingestor.ingest(response("5", 200, "text/html"));

        let log = ingestor.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].failed);
        assert!(log[0].status.is_none());
        assert_eq!(ingestor.stats().duplicate_terminals, 2);
    }

    #[test]
    fn test_response_fields_present_iff_response_seen() {
        let mut ingestor = EventIngestor::new(CapturePolicy::default(), MapBodies::new(&[]));
        ingestor.ingest(sent("a", "https://site.test/a.js", "Script"));
        ingestor.ingest(response("a", 200, "application/javascript"));
        ingestor.ingest(finished("a"));
        ingestor.ingest(sent("b", "https://site.test/b.js", "Script"));
        ingestor.ingest(finished("b"));

        for record in ingestor.log() {
            let seen = record.request_id == "a";
            assert_eq!(record.status.is_some(), seen);
            assert_eq!(record.response_headers.is_some(), seen);
            assert_eq!(record.mime_type.is_some(), seen);
        }
    }

    #[test]
    fn test_unfinished_request_is_never_logged() {
        let mut ingestor = capturing(MapBodies::new(&[]));
        ingestor.ingest(sent("long-poll", "https://site.test/api/stream", "XHR"));
        ingestor.ingest(response("long-poll", 200, "application/json"));

        assert_eq!(ingestor.in_flight(), 1);
        assert!(ingestor.into_log().is_empty());
    }

    #[test]
    fn test_redirect_hop_finalizes_previous_with_redirect_status() {
        let mut ingestor = EventIngestor::new(CapturePolicy::default(), MapBodies::new(&[]));
        ingestor.ingest(sent("1", "http://site.test/", "Document"));
        ingestor.ingest(NetworkEvent::RequestSent(RequestSent {
            request_id: "1".to_string(),
            url: "https://site.test/".to_string(),
            method: "GET".to_string(),
            resource_type: Some("Document".to_string()),
            headers: HeaderMap::new(),
            post_data: None,
            redirect_response: Some(response_info(301, "text/html")),
            timestamp: 0.1,
        }));
        ingestor.ingest(response("1", 200, "text/html"));
        ingestor.ingest(finished("1"));

        let log = ingestor.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].url, "http://site.test/");
        assert_eq!(log[0].status, Some(301));
        assert_eq!(log[1].url, "https://site.test/");
        assert_eq!(log[1].status, Some(200));
        assert_eq!(ingestor.stats().identifier_collisions, 0);
    }

    #[test]
    fn test_identifier_collision_evicts_unfinished_request() {
        let mut ingestor = EventIngestor::new(CapturePolicy::default(), MapBodies::new(&[]));
        ingestor.ingest(sent("1", "https://site.test/first", "Fetch"));
        ingestor.ingest(sent("1", "https://site.test/second", "Fetch"));
        ingestor.ingest(finished("1"));

        let urls: Vec<&str> = ingestor.log().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://site.test/second"]);
        assert_eq!(ingestor.stats().identifier_collisions, 1);
    }

    #[test]
    fn test_identifier_collision_alone_logs_nothing() {
        let mut ingestor = EventIngestor::new(CapturePolicy::default(), MapBodies::new(&[]));
        ingestor.ingest(sent("1", "https://site.test/never-finished", "Fetch"));
        ingestor.ingest(sent("1", "https://site.test/second", "Fetch"));

        assert!(ingestor.log().is_empty());
        assert_eq!(ingestor.in_flight(), 1);
        assert!(ingestor.into_log().is_empty());
    }

    #[tokio::test]
    async fn test_quiesce_grace_abandons_stuck_fetch() {
        let mut ingestor = capturing(Arc::new(StuckBodies));
        ingestor.ingest(sent("1", "https://site.test/api/slow", "XHR"));
        ingestor.ingest(finished("1"));
        assert_eq!(ingestor.pending_bodies(), 1);

        let abandoned = ingestor.quiesce(Duration::from_millis(20)).await;
        assert_eq!(abandoned, 1);
        assert_eq!(ingestor.pending_bodies(), 0);
        assert_eq!(ingestor.log().len(), 1);
        assert!(ingestor.log()[0].response_body.is_none());
        assert_eq!(ingestor.stats().abandoned_bodies, 1);
    }

    #[tokio::test]
    async fn test_settle_next_appends_one_record() {
        let mut ingestor = capturing(MapBodies::new(&[("1", "[]")]));
        assert!(!ingestor.settle_next().await);

        ingestor.ingest(sent("1", "https://site.test/api/items", "Fetch"));
        ingestor.ingest(finished("1"));
        assert!(ingestor.log().is_empty());
        assert!(ingestor.settle_next().await);
        assert_eq!(ingestor.log()[0].response_body.as_deref(), Some("[]"));
    }
}
