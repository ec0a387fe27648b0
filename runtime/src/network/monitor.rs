// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network monitor: one task per navigation that owns the ingestor.
//!
//! The browser's lifecycle events and the ingestor's body fetches are all
//! driven from a single spawned task, so the identifier map and the log have
//! exactly one writer. The navigation side talks to that task through a
//! `watch` channel (in-flight request count, for network-idle waits) and a
//! `oneshot` stop signal carrying the quiescence grace period.

use super::capture::{BodySource, CapturePolicy};
use super::event::{order_batch, NetworkEvent};
use super::ingestor::EventIngestor;
use super::record::NetworkRequestRecord;
use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// What a render context hands over when network observation starts.
pub struct NetworkTap {
    /// Merged lifecycle events for the page, in delivery order.
    pub events: BoxStream<'static, NetworkEvent>,
    /// Body fetch keyed by request identifier.
    pub bodies: Arc<dyn BodySource>,
}

/// Handle to the task observing one navigation's network activity.
pub struct NetworkMonitor {
    stop: Option<oneshot::Sender<Duration>>,
    task: Option<JoinHandle<Vec<NetworkRequestRecord>>>,
    in_flight: watch::Receiver<usize>,
}

impl NetworkMonitor {
    /// Spawn the owning task. Must be called before navigation starts so no
    /// "request sent" is missed.
    pub fn spawn(tap: NetworkTap, policy: CapturePolicy) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (flight_tx, flight_rx) = watch::channel(0usize);
        let task = tokio::spawn(observe(tap, policy, stop_rx, flight_tx));
        Self {
            stop: Some(stop_tx),
            task: Some(task),
            in_flight: flight_rx,
        }
    }

    /// Requests currently started but not finalized.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until at most `max_in_flight` requests have been outstanding for
    /// a continuous `idle_for`. Returns early if the task has stopped.
    ///
    /// Callers bound this with their own timeout; a request that never
    /// finishes keeps the page busy forever.
    pub async fn wait_for_idle(&mut self, max_in_flight: usize, idle_for: Duration) {
        loop {
            if self
                .in_flight
                .wait_for(|n| *n <= max_in_flight)
                .await
                .is_err()
            {
                return;
            }
            let busy_again = tokio::time::timeout(
                idle_for,
                self.in_flight.wait_for(|n| *n > max_in_flight),
            )
            .await;
            match busy_again {
                Err(_) | Ok(Err(_)) => return,
                Ok(Ok(_)) => continue,
            }
        }
    }

    /// Stop observing, wait up to `grace` for outstanding body fetches, and
    /// return the finalized log.
    pub async fn finish(mut self, grace: Duration) -> Result<Vec<NetworkRequestRecord>> {
        if let Some(stop) = self.stop.take() {
            // The task may already have exited; the join below reports why.
            let _ = stop.send(grace);
        }
        let task = self
            .task
            .take()
            .context("network monitor already finished")?;
        task.await.context("network monitor task failed")
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn observe(
    tap: NetworkTap,
    policy: CapturePolicy,
    mut stop: oneshot::Receiver<Duration>,
    in_flight: watch::Sender<usize>,
) -> Vec<NetworkRequestRecord> {
    let NetworkTap { mut events, bodies } = tap;
    let mut ingestor = EventIngestor::new(policy, bodies);
    let mut events_open = true;

    let grace = loop {
        tokio::select! {
            grace = &mut stop => break grace.unwrap_or(Duration::ZERO),
            event = events.next(), if events_open => match event {
                Some(event) => {
                    let mut batch = vec![event];
                    drain_ready(&mut events, &mut batch);
                    ingest_batch(&mut ingestor, batch);
                    in_flight.send_replace(ingestor.in_flight());
                }
                None => {
                    debug!("network event stream closed");
                    events_open = false;
                }
            },
            _ = ingestor.settle_next(), if ingestor.pending_bodies() > 0 => {}
        }
    };

    // Events the browser already delivered still belong to this navigation.
    if events_open {
        let mut batch = Vec::new();
        drain_ready(&mut events, &mut batch);
        ingest_batch(&mut ingestor, batch);
    }

    ingestor.quiesce(grace).await;
    in_flight.send_replace(ingestor.in_flight());
    ingestor.into_log()
}

fn drain_ready(events: &mut BoxStream<'static, NetworkEvent>, batch: &mut Vec<NetworkEvent>) {
    while let Some(Some(event)) = events.next().now_or_never() {
        batch.push(event);
    }
}

fn ingest_batch(ingestor: &mut EventIngestor, mut batch: Vec<NetworkEvent>) {
    order_batch(&mut batch);
    for event in batch {
        ingestor.ingest(event);
    }
}
