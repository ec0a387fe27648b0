//! Renderer abstraction for browser-based page loading.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Everything the
//! crawl needs from a browser goes through these two traits, which is also
//! what lets the discovery pipeline run against a scripted page in tests.

pub mod chromium;

use crate::config::Viewport;
use crate::network::NetworkTap;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Resize the page's layout viewport.
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;
    /// Headers merged into every outgoing request from this context.
    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<()>;
    /// Start delivering network lifecycle events. Call before `navigate`.
    async fn observe_network(&self) -> Result<NetworkTap>;
    /// Navigate to a URL and wait for the page load to complete.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    ///
    /// Promises are awaited.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Write a full-page PNG screenshot.
    async fn screenshot(&self, path: &Path) -> Result<()>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when Chromium is unavailable; every context request fails.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("Browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
