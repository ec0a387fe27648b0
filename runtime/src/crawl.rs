//! Crawl driver: one browser session, one navigation, one result.
//!
//! The browser is always shut down and the page context always closed,
//! whether the crawl succeeds or fails. Body fetches are quiesced before
//! the network log or the discovery report is read.

use crate::config::{validate_target, CrawlOptions, NETWORK_IDLE_WINDOW};
use crate::discovery::{build_report, scan_page, ApiDiscoveryReport};
use crate::error::{Result, ScoutError};
use crate::network::{CapturePolicy, NetworkMonitor, NetworkRequestRecord};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scrolls 400px every 200ms until the bottom of the page, giving up after 10s.
const AUTO_SCROLL_JS: &str = r#"new Promise((resolve) => {
  let total = 0;
  const timer = setInterval(() => {
    window.scrollBy(0, 400);
    total += 400;
    if (total >= document.body.scrollHeight) {
      clearInterval(timer);
      resolve(true);
    }
  }, 200);
  setTimeout(() => { clearInterval(timer); resolve(false); }, 10000);
})"#;

/// Time allowed after scrolling for lazily triggered requests to go out.
const SCROLL_SETTLE: Duration = Duration::from_secs(2);

const EXTRACT_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

const EXTRACT_LINKS_JS: &str = r#"Array.from(document.querySelectorAll("a[href]")).map((a) => ({
  text: (a.innerText || "").trim(),
  href: a.href,
}))"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// Everything one crawl reports. Optional sections appear only when asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_requests: Option<Vec<NetworkRequestRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_discovery: Option<ApiDiscoveryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_result: Option<serde_json::Value>,
}

/// Crawl `url` with a freshly launched Chromium.
pub async fn crawl(url: &str, options: &CrawlOptions) -> Result<CrawlResult> {
    validate_target(url)?;
    options.validate()?;

    let renderer = ChromiumRenderer::launch()
        .await
        .map_err(ScoutError::browser)?;

    let result = crawl_with(&renderer, url, options).await;

    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    result
}

/// Crawl `url` in a new context of an already running renderer.
pub async fn crawl_with(
    renderer: &dyn Renderer,
    url: &str,
    options: &CrawlOptions,
) -> Result<CrawlResult> {
    let target = validate_target(url)?;
    options.validate()?;

    let mut context = renderer.new_context().await.map_err(ScoutError::browser)?;
    let result = run_page(context.as_mut(), target.as_str(), options).await;

    if let Err(e) = context.close().await {
        warn!("failed to close page context: {e:#}");
    }
    result
}

async fn run_page(
    context: &mut dyn RenderContext,
    url: &str,
    options: &CrawlOptions,
) -> Result<CrawlResult> {
    context
        .set_viewport(options.viewport)
        .await
        .map_err(ScoutError::navigation)?;
    context
        .set_extra_headers(&options.headers)
        .await
        .map_err(ScoutError::navigation)?;

    // Attach before navigating so the document request itself is observed.
    let mut monitor = if options.observes_network() {
        let tap = context
            .observe_network()
            .await
            .map_err(ScoutError::navigation)?;
        let policy = CapturePolicy::new(options.capture_response_bodies, options.discover_apis);
        Some(NetworkMonitor::spawn(tap, policy))
    } else {
        None
    };

    let navigation = tokio::time::timeout(
        options.timeout_duration(),
        load_page(context, url, options, monitor.as_mut()),
    )
    .await
    .map_err(|_| ScoutError::Timeout(options.timeout))??;
    info!(
        url = %navigation.final_url,
        load_time_ms = navigation.load_time_ms,
        "page loaded"
    );

    if options.scroll {
        auto_scroll(context).await?;
    }

    let title = evaluate_string(context, "document.title").await?;
    let final_url = context.get_url().await.map_err(ScoutError::evaluation)?;

    let mut result = CrawlResult {
        url: if final_url.is_empty() {
            navigation.final_url
        } else {
            final_url
        },
        title,
        text: None,
        links: None,
        network_requests: None,
        api_discovery: None,
        screenshot_path: None,
        js_result: None,
    };

    if options.extract_text {
        result.text = Some(evaluate_string(context, EXTRACT_TEXT_JS).await?);
    }

    if options.extract_links {
        let value = context
            .execute_js(EXTRACT_LINKS_JS)
            .await
            .map_err(ScoutError::evaluation)?;
        result.links = Some(serde_json::from_value(value)?);
    }

    if let Some(monitor) = monitor {
        let log = monitor
            .finish(options.body_capture_grace())
            .await
            .map_err(ScoutError::evaluation)?;
        debug!(records = log.len(), "network log finalized");

        if options.discover_apis {
            let endpoints = scan_page(context)
                .await
                .map_err(ScoutError::evaluation)?;
            result.api_discovery = Some(build_report(&log, endpoints));
        }
        if options.reports_network_requests() {
            result.network_requests = Some(log);
        }
    }

    if let Some(path) = &options.screenshot {
        context
            .screenshot(Path::new(path))
            .await
            .map_err(|e| ScoutError::Screenshot(format!("{e:#}")))?;
        result.screenshot_path = Some(path.clone());
    }

    if let Some(script) = &options.javascript {
        result.js_result = Some(
            context
                .execute_js(script)
                .await
                .map_err(ScoutError::evaluation)?,
        );
    }

    Ok(result)
}

/// Navigation plus every wait condition; the caller bounds all of it with
/// the single navigation timeout.
async fn load_page(
    context: &mut dyn RenderContext,
    url: &str,
    options: &CrawlOptions,
    monitor: Option<&mut NetworkMonitor>,
) -> Result<NavigationResult> {
    let navigation = context
        .navigate(url)
        .await
        .map_err(ScoutError::navigation)?;

    if let (Some(threshold), Some(monitor)) = (options.wait_for.idle_threshold(), monitor) {
        monitor.wait_for_idle(threshold, NETWORK_IDLE_WINDOW).await;
        debug!(threshold, "network idle");
    }

    if let Some(selector) = &options.wait_for_selector {
        wait_for_selector(context, selector).await?;
    }

    Ok(navigation)
}

async fn wait_for_selector(context: &dyn RenderContext, selector: &str) -> Result<()> {
    let script = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(selector)?
    );
    loop {
        let found = context
            .execute_js(&script)
            .await
            .map_err(ScoutError::navigation)?;
        if found.as_bool() == Some(true) {
            debug!(selector, "selector matched");
            return Ok(());
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

async fn auto_scroll(context: &dyn RenderContext) -> Result<()> {
    let reached_bottom = context
        .execute_js(AUTO_SCROLL_JS)
        .await
        .map_err(ScoutError::evaluation)?;
    debug!(reached_bottom = %reached_bottom, "auto-scroll done");
    tokio::time::sleep(SCROLL_SETTLE).await;
    Ok(())
}

async fn evaluate_string(context: &dyn RenderContext, script: &str) -> Result<String> {
    let value = context
        .execute_js(script)
        .await
        .map_err(ScoutError::evaluation)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn test_optional_sections_are_omitted() {
        let result = CrawlResult {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            text: None,
            links: Some(vec![Link {
                text: "More".to_string(),
                href: "https://example.com/more".to_string(),
            }]),
            network_requests: None,
            api_discovery: None,
            screenshot_path: None,
            js_result: Some(json!(null)),
        };
        assert_json_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "url": "https://example.com/",
                "title": "Example",
                "links": [{"text": "More", "href": "https://example.com/more"}],
                "jsResult": null
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_target_fails_before_launch() {
        let err = crawl("definitely not a url", &CrawlOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_launch() {
        let options = CrawlOptions {
            timeout: 0,
            ..CrawlOptions::default()
        };
        let err = crawl("https://example.com", &options).await.unwrap_err();
        assert!(matches!(err, ScoutError::Configuration(_)));
    }
}
