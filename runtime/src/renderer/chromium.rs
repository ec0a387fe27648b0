//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use crate::config::Viewport;
use crate::network::{
    BodySource, HeaderMap, NetworkEvent, NetworkTap, RequestSent, ResponseBody, ResponseInfo,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, Headers, RequestId, Response,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.scout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".scout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".scout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".scout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".scout/chromium/chrome-linux64/chrome"),
                home.join(".scout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome or set SCOUT_CHROMIUM_PATH.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // The handler drives the CDP connection; it must be polled for any
        // page command or event to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler error: {e}");
                }
            }
        });

        tracing::info!("Chromium launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.context("failed to close Chromium");
        // Reap the child process even if the close command failed.
        let _ = browser.wait().await;
        self.handler.abort();
        tracing::info!("Chromium closed");
        closed.map(|_| ())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                1.0,
                false,
            ))
            .await
            .context("failed to set viewport")?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> Result<()> {
        if headers.is_empty() {
            return Ok(());
        }
        let value = serde_json::to_value(headers)?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(value)))
            .await
            .context("failed to set extra HTTP headers")?;
        Ok(())
    }

    async fn observe_network(&self) -> Result<NetworkTap> {
        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;

        let sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(|e| request_sent(&e));
        let received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?
            .map(|e| NetworkEvent::ResponseReceived {
                request_id: e.request_id.inner().clone(),
                response: response_info(&e.response),
                timestamp: *e.timestamp.inner(),
            });
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await?
            .map(|e| NetworkEvent::LoadingFinished {
                request_id: e.request_id.inner().clone(),
                timestamp: *e.timestamp.inner(),
            });
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|e| NetworkEvent::LoadingFailed {
                request_id: e.request_id.inner().clone(),
                error_text: e.error_text.clone(),
                timestamp: *e.timestamp.inner(),
            });

        let events = futures::stream::select_all(vec![
            sent.boxed(),
            received.boxed(),
            finished.boxed(),
            failed.boxed(),
        ])
        .boxed();

        Ok(NetworkTap {
            events,
            bodies: Arc::new(ChromiumBodies {
                page: self.page.clone(),
            }),
        })
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
        let start = Instant::now();

        if let Err(e) = self.page.goto(url).await {
            bail!("navigation to {url} failed: {e}");
        }
        // Wait for page to be loaded
        let _ = self.page.wait_for_navigation().await;

        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        // `undefined` has no JSON value; report it as null.
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .with_context(|| format!("failed to write screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}

/// `Network.getResponseBody` for one page.
struct ChromiumBodies {
    page: Page,
}

#[async_trait]
impl BodySource for ChromiumBodies {
    async fn fetch_body(&self, request_id: &str) -> Result<ResponseBody> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .with_context(|| format!("Network.getResponseBody({request_id})"))?;
        Ok(ResponseBody {
            body: response.result.body.clone(),
            base64_encoded: response.result.base64_encoded,
        })
    }
}

fn request_sent(event: &EventRequestWillBeSent) -> NetworkEvent {
    NetworkEvent::RequestSent(RequestSent {
        request_id: event.request_id.inner().clone(),
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        resource_type: event.r#type.as_ref().map(|t| t.as_ref().to_string()),
        headers: header_map(&event.request.headers),
        post_data: event.request.post_data_entries.as_ref().and_then(|entries| {
            decode_post_data(
                entries
                    .iter()
                    .map(|entry| entry.bytes.as_ref().map(AsRef::<str>::as_ref)),
            )
        }),
        redirect_response: event.redirect_response.as_ref().map(response_info),
        timestamp: *event.timestamp.inner(),
    })
}

fn response_info(response: &Response) -> ResponseInfo {
    ResponseInfo {
        status: response.status,
        headers: header_map(&response.headers),
        mime_type: response.mime_type.clone(),
        remote_ip: response.remote_ip_address.clone(),
        remote_port: response.remote_port,
    }
}

/// CDP headers are a JSON object; non-string values are kept as their JSON text.
fn header_map(headers: &Headers) -> HeaderMap {
    json_header_map(headers.inner())
}

fn json_header_map(value: &serde_json::Value) -> HeaderMap {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .map(|(name, value)| {
                    let value = value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Join base64 post data entries into one body, reading it as lossy UTF-8.
///
/// Entries that are missing or not valid base64 are skipped; an empty body
/// is reported as absent.
fn decode_post_data<'a>(entries: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let mut bytes = Vec::new();
    for encoded in entries.into_iter().flatten() {
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => tracing::debug!("skipping undecodable post data entry: {e}"),
        }
    }
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}
