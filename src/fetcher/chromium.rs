//! Chromiumoxide-backed page fetcher
//!
//! Drives a headless Chromium instance over CDP. Each navigation opens a
//! fresh page, captures the document response headers from the network event
//! stream, runs the single-flight extraction script and closes the page.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use futures::StreamExt;
use log::{debug, warn};
use tokio::task::JoinHandle;
use url::Url;

use super::{
    DomSnapshot, FetchError, FetchedPage, FetcherFactory, NavigateOptions, PageFetcher,
    RenderingMode,
};
use super::js::{BODY_TEXT_LENGTH_SCRIPT, EXTRACT_SCRIPT};

/// How long to scan buffered network events for the document response
const RESPONSE_SCAN_TIMEOUT: Duration = Duration::from_millis(500);

/// Cap for the complete mode's network-idle wait
const COMPLETE_WAIT: Duration = Duration::from_secs(15);

/// Cap for the adaptive mode's second wait
const ADAPTIVE_WAIT: Duration = Duration::from_secs(10);

/// Launch options for the chromium fetcher
#[derive(Debug, Clone)]
pub struct ChromiumFetcherOptions {
    pub headless: bool,
    /// Per-run browser profile directory; prevents profile lock contention
    pub user_data_dir: Option<PathBuf>,
    /// Explicit executable path; the chromiumoxide fetcher resolves one
    /// when absent
    pub chrome_executable: Option<PathBuf>,
}

impl Default for ChromiumFetcherOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_data_dir: None,
            chrome_executable: None,
        }
    }
}

/// Page fetcher backed by one Chromium instance
pub struct ChromiumFetcher {
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumFetcher {
    /// Launch a browser and spawn the CDP handler task
    pub async fn launch(options: &ChromiumFetcherOptions) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(30))
            .window_size(1280, 900);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &options.user_data_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create user data dir: {e}"))?;
            builder = builder.user_data_dir(dir);
        }
        if let Some(exe) = &options.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch browser: {e}"))?;

        // The handler drives the CDP connection until the browser goes away
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler_task: parking_lot::Mutex::new(Some(handler_task)),
        })
    }

    async fn new_page(&self) -> Result<Page, FetchError> {
        let guard = self.browser.lock().await;
        let Some(browser) = guard.as_ref() else {
            return Err(FetchError::Browser("browser already closed".to_string()));
        };
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))
    }

    async fn wait_for_render(&self, page: &Page, opts: &NavigateOptions) {
        match opts.rendering_mode {
            RenderingMode::Fast => {}
            RenderingMode::Complete => {
                // Fall back silently to DOMContentLoaded when the page never
                // goes idle
                let _ = tokio::time::timeout(COMPLETE_WAIT, page.wait_for_navigation()).await;
            }
            RenderingMode::Adaptive => {
                let text_len = match page.evaluate(BODY_TEXT_LENGTH_SCRIPT).await {
                    Ok(result) => result.into_value::<usize>().unwrap_or(0),
                    Err(e) => {
                        debug!("Adaptive length probe failed: {e}");
                        0
                    }
                };
                if text_len < opts.min_content_length {
                    debug!(
                        "Adaptive mode: {text_len} chars < {}, waiting for network idle",
                        opts.min_content_length
                    );
                    let _ = tokio::time::timeout(ADAPTIVE_WAIT, page.wait_for_navigation()).await;
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        let page = self.new_page().await?;

        // Register the listener before navigating so the document response
        // is buffered even when it arrives mid-goto
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let navigation = tokio::time::timeout(opts.timeout, page.goto(url)).await;
        match navigation {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = page.clone().close().await;
                return Err(FetchError::Navigation(e.to_string()));
            }
            Err(_) => {
                let _ = page.clone().close().await;
                return Err(FetchError::Timeout {
                    seconds: opts.timeout.as_secs(),
                });
            }
        }

        self.wait_for_render(&page, opts).await;

        let response = scan_document_response(&mut responses, url).await;

        let dom = match page.evaluate(EXTRACT_SCRIPT).await {
            Ok(result) => match result.into_value::<DomSnapshot>() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Extraction script returned unexpected shape for {url}: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("Extraction script failed for {url}: {e}");
                None
            }
        };

        let html = page
            .content()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        if let Err(e) = page.close().await {
            debug!("Failed to close page for {url}: {e}");
        }

        let (status_code, content_type, etag, last_modified) = match response {
            Some(info) => (info.status, info.content_type, info.etag, info.last_modified),
            None => {
                debug!("No document response captured for {url}, assuming 200");
                (200, None, None, None)
            }
        };

        Ok(FetchedPage {
            status_code,
            content_type,
            etag,
            last_modified,
            final_url,
            html,
            dom,
            fetch_duration: started.elapsed(),
        })
    }

    async fn close(&self) -> Result<(), FetchError> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {e}");
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait failed: {e}");
            }
        }

        let task = self.handler_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        Ok(())
    }
}

/// Headers captured from the document response
struct DocumentResponse {
    status: u16,
    content_type: Option<String>,
    etag: Option<String>,
    last_modified: Option<String>,
}

/// Scan buffered network events for the Document response matching `url`
///
/// Multiple Document resources can arrive (iframes, redirects); matching is
/// by normalised URL rather than first-seen.
async fn scan_document_response(
    events: &mut (impl futures::Stream<Item = Arc<EventResponseReceived>> + Unpin),
    url: &str,
) -> Option<DocumentResponse> {
    let target = normalize_for_matching(url)?;

    let scan = async {
        while let Some(event) = events.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            let Some(candidate) = normalize_for_matching(event.response.url.as_str()) else {
                continue;
            };
            if candidate != target {
                continue;
            }

            let headers = event.response.headers.inner();
            return Some(DocumentResponse {
                status: u16::try_from(event.response.status).unwrap_or(0),
                content_type: header_value(headers, "content-type")
                    .map(|v| v.split(';').next().unwrap_or("").trim().to_string()),
                etag: header_value(headers, "etag")
                    .map(|v| v.strip_prefix("W/").unwrap_or(&v).to_string()),
                last_modified: header_value(headers, "last-modified"),
            });
        }
        None
    };

    match tokio::time::timeout(RESPONSE_SCAN_TIMEOUT, scan).await {
        Ok(found) => found,
        Err(_) => None,
    }
}

/// Case-insensitive header lookup in the CDP headers object
fn header_value(headers: &serde_json::Value, name: &str) -> Option<String> {
    headers.as_object()?.iter().find_map(|(key, value)| {
        if key.eq_ignore_ascii_case(name) {
            value.as_str().map(str::to_string)
        } else {
            None
        }
    })
}

/// Normalize a URL for response matching: drop query and fragment, trim the
/// trailing slash, lower-case the host
fn normalize_for_matching(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    Some(format!("{}://{host}{path}", parsed.scheme()))
}

/// Factory producing independent chromium fetcher contexts
pub struct ChromiumFetcherFactory {
    options: ChromiumFetcherOptions,
}

impl ChromiumFetcherFactory {
    #[must_use]
    pub fn new(options: ChromiumFetcherOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl FetcherFactory for ChromiumFetcherFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn PageFetcher>> {
        let mut options = self.options.clone();
        // Each context gets its own profile directory so parallel instances
        // never contend on the Chrome singleton lock
        if let Some(base) = &self.options.user_data_dir {
            options.user_data_dir = Some(base.join(uuid::Uuid::new_v4().to_string()));
        }
        let fetcher = ChromiumFetcher::launch(&options).await?;
        Ok(Arc::new(fetcher))
    }
}
