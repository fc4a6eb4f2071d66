//! Chromium-based page capture using chromiumoxide.
//!
//! Each `capture()` launches a fresh headless Chromium, configures the
//! requested profile (user agent + viewport), subscribes to background
//! network responses over CDP, blocks heavyweight resource types, navigates,
//! waits for asynchronous content to settle, reads the rendered text and raw
//! HTML, and tears the browser down. Nothing survives the call.

use super::{BrowserProfile, CapturedResponse, PageCapture, PageRenderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, GetResponseBodyParams, ResourceType,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Light anti-automation countermeasures, installed before any page script
/// runs. The quote page degrades or blocks when it detects a webdriver.
const STEALTH_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
    Object.defineProperty(navigator, 'languages', {get: () => ['en-US','en']});
    Object.defineProperty(navigator, 'plugins', {get: () => [1,2,3]});
    window.chrome = { runtime: {} };
"#;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. DXY_WATCH_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("DXY_WATCH_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.dxy-watch/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".dxy-watch/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".dxy-watch/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".dxy-watch/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".dxy-watch/chromium/chrome-linux64/chrome"),
                home.join(".dxy-watch/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    if let Ok(path) = which::which("google-chrome") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium-browser") {
        return Some(path);
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

/// Tunables for one capture attempt.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Navigation timeout in milliseconds.
    pub nav_timeout_ms: u64,
    /// Fixed wait after DOM-ready for asynchronous content to settle.
    pub settle_ms: u64,
    /// Abort image/media/font requests to cut page load time.
    pub block_heavy_resources: bool,
    /// URL substrings that mark a background response as quote-bearing.
    /// Responses with a JSON content-type are captured regardless.
    pub capture_url_hints: Vec<String>,
}

/// Headless-Chromium implementation of `PageRenderer`.
pub struct ChromiumRenderer {
    settings: RenderSettings,
}

impl ChromiumRenderer {
    /// Create a renderer. Fails fast when no Chromium binary can be found,
    /// rather than failing on the first capture.
    pub fn new(settings: RenderSettings) -> Result<Self> {
        find_chromium().context(
            "Chromium not found. Install Chrome/Chromium or set DXY_WATCH_CHROMIUM_PATH.",
        )?;
        Ok(Self { settings })
    }

    async fn launch(&self, profile: &BrowserProfile) -> Result<Browser> {
        let chrome_path = find_chromium().context("Chromium binary disappeared")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .viewport(Viewport {
                width: profile.width,
                height: profile.height,
                device_scale_factor: None,
                emulating_mobile: profile.mobile,
                is_landscape: false,
                has_touch: profile.mobile,
            })
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection until the browser goes away.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(browser)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn capture(&self, url: &str, profile: &BrowserProfile) -> Result<PageCapture> {
        let mut browser = self.launch(profile).await?;
        let result = capture_on(&browser, url, profile, &self.settings).await;
        // Best-effort teardown either way; the capture result wins.
        if let Err(e) = browser.close().await {
            debug!("browser close failed: {e}");
        }
        let _ = browser.wait().await;
        result
    }
}

async fn capture_on(
    browser: &Browser,
    url: &str,
    profile: &BrowserProfile,
    settings: &RenderSettings,
) -> Result<PageCapture> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("failed to create page")?;

    page.execute(SetUserAgentOverrideParams::new(profile.user_agent))
        .await
        .context("failed to set user agent")?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
        .await
        .context("failed to install init script")?;

    let blocker = if settings.block_heavy_resources {
        Some(spawn_resource_blocker(&page).await?)
    } else {
        None
    };
    let (responses, capture_task) = spawn_response_capture(&page, settings).await?;

    let nav = tokio::time::timeout(
        Duration::from_millis(settings.nav_timeout_ms),
        page.goto(url),
    )
    .await;

    match nav {
        Ok(Ok(_)) => {
            let _ = page.wait_for_navigation().await;
        }
        Ok(Err(e)) => {
            capture_task.abort();
            if let Some(t) = blocker {
                t.abort();
            }
            bail!("navigation failed: {e}");
        }
        Err(_) => {
            capture_task.abort();
            if let Some(t) = blocker {
                t.abort();
            }
            bail!("navigation timed out after {}ms", settings.nav_timeout_ms);
        }
    }

    // Let XHR-driven content land before reading anything.
    tokio::time::sleep(Duration::from_millis(settings.settle_ms)).await;

    let text: String = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .context("failed to read rendered text")?
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert rendered text: {e:?}"))?;

    let html: String = page
        .evaluate("document.documentElement.outerHTML")
        .await
        .context("failed to read HTML")?
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert HTML: {e:?}"))?;

    capture_task.abort();
    if let Some(t) = blocker {
        t.abort();
    }

    let responses = responses
        .lock()
        .map(|g| g.clone())
        .unwrap_or_default();

    debug!(
        profile = profile.name,
        responses = responses.len(),
        text_len = text.len(),
        html_len = html.len(),
        "page captured"
    );

    let _ = page.close().await;

    Ok(PageCapture {
        text,
        html,
        responses,
    })
}

/// Abort image/media/font requests via the CDP Fetch domain; everything else
/// continues untouched.
async fn spawn_resource_blocker(page: &Page) -> Result<tokio::task::JoinHandle<()>> {
    page.execute(FetchEnableParams::default())
        .await
        .context("failed to enable request interception")?;

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("failed to listen for paused requests")?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let blocked = matches!(
                event.resource_type,
                ResourceType::Image | ResourceType::Media | ResourceType::Font
            );
            let outcome = if blocked {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("request interception reply failed: {e}");
            }
        }
    }))
}

/// Collect the bodies of background responses that look quote-bearing, in
/// arrival order. Bodies are pulled as soon as the response event fires;
/// responses whose body cannot be read (evicted, binary) are skipped.
async fn spawn_response_capture(
    page: &Page,
    settings: &RenderSettings,
) -> Result<(
    Arc<Mutex<Vec<CapturedResponse>>>,
    tokio::task::JoinHandle<()>,
)> {
    let mut events = page
        .event_listener::<EventResponseReceived>()
        .await
        .context("failed to listen for responses")?;

    let captured: Arc<Mutex<Vec<CapturedResponse>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let hints = settings.capture_url_hints.clone();
    let page = page.clone();

    let task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let url = event.response.url.to_lowercase();
            let content_type = event.response.mime_type.to_lowercase();

            let interesting = content_type.contains("json")
                || hints.iter().any(|h| url.contains(h.as_str()));
            if !interesting {
                continue;
            }

            let body = match page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            {
                Ok(resp) if !resp.result.base64_encoded => resp.result.body.clone(),
                Ok(_) => continue, // binary body
                Err(e) => {
                    debug!(url = %event.response.url, "response body unavailable: {e}");
                    continue;
                }
            };

            if let Ok(mut guard) = sink.lock() {
                guard.push(CapturedResponse {
                    url: event.response.url.clone(),
                    content_type,
                    body,
                });
            } else {
                warn!("response capture mutex poisoned");
            }
        }
    });

    Ok((captured, task))
}
