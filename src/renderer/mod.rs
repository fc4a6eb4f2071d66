//! Renderer abstraction for browser-based page capture.
//!
//! Defines the `PageRenderer` trait that abstracts over the browser engine
//! (currently Chromium via chromiumoxide). One capture = one full page load:
//! navigate, let asynchronous content settle, then read the rendered text,
//! the raw HTML, and every background response observed along the way.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// A browser identity used for one capture attempt.
///
/// The target page serves different markup to desktop and mobile clients, so
/// the orchestrator rotates through profiles per URL.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    /// Short tag used in logs and debug artifact names.
    pub name: &'static str,
    /// Full user-agent string.
    pub user_agent: &'static str,
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Viewport height in CSS pixels.
    pub height: u32,
    /// Whether to emulate a mobile device (touch, mobile viewport).
    pub mobile: bool,
}

/// Desktop Chrome on Windows.
pub const DESKTOP_PROFILE: BrowserProfile = BrowserProfile {
    name: "desktop",
    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    width: 1366,
    height: 768,
    mobile: false,
};

/// Mobile Chrome on Android.
pub const MOBILE_PROFILE: BrowserProfile = BrowserProfile {
    name: "mobile",
    user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    width: 412,
    height: 915,
    mobile: true,
};

/// A background network response observed while the page loaded.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Response URL.
    pub url: String,
    /// Content-Type (MIME) as reported by the browser, lowercased.
    pub content_type: String,
    /// Response body text. Binary (base64-encoded) bodies are not captured.
    pub body: String,
}

/// Everything the extractor needs from one page load.
#[derive(Debug, Clone, Default)]
pub struct PageCapture {
    /// Visible rendered text (`document.body.innerText`).
    pub text: String,
    /// Raw HTML (`document.documentElement.outerHTML`).
    pub html: String,
    /// Background responses in arrival order.
    pub responses: Vec<CapturedResponse>,
}

/// A browser engine that can perform one-shot page captures.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` under the given profile and capture text, HTML, and
    /// background responses. The underlying browser is acquired and released
    /// within this call; nothing is shared across attempts.
    async fn capture(&self, url: &str, profile: &BrowserProfile) -> Result<PageCapture>;
}
