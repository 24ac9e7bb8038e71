//! Renderer abstraction for browser-driven page scraping.
//!
//! Defines the `BrowserLauncher`, `Renderer` and `RenderContext` traits that
//! abstract over the browser engine (currently Chromium via chromiumoxide),
//! and [`PageAssetSource`], which lets the collector drive a live page.

pub mod chromium;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use collection_scraper::{AnchorSnapshot, AssetSource, ScrapeError, ScrapeResult};
use serde::{Deserialize, Serialize};

/// How often the challenge wait re-checks the document.
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Options for launching a browser instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Apply chromiumoxide's stealth patches to every page.
    pub stealth: bool,
    /// Explicit browser binary; discovered on the system when `None`.
    pub chrome_path: Option<PathBuf>,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            stealth: true,
            chrome_path: None,
            navigation_timeout_ms: 60_000,
        }
    }
}

/// Starts a fresh browser engine for one scrape.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn Renderer>>;
}

/// A running browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine and its process.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Capture a full-page PNG screenshot.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Whether any element currently matches `selector`.
    async fn has_selector(&self, selector: &str) -> Result<bool> {
        let script = format!("document.querySelector({}) !== null", js_string(selector));
        let value = self.execute_js(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Poll until `selector` matches or `timeout` elapses.
///
/// Used to wait out anti-bot interstitials: the challenge page does not
/// contain the collection grid, so its appearance means the challenge has
/// cleared. This is a heuristic; a challenge variant that never renders the
/// grid surfaces as [`ScrapeError::ChallengeTimeout`].
pub async fn wait_for_selector(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
) -> Result<()> {
    let start = tokio::time::Instant::now();
    loop {
        if ctx.has_selector(selector).await? {
            tracing::debug!(selector, waited_ms = start.elapsed().as_millis() as u64, "selector present");
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(ScrapeError::ChallengeTimeout {
                selector: selector.to_string(),
                waited_ms: timeout.as_millis() as u64,
            }
            .into());
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

/// Quote a string as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Script returning `[{href, image: {src, alt} | null}]` for every match.
pub fn anchor_snapshot_script(selector: &str) -> String {
    format!(
        r#"Array.from(document.querySelectorAll({sel})).map((a) => {{
    const img = a.querySelector("img");
    return {{
        href: a.href || a.getAttribute("href") || "",
        image: img ? {{ src: img.src || "", alt: img.alt || "" }} : null,
    }};
}})"#,
        sel = js_string(selector)
    )
}

/// Adapts a live render context to the collector's [`AssetSource`].
pub struct PageAssetSource<'a> {
    ctx: &'a dyn RenderContext,
    script: String,
}

impl<'a> PageAssetSource<'a> {
    pub fn new(ctx: &'a dyn RenderContext, anchor_selector: &str) -> Self {
        Self {
            ctx,
            script: anchor_snapshot_script(anchor_selector),
        }
    }
}

#[async_trait]
impl AssetSource for PageAssetSource<'_> {
    async fn anchors(&mut self) -> ScrapeResult<Vec<AnchorSnapshot>> {
        let value = self
            .ctx
            .execute_js(&self.script)
            .await
            .map_err(|e| ScrapeError::Browser(format!("{e:#}")))?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn scroll_by(&mut self, delta_px: i64) -> ScrapeResult<()> {
        self.ctx
            .execute_js(&format!("window.scrollBy(0, {delta_px})"))
            .await
            .map_err(|e| ScrapeError::Browser(format!("{e:#}")))?;
        Ok(())
    }
}
