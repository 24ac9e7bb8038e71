//! Scripted stand-ins for the browser, shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use collection_scraper::ScrollPlan;
use collection_scraper_server::renderer::{
    BrowserLauncher, BrowserOptions, NavigationResult, RenderContext, Renderer,
};
use collection_scraper_server::{CaptureMode, ScrapeSettings};

pub const TARGET_URL: &str = "https://opensea.io/collection/test-apes";
pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

// ─────────────────────── fake page ───────────────────────

/// What the fake browser renders.
#[derive(Clone)]
pub struct FakePage {
    /// `(href, image src, image alt)` for every card in the grid.
    pub cards: Vec<(String, String, String)>,
    /// Cards that come into view per scroll pass.
    pub per_pass: usize,
    /// Selector checks that fail before the challenge clears. `None` never clears.
    pub challenge_clears_after: Option<usize>,
    pub fail_navigation: bool,
    pub html: String,
}

impl FakePage {
    /// A non-asset link followed by a grid of `total` ape cards.
    pub fn grid(total: usize, per_pass: usize) -> Self {
        let mut cards = vec![("/about".to_string(), String::new(), String::new())];
        cards.extend((0..total).map(|i| {
            (
                format!("https://opensea.io/assets/ethereum/0xbc4ca0/{i}"),
                format!("https://i.seadn.io/ape/{i}.png"),
                format!("Ape #{i}"),
            )
        }));
        Self {
            cards,
            per_pass,
            challenge_clears_after: Some(0),
            fail_navigation: false,
            html: "<html><body><div id=\"grid\"></div></body></html>".into(),
        }
    }
}

/// Counters observed by the tests.
#[derive(Default)]
pub struct FakeStats {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub selector_checks: AtomicUsize,
}

impl FakeStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

// ─────────────────────── launcher / renderer / context ───────────────────────

pub struct FakeLauncher {
    pub page: FakePage,
    pub stats: Arc<FakeStats>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            stats: Arc::new(FakeStats::default()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &BrowserOptions) -> Result<Box<dyn Renderer>> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRenderer {
            page: self.page.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeRenderer {
    page: FakePage,
    stats: Arc<FakeStats>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Ok(Box::new(FakeContext {
            page: self.page.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

struct FakeContext {
    page: FakePage,
    stats: Arc<FakeStats>,
}

impl FakeContext {
    /// Cards rendered at the current scroll position: the previous pass's
    /// cards stay mounted alongside the new ones.
    fn visible_cards(&self) -> Value {
        let pass = self.stats.scrolls.load(Ordering::SeqCst);
        let start = pass.saturating_sub(1) * self.page.per_pass;
        let end = ((pass + 1) * self.page.per_pass).min(self.page.cards.len());
        let cards: Vec<Value> = self.page.cards[start.min(end)..end]
            .iter()
            .map(|(href, src, alt)| {
                if src.is_empty() {
                    json!({ "href": href, "image": null })
                } else {
                    json!({ "href": href, "image": { "src": src, "alt": alt } })
                }
            })
            .collect();
        Value::Array(cards)
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        if self.page.fail_navigation {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 12,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        if script.starts_with("document.querySelector(") {
            let n = self.stats.selector_checks.fetch_add(1, Ordering::SeqCst);
            let cleared = self.page.challenge_clears_after.is_some_and(|after| n >= after);
            return Ok(Value::Bool(cleared));
        }
        if script.contains("querySelectorAll") {
            return Ok(self.visible_cards());
        }
        if script.starts_with("window.scrollBy") {
            self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.page.html.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(&[0u8; 16]);
        Ok(png)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────── settings ───────────────────────

/// Settings that keep the pipeline fast under test.
pub fn settings(capture: CaptureMode) -> ScrapeSettings {
    ScrapeSettings {
        target_url: TARGET_URL.to_string(),
        capture,
        challenge_timeout_ms: 2_000,
        settle_ms: 0,
        scroll: ScrollPlan {
            iterations: 3,
            scroll_delta_px: 1000,
            pause: Duration::ZERO,
        },
        ..ScrapeSettings::default()
    }
}
