//! The scrape pipeline: launch, navigate, wait out the challenge, capture,
//! upload, shut down.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use collection_scraper::{collect_assets, ArtifactKind, BlobStore, ScrollPlan, StoredObject};
use serde::{Deserialize, Serialize};

use crate::renderer::{
    wait_for_selector, BrowserLauncher, BrowserOptions, PageAssetSource, RenderContext, Renderer,
};

/// Default collection page to scrape.
pub const DEFAULT_TARGET_URL: &str = "https://opensea.io/collection/boredapeyachtclub";

/// Default selector for asset card anchors.
pub const DEFAULT_ANCHOR_SELECTOR: &str = "a[href*='/assets/']";

/// What a scrape produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Scroll the grid and store the collected assets as JSON.
    #[default]
    Assets,
    /// Store the rendered page HTML once the challenge clears.
    Html,
    /// Store a full-page PNG after a fixed settle delay.
    Screenshot,
}

impl CaptureMode {
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            CaptureMode::Assets => ArtifactKind::CollectionJson,
            CaptureMode::Html => ArtifactKind::Html,
            CaptureMode::Screenshot => ArtifactKind::Screenshot,
        }
    }
}

/// Everything one scrape needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSettings {
    pub target_url: String,
    pub capture: CaptureMode,
    pub browser: BrowserOptions,
    pub anchor_selector: String,
    /// Selector whose presence means the anti-bot challenge has cleared.
    pub challenge_selector: String,
    pub challenge_timeout_ms: u64,
    /// Fixed delay before a screenshot is taken.
    pub settle_ms: u64,
    pub scroll: ScrollPlan,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            capture: CaptureMode::default(),
            browser: BrowserOptions::default(),
            anchor_selector: DEFAULT_ANCHOR_SELECTOR.to_string(),
            challenge_selector: DEFAULT_ANCHOR_SELECTOR.to_string(),
            challenge_timeout_ms: 30_000,
            settle_ms: 5_000,
            scroll: ScrollPlan::default(),
        }
    }
}

/// Outcome of a successful scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub target_url: String,
    pub final_url: String,
    pub capture: CaptureMode,
    pub object: StoredObject,
    /// Number of distinct assets, for [`CaptureMode::Assets`].
    pub asset_count: Option<usize>,
}

/// Run one scrape end to end.
///
/// The browser is shut down whether or not the scrape succeeds.
pub async fn run_scrape(
    launcher: &dyn BrowserLauncher,
    store: &dyn BlobStore,
    settings: &ScrapeSettings,
) -> Result<ScrapeReport> {
    let renderer = launcher
        .launch(&settings.browser)
        .await
        .context("failed to launch browser")?;

    let result = scrape_with(renderer.as_ref(), store, settings).await;

    if let Err(e) = renderer.shutdown().await {
        tracing::warn!(error = %format!("{e:#}"), "browser shutdown failed");
    }
    result
}

async fn scrape_with(
    renderer: &dyn Renderer,
    store: &dyn BlobStore,
    settings: &ScrapeSettings,
) -> Result<ScrapeReport> {
    let mut ctx = renderer.new_context().await?;
    let result = capture(ctx.as_mut(), store, settings).await;
    if let Err(e) = ctx.close().await {
        tracing::debug!(error = %format!("{e:#}"), "page close failed");
    }
    result
}

async fn capture(
    ctx: &mut dyn RenderContext,
    store: &dyn BlobStore,
    settings: &ScrapeSettings,
) -> Result<ScrapeReport> {
    let nav = ctx
        .navigate(&settings.target_url, settings.browser.navigation_timeout_ms)
        .await
        .with_context(|| format!("failed to open {}", settings.target_url))?;
    tracing::info!(url = %nav.final_url, load_time_ms = nav.load_time_ms, "page loaded");

    let ctx: &dyn RenderContext = ctx;
    let kind = settings.capture.artifact_kind();
    let (bytes, asset_count) = match settings.capture {
        CaptureMode::Screenshot => {
            tokio::time::sleep(Duration::from_millis(settings.settle_ms)).await;
            (ctx.screenshot().await?, None)
        }
        CaptureMode::Html => {
            wait_for_challenge(ctx, settings).await?;
            (ctx.get_html().await?.into_bytes(), None)
        }
        CaptureMode::Assets => {
            wait_for_challenge(ctx, settings).await?;
            let mut source = PageAssetSource::new(ctx, &settings.anchor_selector);
            let assets = collect_assets(&mut source, &settings.scroll).await?;
            let count = assets.len();
            (assets.to_json()?, Some(count))
        }
    };

    let key = kind.object_key(Utc::now().timestamp_millis());
    let object = store
        .put(&key, bytes, kind.content_type())
        .await
        .with_context(|| format!("failed to upload {key} to {}", store.describe()))?;

    Ok(ScrapeReport {
        target_url: settings.target_url.clone(),
        final_url: nav.final_url,
        capture: settings.capture,
        object,
        asset_count,
    })
}

async fn wait_for_challenge(ctx: &dyn RenderContext, settings: &ScrapeSettings) -> Result<()> {
    tracing::debug!(selector = %settings.challenge_selector, "waiting for challenge to clear");
    wait_for_selector(
        ctx,
        &settings.challenge_selector,
        Duration::from_millis(settings.challenge_timeout_ms),
    )
    .await
}
