//! Fixed-budget scroll-and-extract loop.
//!
//! Each pass reads the anchors currently in the document, folds the
//! parsed assets into an [`AssetsOfCollection`], scrolls down and pauses so
//! lazy-loaded cards can render. The loop stops after a fixed number of
//! passes, never on content.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::parse::asset_from_anchor;
use crate::types::{AnchorSnapshot, AssetsOfCollection, ScrapeResult};

/// Default number of scroll passes.
pub const DEFAULT_ITERATIONS: u32 = 50;

/// Default vertical scroll per pass, in CSS pixels.
pub const DEFAULT_SCROLL_DELTA_PX: i64 = 1000;

/// Default pause after each scroll.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(1000);

/// Scroll budget for one collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPlan {
    pub iterations: u32,
    pub scroll_delta_px: i64,
    #[serde(with = "millis")]
    pub pause: Duration,
}

impl Default for ScrollPlan {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            scroll_delta_px: DEFAULT_SCROLL_DELTA_PX,
            pause: DEFAULT_PAUSE,
        }
    }
}

/// A live document that can report its anchors and be scrolled.
#[async_trait]
pub trait AssetSource: Send {
    /// Snapshot every anchor currently matching the asset selector.
    async fn anchors(&mut self) -> ScrapeResult<Vec<AnchorSnapshot>>;
    /// Scroll the viewport vertically by `delta_px`.
    async fn scroll_by(&mut self, delta_px: i64) -> ScrapeResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectorState {
    Scrolling { iteration: u32 },
    Done,
}

/// Run the scroll loop to completion and return everything collected.
///
/// Anchors whose href does not parse are logged and skipped. Errors from
/// the source abort the loop.
pub async fn collect_assets<S>(source: &mut S, plan: &ScrollPlan) -> ScrapeResult<AssetsOfCollection>
where
    S: AssetSource + ?Sized,
{
    let mut assets = AssetsOfCollection::new();
    let mut state = CollectorState::Scrolling { iteration: 0 };

    while let CollectorState::Scrolling { iteration } = state {
        if iteration >= plan.iterations {
            state = CollectorState::Done;
            continue;
        }

        let anchors = source.anchors().await?;
        let mut added = 0usize;
        let mut skipped = 0usize;
        for anchor in &anchors {
            match asset_from_anchor(anchor) {
                Some(asset) => {
                    if assets.insert(asset) {
                        added += 1;
                    }
                }
                None => {
                    skipped += 1;
                    tracing::debug!(href = %anchor.href, "skipping anchor with unparseable asset url");
                }
            }
        }

        tracing::debug!(
            iteration,
            anchors = anchors.len(),
            added,
            skipped,
            total = assets.len(),
            "scroll pass complete"
        );

        source.scroll_by(plan.scroll_delta_px).await?;
        tokio::time::sleep(plan.pause).await;

        state = CollectorState::Scrolling {
            iteration: iteration + 1,
        };
    }

    tracing::info!(
        iterations = plan.iterations,
        assets = assets.len(),
        "collection finished"
    );
    Ok(assets)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnchorImage, ScrapeError};

    fn anchor(id: &str, src: &str) -> AnchorSnapshot {
        AnchorSnapshot {
            href: format!("https://site/assets/matic/0xABC/{id}"),
            image: Some(AnchorImage {
                src: src.to_string(),
                alt: format!("#{id}"),
            }),
        }
    }

    /// Replays one snapshot per pass, repeating the last one when exhausted.
    struct ScriptedSource {
        snapshots: Vec<Vec<AnchorSnapshot>>,
        reads: usize,
        scrolled_px: Vec<i64>,
        fail_on_read: Option<usize>,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<Vec<AnchorSnapshot>>) -> Self {
            Self {
                snapshots,
                reads: 0,
                scrolled_px: Vec::new(),
                fail_on_read: None,
            }
        }
    }

    #[async_trait]
    impl AssetSource for ScriptedSource {
        async fn anchors(&mut self) -> ScrapeResult<Vec<AnchorSnapshot>> {
            let i = self.reads;
            self.reads += 1;
            if self.fail_on_read == Some(i) {
                return Err(ScrapeError::Browser("target closed".into()));
            }
            let idx = i.min(self.snapshots.len().saturating_sub(1));
            Ok(self.snapshots.get(idx).cloned().unwrap_or_default())
        }

        async fn scroll_by(&mut self, delta_px: i64) -> ScrapeResult<()> {
            self.scrolled_px.push(delta_px);
            Ok(())
        }
    }

    fn plan(iterations: u32) -> ScrollPlan {
        ScrollPlan {
            iterations,
            scroll_delta_px: 750,
            pause: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn merges_overlapping_snapshots() {
        let mut source = ScriptedSource::new(vec![
            vec![anchor("A", "a1"), anchor("B", "b1")],
            vec![anchor("B", "b2"), anchor("C", "c1")],
        ]);

        let assets = collect_assets(&mut source, &plan(2)).await.unwrap();

        assert_eq!(assets.len(), 3);
        assert_eq!(assets.get("B").unwrap().image_url, "b2");
        let json: Vec<serde_json::Value> = serde_json::from_slice(&assets.to_json().unwrap()).unwrap();
        assert_eq!(json.len(), 3);
    }

    #[tokio::test]
    async fn runs_the_full_budget_even_without_new_assets() {
        let mut source = ScriptedSource::new(vec![vec![anchor("A", "a")]]);

        let assets = collect_assets(&mut source, &plan(7)).await.unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(source.reads, 7);
        assert_eq!(source.scrolled_px, vec![750; 7]);
    }

    #[tokio::test]
    async fn zero_iterations_touches_nothing() {
        let mut source = ScriptedSource::new(vec![vec![anchor("A", "a")]]);

        let assets = collect_assets(&mut source, &plan(0)).await.unwrap();

        assert!(assets.is_empty());
        assert_eq!(source.reads, 0);
        assert!(source.scrolled_px.is_empty());
    }

    #[tokio::test]
    async fn unparseable_anchors_are_skipped() {
        let mut source = ScriptedSource::new(vec![vec![
            AnchorSnapshot {
                href: "/rankings".into(),
                image: None,
            },
            anchor("A", "a"),
        ]]);

        let assets = collect_assets(&mut source, &plan(1)).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert!(assets.get("A").is_some());
    }

    #[tokio::test]
    async fn source_error_aborts_the_loop() {
        let mut source = ScriptedSource::new(vec![vec![anchor("A", "a")]]);
        source.fail_on_read = Some(2);

        let err = collect_assets(&mut source, &plan(5)).await.unwrap_err();

        assert!(matches!(err, ScrapeError::Browser(_)));
        assert_eq!(source.scrolled_px.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_every_scroll() {
        let mut source = ScriptedSource::new(vec![vec![anchor("A", "a")]]);
        let plan = ScrollPlan {
            iterations: 3,
            scroll_delta_px: 500,
            pause: Duration::from_millis(1200),
        };

        let start = tokio::time::Instant::now();
        collect_assets(&mut source, &plan).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(3600));
    }

    #[test]
    fn plan_pause_serializes_as_millis() {
        let json = serde_json::to_value(ScrollPlan::default()).unwrap();
        assert_eq!(json["pause"], 1000);
        assert_eq!(json["iterations"], 50);
    }
}
