//! Core data types for scraped collection assets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One asset card found on a collection page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub image_url: String,
    pub asset_name: String,
    pub asset_id: String,
    pub contract_address: String,
    pub chain: String,
}

/// Identity fields decoded from an asset detail URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPageUrlElements {
    pub chain: String,
    pub contract_address: String,
    pub asset_id: String,
}

/// What the page reports for a single matching anchor element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSnapshot {
    pub href: String,
    #[serde(default)]
    pub image: Option<AnchorImage>,
}

/// The first `<img>` nested inside an anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorImage {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

/// Assets gathered during one scrape, keyed by asset id.
///
/// Inserting an asset whose id is already present replaces the earlier
/// record, so the last scroll pass wins.
#[derive(Debug, Clone, Default)]
pub struct AssetsOfCollection {
    assets: HashMap<String, Asset>,
}

impl AssetsOfCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an asset. Returns `true` when the id was new.
    pub fn insert(&mut self, asset: Asset) -> bool {
        self.assets.insert(asset.asset_id.clone(), asset).is_none()
    }

    /// Look up an asset by id.
    pub fn get(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.get(asset_id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Serialize the assets as a JSON array. Element order is unspecified.
    pub fn to_json(&self) -> ScrapeResult<Vec<u8>> {
        let values: Vec<&Asset> = self.assets.values().collect();
        serde_json::to_vec(&values).map_err(ScrapeError::from)
    }
}

impl Extend<Asset> for AssetsOfCollection {
    fn extend<I: IntoIterator<Item = Asset>>(&mut self, iter: I) {
        for asset in iter {
            self.insert(asset);
        }
    }
}

/// Errors that can occur while scraping a collection.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Challenge did not clear: selector `{selector}` not found after {waited_ms}ms")]
    ChallengeTimeout { selector: String, waited_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
