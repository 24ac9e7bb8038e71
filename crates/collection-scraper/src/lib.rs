//! Asset URL parsing, scroll-based collection and artifact storage
//! for marketplace collection pages.

pub mod collect;
pub mod parse;
pub mod storage;
pub mod types;

pub use collect::{collect_assets, AssetSource, ScrollPlan};
pub use parse::{asset_from_anchor, parse_asset_url};
pub use storage::{ArtifactKind, BlobStore, LocalBlobStore, MemoryBlobStore, StoredObject};
pub use types::*;
