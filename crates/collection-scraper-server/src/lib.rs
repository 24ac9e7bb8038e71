//! HTTP-triggered headless-browser scraping of marketplace collection pages
//! into object storage.

pub mod config;
pub mod gcs;
pub mod jobs;
pub mod logging;
pub mod renderer;
pub mod rest;
pub mod scrape;

use std::sync::Arc;

use collection_scraper::{BlobStore, LocalBlobStore};

pub use config::{Overrides, ScraperConfig, StorageConfig};
pub use jobs::{JobManager, JobStatus};
pub use scrape::{run_scrape, CaptureMode, ScrapeReport, ScrapeSettings};

/// Build the configured artifact store.
pub fn build_store(storage: &StorageConfig) -> Arc<dyn BlobStore> {
    match storage {
        StorageConfig::Local { dir } => Arc::new(LocalBlobStore::new(dir.clone())),
        StorageConfig::Gcs {
            bucket,
            token,
            endpoint,
        } => Arc::new(gcs::GcsBlobStore::with_endpoint(
            endpoint.clone(),
            bucket.clone(),
            token.clone(),
        )),
    }
}
