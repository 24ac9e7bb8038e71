//! Cloud Storage uploads over the JSON API's simple media upload.
//!
//! Credentials are not acquired here: an OAuth access token is passed in
//! from the environment and sent as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use collection_scraper::{BlobStore, ScrapeError, ScrapeResult, StoredObject};

/// Public Cloud Storage endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Upload timeout for a single object.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// [`BlobStore`] writing objects into a Cloud Storage bucket.
#[derive(Clone)]
pub struct GcsBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(bucket: impl Into<String>, token: Option<String>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, bucket, token)
    }

    /// Use a non-default endpoint (emulators, tests).
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token,
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket)
    }
}

impl std::fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBlobStore")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ScrapeResult<StoredObject> {
        let size = bytes.len();
        let mut request = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::Storage(format!("upload of {key} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Storage(format!(
                "upload of {key} rejected with {status}: {}",
                body.trim()
            )));
        }

        tracing::info!(bucket = %self.bucket, key, content_type, size, "uploaded artifact");
        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size,
        })
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}
