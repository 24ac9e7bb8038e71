//! Write-once artifact storage.
//!
//! Every artifact lands under a fixed key prefix with a timestamp-derived
//! file name, and carries an explicit content type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::types::{ScrapeError, ScrapeResult};

/// The kinds of artifact a scrape can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Html,
    CollectionJson,
}

impl ArtifactKind {
    /// Key prefix, including the trailing slash.
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Screenshot | ArtifactKind::Html => "puppeteer_capture/",
            ArtifactKind::CollectionJson => "collections_json/",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "png",
            ArtifactKind::Html => "html",
            ArtifactKind::CollectionJson => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "image/png",
            ArtifactKind::Html => "text/html",
            ArtifactKind::CollectionJson => "text/json",
        }
    }

    /// Object key for an artifact written at `timestamp_ms` (unix millis).
    pub fn object_key(self, timestamp_ms: i64) -> String {
        format!("{}{timestamp_ms}.{}", self.prefix(), self.extension())
    }
}

/// A stored object as reported back by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// Destination for scrape artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key` with the given content type.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ScrapeResult<StoredObject>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Name of the sidecar file holding object metadata.
fn metadata_path(path: &Path) -> PathBuf {
    let name = format!(
        "{}.metadata.json",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object")
    );
    path.with_file_name(name)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    content_type: String,
}

/// Stores artifacts as files under a root directory.
///
/// Each object gets a `<name>.metadata.json` sidecar recording its content
/// type.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> ScrapeResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if key.is_empty() || escapes {
            return Err(ScrapeError::Storage(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    /// Read back the content type recorded for `key`, if any.
    pub async fn content_type_of(&self, key: &str) -> ScrapeResult<Option<String>> {
        let path = metadata_path(&self.resolve(key)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let meta: ObjectMetadata = serde_json::from_slice(&bytes)?;
                Ok(Some(meta.content_type))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ScrapeResult<StoredObject> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let size = bytes.len();
        tokio::fs::write(&path, bytes).await?;
        let meta = serde_json::to_vec(&ObjectMetadata {
            content_type: content_type.to_string(),
        })?;
        tokio::fs::write(metadata_path(&path), meta).await?;

        tracing::info!(key, content_type, size, path = %path.display(), "stored artifact");
        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size,
        })
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

/// Keeps artifacts in memory. Handy for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored object as `(content_type, bytes)`.
    pub async fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().await.get(key).cloned()
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> ScrapeResult<StoredObject> {
        let size = bytes.len();
        self.objects
            .lock()
            .await
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size,
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_prefix_and_extension() {
        assert_eq!(
            ArtifactKind::CollectionJson.object_key(1_650_000_000_123),
            "collections_json/1650000000123.json"
        );
        assert_eq!(
            ArtifactKind::Screenshot.object_key(5),
            "puppeteer_capture/5.png"
        );
        assert_eq!(ArtifactKind::Html.object_key(5), "puppeteer_capture/5.html");
    }

    #[test]
    fn content_types_per_kind() {
        assert_eq!(ArtifactKind::Screenshot.content_type(), "image/png");
        assert_eq!(ArtifactKind::Html.content_type(), "text/html");
        assert_eq!(ArtifactKind::CollectionJson.content_type(), "text/json");
    }

    #[tokio::test]
    async fn local_store_writes_file_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let key = ArtifactKind::CollectionJson.object_key(42);
        let stored = store
            .put(&key, b"[]".to_vec(), ArtifactKind::CollectionJson.content_type())
            .await
            .unwrap();

        assert_eq!(stored.size, 2);
        let on_disk = std::fs::read(dir.path().join("collections_json/42.json")).unwrap();
        assert_eq!(on_disk, b"[]");
        assert_eq!(
            store.content_type_of(&key).await.unwrap().as_deref(),
            Some("text/json")
        );
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for key in ["../evil.json", "/etc/passwd", ""] {
            let err = store.put(key, vec![1], "text/plain").await.unwrap_err();
            assert!(matches!(err, ScrapeError::Storage(_)), "{key:?}");
        }
    }

    #[tokio::test]
    async fn missing_metadata_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(store.content_type_of("collections_json/1.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("puppeteer_capture/1.html", b"<html/>".to_vec(), "text/html").await.unwrap();

        let (ct, bytes) = store.get("puppeteer_capture/1.html").await.unwrap();
        assert_eq!(ct, "text/html");
        assert_eq!(bytes, b"<html/>");
        assert_eq!(store.keys().await, vec!["puppeteer_capture/1.html".to_string()]);
    }
}
