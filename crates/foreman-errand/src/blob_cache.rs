//! Template blob cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use foreman_blobstore::{BlobstoreClient, GetOptions};
use foreman_core::Result;

use crate::traits::BlobCache;

/// Downloads job template blobs once per deployment operation
pub struct TemplateBlobCache {
    client: Arc<dyn BlobstoreClient>,
    dir: PathBuf,
    blobs: Mutex<HashMap<String, PathBuf>>,
}

impl TemplateBlobCache {
    /// Create a cache storing downloads in `dir`
    pub fn new(client: Arc<dyn BlobstoreClient>, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of cached blobs
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Download a blob, or return the cached copy
    pub async fn download_blob(&self, blob_id: &str, sha1: &str) -> Result<PathBuf> {
        if let Some(path) = self.cached(blob_id) {
            debug!(blob_id, "template blob cache hit");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(cache_file_name(blob_id, sha1));
        let path = self
            .client
            .get(blob_id, Some(&target), &GetOptions::with_sha1(sha1))
            .await?;

        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(blob_id.to_string(), path.clone());
        }
        debug!(blob_id, path = %path.display(), "cached template blob");
        Ok(path)
    }

    fn cached(&self, blob_id: &str) -> Option<PathBuf> {
        self.blobs.lock().ok()?.get(blob_id).cloned()
    }
}

/// Stable file name for a blob id and digest
fn cache_file_name(blob_id: &str, sha1: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blob_id.as_bytes());
    hasher.update(b":");
    hasher.update(sha1.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl BlobCache for TemplateBlobCache {
    fn clean_cache(&self) {
        let drained: Vec<PathBuf> = match self.blobs.lock() {
            Ok(mut blobs) => blobs.drain().map(|(_, path)| path).collect(),
            Err(_) => {
                warn!("template blob cache lock poisoned");
                return;
            }
        };

        for path in drained {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed cached blob"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cached blob"),
            }
        }
    }
}

impl std::fmt::Debug for TemplateBlobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateBlobCache")
            .field("dir", &self.dir)
            .field("blobs", &self.len())
            .finish()
    }
}
