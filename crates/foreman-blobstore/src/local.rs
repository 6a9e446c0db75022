//! Directory backed blobstore

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, instrument};

use foreman_core::{BlobstoreError, Result};

use crate::client::{BlobstoreClient, GetOptions};

/// Blobstore keeping each blob as `<root>/<id>`
#[derive(Debug, Clone)]
pub struct LocalBlobstoreClient {
    root: PathBuf,
}

impl LocalBlobstoreClient {
    /// Create a client rooted at a directory. The directory is created on
    /// first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(BlobstoreError::InvalidArgument(format!("invalid blob id '{}'", id)).into());
        }
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl BlobstoreClient for LocalBlobstoreClient {
    #[instrument(skip(self, options), fields(root = %self.root.display()))]
    async fn get(&self, id: &str, dest: Option<&Path>, options: &GetOptions) -> Result<PathBuf> {
        let source = self.blob_path(id)?;
        if !fs::try_exists(&source).await.map_err(BlobstoreError::Io)? {
            return Err(BlobstoreError::NotFound(id.to_string()).into());
        }

        let target = match dest {
            Some(dest) => dest.to_path_buf(),
            None => tempfile::Builder::new()
                .prefix("blob-")
                .tempfile()
                .map_err(BlobstoreError::Io)?
                .into_temp_path()
                .keep()
                .map_err(|e| BlobstoreError::Io(e.error))?,
        };

        fs::copy(&source, &target).await.map_err(BlobstoreError::Io)?;
        debug!(target = %target.display(), "downloaded blob");
        Ok(target)
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn create(&self, source: &Path, id: Option<&str>) -> Result<String> {
        let id = match id {
            Some(id) => id.to_string(),
            None => {
                let content = fs::read(source).await.map_err(BlobstoreError::Io)?;
                format!("{:x}", Sha256::digest(&content))
            }
        };
        let target = self.blob_path(&id)?;

        fs::create_dir_all(&self.root).await.map_err(BlobstoreError::Io)?;
        fs::copy(source, &target).await.map_err(BlobstoreError::Io)?;
        debug!(id = %id, "stored blob");
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.blob_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobstoreError::NotFound(id.to_string()).into())
            }
            Err(e) => Err(BlobstoreError::Io(e).into()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.blob_path(id)?;
        Ok(fs::try_exists(&path).await.map_err(BlobstoreError::Io)?)
    }
}
