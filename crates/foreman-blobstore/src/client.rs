//! Blobstore client interface

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use foreman_core::Result;

/// Options for a blob download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Expected digest of the downloaded content.
    ///
    /// `None` skips verification. `Some("")` is a caller error.
    pub sha1: Option<String>,
    /// Provider specific options, passed through untouched
    pub extra: BTreeMap<String, String>,
}

impl GetOptions {
    /// Options expecting the given digest
    pub fn with_sha1(sha1: impl Into<String>) -> Self {
        Self {
            sha1: Some(sha1.into()),
            ..Self::default()
        }
    }

    /// Add a provider specific option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Trait for blob storage backends
#[async_trait]
pub trait BlobstoreClient: Send + Sync {
    /// Download a blob.
    ///
    /// Writes to `dest` when given, otherwise to a fresh temporary file.
    /// Returns the path of the downloaded file.
    async fn get(&self, id: &str, dest: Option<&Path>, options: &GetOptions) -> Result<PathBuf>;

    /// Upload a file, returning the blob id. A generated id is used when
    /// `id` is `None`.
    async fn create(&self, source: &Path, id: Option<&str>) -> Result<String>;

    /// Delete a blob
    async fn delete(&self, id: &str) -> Result<()>;

    /// Check whether a blob exists
    async fn exists(&self, id: &str) -> Result<bool>;
}
