//! Blobstore client that verifies downloads against an expected digest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use foreman_core::{BlobstoreError, Result};

use crate::client::{BlobstoreClient, GetOptions};
use crate::verifier::{DigestCheck, DigestVerifier, MultidigestVerifier};

/// Wraps a client and checks every download that names an expected digest
pub struct Sha1VerifiableBlobstoreClient {
    client: Arc<dyn BlobstoreClient>,
    verifier: Arc<dyn DigestVerifier>,
}

impl Sha1VerifiableBlobstoreClient {
    /// Wrap a client, verifying with the multi-digest tool at `multidigest_path`
    pub fn new(client: Arc<dyn BlobstoreClient>, multidigest_path: impl Into<PathBuf>) -> Self {
        Self::with_verifier(client, Arc::new(MultidigestVerifier::new(multidigest_path)))
    }

    /// Wrap a client with a custom verifier
    pub fn with_verifier(client: Arc<dyn BlobstoreClient>, verifier: Arc<dyn DigestVerifier>) -> Self {
        Self { client, verifier }
    }
}

#[async_trait]
impl BlobstoreClient for Sha1VerifiableBlobstoreClient {
    #[instrument(skip(self, dest, options))]
    async fn get(&self, id: &str, dest: Option<&Path>, options: &GetOptions) -> Result<PathBuf> {
        if let Some(sha1) = &options.sha1 {
            if sha1.trim().is_empty() {
                return Err(BlobstoreError::InvalidArgument("sha1 must not be nil".to_string()).into());
            }
        }

        let file = self.client.get(id, dest, options).await?;

        let Some(expected) = &options.sha1 else {
            debug!("no expected sha1 given, skipping verification");
            return Ok(file);
        };

        match self.verifier.verify(&file, expected).await? {
            DigestCheck::Match => {
                debug!(sha1 = %expected, "blob digest verified");
                Ok(file)
            }
            DigestCheck::Mismatch { stderr } => {
                warn!(sha1 = %expected, error = %stderr, "blob digest mismatch");
                Err(BlobstoreError::DigestMismatch {
                    expected: expected.clone(),
                    error: stderr,
                }
                .into())
            }
        }
    }

    async fn create(&self, source: &Path, id: Option<&str>) -> Result<String> {
        self.client.create(source, id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(id).await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        self.client.exists(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::ForemanError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get(String, Option<PathBuf>, GetOptions),
        Create(PathBuf, Option<String>),
        Delete(String),
        Exists(String),
    }

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<Call>>,
        fail_with: Option<String>,
    }

    impl RecordingClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlobstoreClient for RecordingClient {
        async fn get(&self, id: &str, dest: Option<&Path>, options: &GetOptions) -> Result<PathBuf> {
            self.calls.lock().unwrap().push(Call::Get(
                id.to_string(),
                dest.map(Path::to_path_buf),
                options.clone(),
            ));
            if let Some(message) = &self.fail_with {
                return Err(ForemanError::other(message.clone()));
            }
            Ok(dest
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("downloaded-file-path")))
        }

        async fn create(&self, source: &Path, id: Option<&str>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(source.to_path_buf(), id.map(str::to_string)));
            Ok("created-id".to_string())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Delete(id.to_string()));
            Ok(())
        }

        async fn exists(&self, id: &str) -> Result<bool> {
            self.calls.lock().unwrap().push(Call::Exists(id.to_string()));
            Ok(true)
        }
    }

    struct FakeVerifier {
        check: DigestCheck,
        calls: Mutex<Vec<(PathBuf, String)>>,
    }

    impl FakeVerifier {
        fn new(check: DigestCheck) -> Self {
            Self {
                check,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(PathBuf, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DigestVerifier for FakeVerifier {
        async fn verify(&self, file: &Path, digest: &str) -> Result<DigestCheck> {
            self.calls
                .lock()
                .unwrap()
                .push((file.to_path_buf(), digest.to_string()));
            Ok(self.check.clone())
        }
    }

    fn subject(
        check: DigestCheck,
    ) -> (
        Arc<RecordingClient>,
        Arc<FakeVerifier>,
        Sha1VerifiableBlobstoreClient,
    ) {
        let client = Arc::new(RecordingClient::default());
        let verifier = Arc::new(FakeVerifier::new(check));
        let subject = Sha1VerifiableBlobstoreClient::with_verifier(client.clone(), verifier.clone());
        (client, verifier, subject)
    }

    fn mismatch(stderr: &str) -> DigestCheck {
        DigestCheck::Mismatch {
            stderr: stderr.to_string(),
        }
    }

    #[tokio::test]
    async fn test_passes_all_arguments_to_wrapped_client() {
        let (client, _verifier, subject) = subject(DigestCheck::Match);
        let options = GetOptions::with_sha1("fake-sha1").option("fake-key", "fake-value");
        let dest = PathBuf::from("fake-file-path");

        subject.get("fake-id", Some(&dest), &options).await.unwrap();

        assert_eq!(
            client.calls(),
            vec![Call::Get("fake-id".to_string(), Some(dest), options)]
        );
    }

    #[tokio::test]
    async fn test_returns_downloaded_file_when_no_destination() {
        let (_client, verifier, subject) = subject(DigestCheck::Match);
        let file = subject
            .get("fake-id", None, &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(file, PathBuf::from("downloaded-file-path"));
        assert!(verifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_propagates_wrapped_client_errors() {
        let client = Arc::new(RecordingClient {
            fail_with: Some("fake-wrapped-client-error".to_string()),
            ..RecordingClient::default()
        });
        let verifier = Arc::new(FakeVerifier::new(DigestCheck::Match));
        let subject = Sha1VerifiableBlobstoreClient::with_verifier(client, verifier.clone());

        let err = subject
            .get("fake-id", None, &GetOptions::with_sha1("abc123"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "fake-wrapped-client-error");
        assert!(verifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_matching_digest_is_accepted() {
        let (_client, verifier, subject) = subject(DigestCheck::Match);
        let dest = PathBuf::from("fake-file-path");

        subject
            .get("fake-id", Some(&dest), &GetOptions::with_sha1("expected-sha1"))
            .await
            .unwrap();

        assert_eq!(
            verifier.calls(),
            vec![(dest, "expected-sha1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mismatching_digest_is_rejected() {
        let (_client, _verifier, subject) = subject(mismatch("checksum error"));

        let err = subject
            .get("fake-id", None, &GetOptions::with_sha1("abc123"))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            ForemanError::Blobstore(BlobstoreError::DigestMismatch { expected, error })
                if expected == "abc123" && error == "checksum error"
        ));
        assert_eq!(
            err.to_string(),
            "sha1 mismatch expected=abc123, error: checksum error"
        );
    }

    #[tokio::test]
    async fn test_mismatch_ignored_without_expected_digest() {
        let (_client, verifier, subject) = subject(mismatch("checksum error"));
        subject
            .get("fake-id", None, &GetOptions::default())
            .await
            .unwrap();
        assert!(verifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nil_digest_is_rejected_before_any_call() {
        let (client, verifier, subject) = subject(DigestCheck::Match);

        let err = subject
            .get("fake-id", None, &GetOptions::with_sha1(""))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ForemanError::Blobstore(BlobstoreError::InvalidArgument(ref m)) if m == "sha1 must not be nil"
        ));
        assert!(client.calls().is_empty());
        assert!(verifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_operations_delegate() {
        let (client, _verifier, subject) = subject(DigestCheck::Match);

        assert_eq!(
            subject.create(Path::new("src"), Some("id")).await.unwrap(),
            "created-id"
        );
        subject.delete("id").await.unwrap();
        assert!(subject.exists("id").await.unwrap());

        assert_eq!(
            client.calls(),
            vec![
                Call::Create(PathBuf::from("src"), Some("id".to_string())),
                Call::Delete("id".to_string()),
                Call::Exists("id".to_string()),
            ]
        );
    }
}
