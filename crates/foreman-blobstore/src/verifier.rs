//! Download digest verification

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use foreman_core::{BlobstoreError, Result};

/// Outcome of a digest check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestCheck {
    /// The file matches the expected digest
    Match,
    /// The file does not match; carries the verifier's diagnostics
    Mismatch { stderr: String },
}

/// Checks a file against an expected digest
#[async_trait]
pub trait DigestVerifier: Send + Sync {
    async fn verify(&self, file: &Path, digest: &str) -> Result<DigestCheck>;
}

/// Verifier that shells out to the multi-digest tool:
/// `<path> verify-multi-digest <file> <digest>`
#[derive(Debug, Clone)]
pub struct MultidigestVerifier {
    path: PathBuf,
}

impl MultidigestVerifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the verification tool
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DigestVerifier for MultidigestVerifier {
    async fn verify(&self, file: &Path, digest: &str) -> Result<DigestCheck> {
        debug!(
            "Running {} verify-multi-digest {} {}",
            self.path.display(),
            file.display(),
            digest
        );

        let output = Command::new(&self.path)
            .arg("verify-multi-digest")
            .arg(file)
            .arg(digest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BlobstoreError::VerifierFailed {
                command: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(DigestCheck::Match);
        }

        Ok(DigestCheck::Mismatch {
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::ForemanError;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("verify-multidigest");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_match() {
        let temp = TempDir::new().unwrap();
        let tool = script(
            temp.path(),
            r#"[ "$1" = "verify-multi-digest" ] && [ "$3" = "abc123" ] || exit 2"#,
        );
        let verifier = MultidigestVerifier::new(tool);

        let check = verifier
            .verify(&temp.path().join("blob"), "abc123")
            .await
            .unwrap();
        assert_eq!(check, DigestCheck::Match);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_mismatch_with_stderr() {
        let temp = TempDir::new().unwrap();
        let tool = script(temp.path(), "echo foo; echo 'checksum error' >&2; exit 1");
        let verifier = MultidigestVerifier::new(tool);

        let check = verifier
            .verify(&temp.path().join("blob"), "abc123")
            .await
            .unwrap();
        assert_eq!(
            check,
            DigestCheck::Mismatch {
                stderr: "checksum error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let verifier = MultidigestVerifier::new("/nonexistent/verify-multidigest");
        let err = verifier
            .verify(Path::new("blob"), "abc123")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForemanError::Blobstore(BlobstoreError::VerifierFailed { .. })
        ));
    }
}
