//! Blobstore commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use foreman_blobstore::{
    BlobstoreClient, GetOptions, LocalBlobstoreClient, Sha1VerifiableBlobstoreClient,
};
use foreman_core::{BlobstoreError, Config, ForemanError};

use super::{load_validated_config, runtime};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Blobstore operations
#[derive(Debug, Args)]
pub struct BlobCommand {
    #[command(subcommand)]
    pub action: BlobAction,
}

/// Blob subcommands
#[derive(Debug, Subcommand)]
pub enum BlobAction {
    /// Upload a file
    Put(BlobPutCommand),
    /// Download a blob, optionally verifying its digest
    Get(BlobGetCommand),
}

/// Upload a file
#[derive(Debug, Args)]
pub struct BlobPutCommand {
    /// File to upload
    pub file: PathBuf,

    /// Blob id (defaults to the content hash)
    #[arg(long)]
    pub id: Option<String>,
}

/// Download a blob
#[derive(Debug, Args)]
pub struct BlobGetCommand {
    /// Blob id
    pub id: String,

    /// Expected digest of the blob
    #[arg(long)]
    pub sha1: Option<String>,

    /// Destination file (defaults to a temporary file)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

impl BlobCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, _) = load_validated_config()?;
        let client = verifying_client(&config);
        let rt = runtime()?;

        match &self.action {
            BlobAction::Put(cmd) => rt.block_on(cmd.execute(cli, &client)),
            BlobAction::Get(cmd) => rt.block_on(cmd.execute(cli, &client)),
        }
    }
}

fn verifying_client(config: &Config) -> Sha1VerifiableBlobstoreClient {
    let local = LocalBlobstoreClient::new(&config.blobstore.path);
    Sha1VerifiableBlobstoreClient::new(Arc::new(local), &config.blobstore.multidigest_path)
}

impl BlobPutCommand {
    async fn execute(&self, cli: &Cli, client: &dyn BlobstoreClient) -> anyhow::Result<()> {
        info!(file = %self.file.display(), id = ?self.id, "executing blob put command");
        let id = client.create(&self.file, self.id.as_deref()).await?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "id": id }));
            }
            OutputFormat::Text => {
                if cli.quiet {
                    println!("{}", id);
                } else {
                    output::success(&format!("Stored blob {}", id));
                }
            }
        }
        Ok(())
    }
}

impl BlobGetCommand {
    async fn execute(&self, cli: &Cli, client: &dyn BlobstoreClient) -> anyhow::Result<()> {
        info!(id = %self.id, sha1 = ?self.sha1, "executing blob get command");
        let options = GetOptions {
            sha1: self.sha1.clone(),
            ..GetOptions::default()
        };

        let path = match client.get(&self.id, self.out.as_deref(), &options).await {
            Ok(path) => path,
            Err(ForemanError::Blobstore(e @ BlobstoreError::DigestMismatch { .. })) => {
                output::error(&e.to_string());
                std::process::exit(exit_codes::INTEGRITY_ERROR);
            }
            Err(e) => return Err(e.into()),
        };

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": self.id,
                    "path": path.to_string_lossy(),
                    "verified": self.sha1.is_some(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if cli.quiet {
                    println!("{}", path.display());
                } else {
                    output::success(&format!(
                        "Downloaded {} to {}",
                        self.id,
                        output::path_style().apply_to(path.display())
                    ));
                    if self.sha1.is_none() {
                        output::info("No --sha1 given, digest was not verified");
                    }
                }
            }
        }
        Ok(())
    }
}
