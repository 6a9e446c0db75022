//! Foreman Blobstore - blob storage clients
//!
//! [`BlobstoreClient`] is the storage interface; [`LocalBlobstoreClient`]
//! keeps blobs in a directory and [`Sha1VerifiableBlobstoreClient`] wraps any
//! client to verify downloads against an expected digest.

pub mod client;
pub mod local;
pub mod sha1_verifiable;
pub mod verifier;

pub use client::{BlobstoreClient, GetOptions};
pub use local::LocalBlobstoreClient;
pub use sha1_verifiable::Sha1VerifiableBlobstoreClient;
pub use verifier::{DigestCheck, DigestVerifier, MultidigestVerifier};
