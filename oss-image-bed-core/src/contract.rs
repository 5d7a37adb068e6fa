//! # contract: object store interface for image uploads
//!
//! This module defines the single trait ([`BucketClient`]) through which the
//! upload pipeline talks to a remote bucket, plus the plain data types it
//! returns. The pipeline never depends on a concrete store: the CLI crate
//! provides an Aliyun OSS client, tests use the `mockall`-generated
//! [`MockBucketClient`].
//!
//! ## Contract
//! - `put` stores the bytes of a local file under a key.
//! - `get_bucket_info` is only used as a connectivity check.
//! - `list` returns at most `max_keys` objects under a prefix.
//! - `delete` removes a key.
//!
//! No read-after-write guarantee is assumed: a `list` right after a `put`
//! may or may not show the new object.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Errors surfaced by a [`BucketClient`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to object store failed: {0}")]
    Request(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bucket metadata returned by the connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub name: String,
    pub location: String,
    pub creation_date: Option<String>,
}

/// A single stored object as reported by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Trait for putting, listing and deleting objects in one remote bucket.
///
/// Implementations must be safe to share between concurrent upload workers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Upload the contents of `local_path` under `key`.
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Fetch bucket metadata.
    async fn get_bucket_info(&self) -> Result<BucketInfo, StoreError>;

    /// List up to `max_keys` objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ObjectSummary>, StoreError>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
