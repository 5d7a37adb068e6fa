//! # Aliyun OSS client
//!
//! [`OssClient`] implements the core [`BucketClient`] trait on top of the
//! `object_store` S3 backend, talking to OSS through its S3-compatible API
//! with virtual-hosted addressing (`https://{bucket}.{endpoint}`).
//!
//! `object_store` lists by path segment, so a `list` prefix that does not end
//! in `/` is listed from its parent directory and filtered by string prefix.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{Error as ObjectStoreError, ObjectStoreExt, PutPayload};
use oss_image_bed_core::contract::{BucketClient, BucketInfo, ObjectSummary, StoreError};
use std::path::Path;
use tracing::{debug, error, info};

use crate::load_config::CliConfig;

pub struct OssClient {
    store: AmazonS3,
    bucket: String,
    region: String,
}

/// Region id from an OSS endpoint, e.g. `oss-cn-hangzhou.aliyuncs.com` gives
/// `oss-cn-hangzhou`.
pub fn region_from_endpoint(endpoint: &str) -> String {
    let host = endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    host.split('.').next().unwrap_or_default().to_string()
}

/// Base URL the S3 client sends requests to.
pub fn bucket_endpoint(bucket: &str, endpoint: &str) -> String {
    let (scheme, host) = match endpoint.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("https", endpoint),
    };
    format!("{scheme}://{bucket}.{}", host.trim_end_matches('/'))
}

impl OssClient {
    pub fn new(config: &CliConfig) -> Result<Self, StoreError> {
        let store_config = &config.core.store;
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| region_from_endpoint(&store_config.endpoint));
        let url = bucket_endpoint(&store_config.bucket_name, &store_config.endpoint);

        let store = AmazonS3Builder::new()
            .with_access_key_id(&config.credentials.access_key_id)
            .with_secret_access_key(&config.credentials.access_key_secret)
            .with_region(region.clone())
            .with_bucket_name(store_config.bucket_name.clone())
            .with_endpoint(url.clone())
            .with_virtual_hosted_style_request(true)
            .with_allow_http(url.starts_with("http://"))
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        info!(
            bucket = %store_config.bucket_name,
            region = %region,
            endpoint = %url,
            "Initialised OSS client"
        );
        Ok(Self {
            store,
            bucket: store_config.bucket_name.clone(),
            region,
        })
    }
}

fn map_store_error(key: &str, e: ObjectStoreError) -> StoreError {
    match e {
        ObjectStoreError::NotFound { .. } => StoreError::NotFound(key.to_string()),
        other => StoreError::Request(other.to_string()),
    }
}

/// Split a raw key prefix into the directory to list and the string filter
/// applied to keys under it.
fn list_location(prefix: &str) -> Option<ObjectPath> {
    let dir = match prefix.rfind('/') {
        Some(idx) => &prefix[..idx],
        None => "",
    };
    if dir.is_empty() {
        None
    } else {
        Some(ObjectPath::from(dir))
    }
}

#[async_trait]
impl BucketClient for OssClient {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();
        let location = ObjectPath::from(key);
        let start = std::time::Instant::now();

        self.store
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    bucket = %self.bucket,
                    key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "OSS put failed"
                );
                map_store_error(key, e)
            })?;

        debug!(
            bucket = %self.bucket,
            key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "OSS put successful"
        );
        Ok(())
    }

    async fn get_bucket_info(&self) -> Result<BucketInfo, StoreError> {
        self.list("", 1).await?;
        Ok(BucketInfo {
            name: self.bucket.clone(),
            location: self.region.clone(),
            creation_date: None,
        })
    }

    async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ObjectSummary>, StoreError> {
        let location = list_location(prefix);
        let objects: Vec<ObjectSummary> =
            object_store::ObjectStore::list(&self.store, location.as_ref())
                .map_err(|e| map_store_error(prefix, e))
                .try_filter(|meta| futures::future::ready(meta.location.as_ref().starts_with(prefix)))
                .take(max_keys)
                .map_ok(|meta| ObjectSummary {
                    key: meta.location.to_string(),
                    size: meta.size,
                    last_modified: Some(meta.last_modified),
                })
                .try_collect()
                .await?;
        debug!(bucket = %self.bucket, prefix, count = objects.len(), "OSS list complete");
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let location = ObjectPath::from(key);
        self.store.delete(&location).await.map_err(|e| {
            error!(error = %e, bucket = %self.bucket, key, "OSS delete failed");
            map_store_error(key, e)
        })?;
        Ok(())
    }
}
