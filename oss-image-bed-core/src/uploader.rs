//! # uploader: validate, dedup, name and upload local images
//!
//! [`ImageUploader`] wraps a [`BucketClient`] and turns local files into
//! [`UploadResult`] records. A single upload never returns an error: every
//! failure is captured in the record so batch callers get one result per
//! input.
//!
//! ## Single upload
//! 1. Validate: file exists, extension is allow-listed, size within limit.
//! 2. Hash the content; with dedup enabled a cache hit short-circuits with
//!    the previously uploaded key and no network call.
//! 3. Generate a key (see [`crate::naming`]) and `put` it, retrying
//!    immediately up to `retry_times` attempts.
//! 4. Register the hash, build the public URL and Markdown snippet.
//!
//! ## Batches
//! [`ImageUploader::upload_batch`] runs at most `concurrency_limit` uploads at
//! once and yields results in completion order.
//! [`ImageUploader::upload_batch_with_progress`] additionally calls back as
//! each upload finishes, which the CLI uses to drive a progress bar.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{StoreConfig, UploadConfig};
use crate::contract::{BucketClient, BucketInfo, StoreError};
use crate::error::{ScanError, UploadError};
use crate::hash_cache::HashCache;
use crate::naming::{generate_key, lowercase_extension};
use crate::scan::{normalize_extensions, DirectoryScanner};

pub const DEFAULT_ALT_TEXT: &str = "image";

/// One file to upload.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub alt_text: String,
}

impl UploadTask {
    pub fn new(local_path: impl Into<PathBuf>, alt_text: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            alt_text: alt_text.into(),
        }
    }
}

/// Outcome of one upload.
///
/// `success == true` implies `error_message.is_none()` and vice versa.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub url: String,
    pub markdown: String,
    pub content_hash: String,
    pub size_bytes: u64,
    /// Set when the content was already uploaded earlier in this process.
    pub deduplicated: bool,
    pub error_message: Option<String>,
}

impl UploadResult {
    fn pending(local_path: &Path) -> Self {
        Self {
            success: false,
            local_path: local_path.to_path_buf(),
            remote_key: String::new(),
            url: String::new(),
            markdown: String::new(),
            content_hash: String::new(),
            size_bytes: 0,
            deduplicated: false,
            error_message: None,
        }
    }
}

/// A stored object together with its public URL.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectListing {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub url: String,
}

/// Uploads images to one bucket, remembering content it has already sent.
pub struct ImageUploader<C: BucketClient> {
    client: C,
    store: StoreConfig,
    upload: UploadConfig,
    allowed_formats: Vec<String>,
    cache: HashCache,
}

impl<C: BucketClient> ImageUploader<C> {
    pub fn new(client: C, store: StoreConfig, upload: UploadConfig) -> Self {
        let allowed_formats = normalize_extensions(upload.allowed_formats.as_slice());
        info!(
            bucket = %store.bucket_name,
            naming_rule = ?upload.naming_rule,
            path_prefix = %upload.path_prefix,
            dedup = upload.enable_md5_check,
            "Initialised image uploader"
        );
        Self {
            client,
            store,
            upload,
            allowed_formats,
            cache: HashCache::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Replace the key prefix template for subsequent uploads.
    pub fn set_path_prefix(&mut self, prefix: impl Into<String>) {
        self.upload.path_prefix = prefix.into();
        debug!(path_prefix = %self.upload.path_prefix, "Overrode path prefix");
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        let ext = lowercase_extension(path);
        !ext.is_empty() && self.allowed_formats.contains(&ext)
    }

    /// Public URL for `key`: the custom domain when configured, otherwise
    /// `https://{bucket}.{endpoint}/{key}`.
    pub fn public_url(&self, key: &str) -> String {
        if self.store.custom_domain.is_empty() {
            format!(
                "https://{}.{}/{}",
                self.store.bucket_name, self.store.endpoint, key
            )
        } else {
            format!("{}/{}", self.store.custom_domain.trim_end_matches('/'), key)
        }
    }

    /// Upload one file. Never fails; errors are reported in the result.
    pub async fn upload_single(&self, local_path: &Path, alt_text: &str) -> UploadResult {
        let mut result = UploadResult::pending(local_path);
        match self.try_upload(local_path, alt_text, &mut result).await {
            Ok(()) => {
                result.success = true;
                info!(
                    file = %local_path.display(),
                    key = %result.remote_key,
                    deduplicated = result.deduplicated,
                    "Upload succeeded"
                );
            }
            Err(e) => {
                error!(file = %local_path.display(), error = %e, "Upload failed");
                result.error_message = Some(e.to_string());
            }
        }
        result
    }

    async fn try_upload(
        &self,
        local_path: &Path,
        alt_text: &str,
        result: &mut UploadResult,
    ) -> Result<(), UploadError> {
        let metadata = match tokio::fs::metadata(local_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::NotFound(local_path.to_path_buf()))
            }
            Err(e) => return Err(UploadError::Io(e)),
        };

        if !metadata.is_file() || !self.is_allowed(local_path) {
            return Err(UploadError::UnsupportedFormat(lowercase_extension(local_path)));
        }

        let size = metadata.len();
        if size > self.upload.max_size_bytes() {
            return Err(UploadError::SizeLimitExceeded {
                size,
                max_mb: self.upload.max_size_mb,
            });
        }
        result.size_bytes = size;

        let (hash, cached) = self.cache.lookup(local_path).await?;
        result.content_hash = hash.clone();

        if self.upload.enable_md5_check {
            if let Some(key) = cached {
                debug!(file = %local_path.display(), key = %key, "Content already uploaded, reusing key");
                result.deduplicated = true;
                self.fill_success(result, key, alt_text);
                return Ok(());
            }
        }

        let now = Local::now();
        let key = generate_key(
            local_path,
            self.upload.naming_rule,
            &self.upload.path_prefix,
            &now,
        );
        debug!(file = %local_path.display(), key = %key, size, "Uploading");
        self.put_with_retry(&key, local_path).await?;

        if self.upload.enable_md5_check {
            self.cache.register(&hash, &key);
        }
        self.fill_success(result, key, alt_text);
        Ok(())
    }

    fn fill_success(&self, result: &mut UploadResult, key: String, alt_text: &str) {
        let url = self.public_url(&key);
        result.markdown = format!("![{alt_text}]({url})");
        result.url = url;
        result.remote_key = key;
    }

    async fn put_with_retry(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let attempts = self.upload.retry_times.max(1);
        let mut attempt = 1;
        loop {
            match self.client.put(key, local_path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(key, attempt, attempts, error = %e, "Put failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Upload every task with at most `concurrency_limit` in flight.
    ///
    /// Returns exactly one result per task, in completion order.
    pub async fn upload_batch(
        &self,
        tasks: Vec<UploadTask>,
        concurrency_limit: usize,
    ) -> Vec<UploadResult> {
        self.upload_batch_with_progress(tasks, concurrency_limit, |_| {})
            .await
    }

    /// Like [`upload_batch`](Self::upload_batch), calling `on_finished` once
    /// per task as soon as its result is available.
    pub async fn upload_batch_with_progress<F>(
        &self,
        tasks: Vec<UploadTask>,
        concurrency_limit: usize,
        mut on_finished: F,
    ) -> Vec<UploadResult>
    where
        F: FnMut(&UploadResult),
    {
        let total = tasks.len();
        let limit = concurrency_limit.max(1);
        info!(total, concurrency_limit = limit, "Starting batch upload");

        let results: Vec<UploadResult> = stream::iter(tasks)
            .map(|task| async move { self.upload_single(&task.local_path, &task.alt_text).await })
            .buffer_unordered(limit)
            .inspect(|r| {
                debug!(file = %r.local_path.display(), success = r.success, "Batch item finished");
                on_finished(r);
            })
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            total,
            succeeded,
            failed = total - succeeded,
            "Batch upload complete"
        );
        results
    }

    /// One task per allow-listed image under `root`.
    pub fn directory_tasks(&self, root: &Path, recursive: bool) -> Result<Vec<UploadTask>, ScanError> {
        Ok(
            DirectoryScanner::new(root, recursive, self.allowed_formats.as_slice())?
                .map(|path| UploadTask::new(path, DEFAULT_ALT_TEXT))
                .collect(),
        )
    }

    /// Scan `root` for allow-listed images and upload them as one batch.
    pub async fn upload_from_directory(
        &self,
        root: &Path,
        recursive: bool,
    ) -> Result<Vec<UploadResult>, ScanError> {
        let tasks = self.directory_tasks(root, recursive)?;

        if tasks.is_empty() {
            warn!(root = %root.display(), "No images found in directory");
            return Ok(Vec::new());
        }
        info!(root = %root.display(), count = tasks.len(), "Found images to upload");
        Ok(self.upload_batch(tasks, self.upload.concurrent_limit).await)
    }

    pub async fn bucket_info(&self) -> Result<BucketInfo, StoreError> {
        self.client.get_bucket_info().await
    }

    /// Connectivity check.
    pub async fn check_connection(&self) -> bool {
        match self.client.get_bucket_info().await {
            Ok(info) => {
                info!(bucket = %info.name, location = %info.location, "Connection check succeeded");
                true
            }
            Err(e) => {
                error!(error = %e, "Connection check failed");
                false
            }
        }
    }

    pub async fn list_objects(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectListing>, StoreError> {
        let objects = self.client.list(prefix, max_keys).await?;
        debug!(prefix, count = objects.len(), "Listed objects");
        Ok(objects
            .into_iter()
            .map(|obj| ObjectListing {
                url: self.public_url(&obj.key),
                key: obj.key,
                size: obj.size,
                last_modified: obj.last_modified,
            })
            .collect())
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client.delete(key).await?;
        info!(key, "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockBucketClient;

    fn uploader(store: StoreConfig) -> ImageUploader<MockBucketClient> {
        ImageUploader::new(MockBucketClient::new(), store, UploadConfig::default())
    }

    #[test]
    fn default_url_uses_bucket_and_endpoint() {
        let up = uploader(StoreConfig {
            endpoint: "oss-cn-hangzhou.aliyuncs.com".into(),
            bucket_name: "pics".into(),
            custom_domain: String::new(),
        });
        assert_eq!(
            up.public_url("2024/a.png"),
            "https://pics.oss-cn-hangzhou.aliyuncs.com/2024/a.png"
        );
    }

    #[test]
    fn custom_domain_trailing_slash_is_trimmed() {
        let up = uploader(StoreConfig {
            endpoint: "e".into(),
            bucket_name: "b".into(),
            custom_domain: "https://img.example.com/".into(),
        });
        assert_eq!(up.public_url("a.png"), "https://img.example.com/a.png");
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let up = uploader(StoreConfig::default());
        assert!(up.is_allowed(Path::new("x.PNG")));
        assert!(!up.is_allowed(Path::new("x.tiff")));
        assert!(!up.is_allowed(Path::new("png")));
    }
}
