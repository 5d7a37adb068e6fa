//! Content hashing and the hash → remote key dedup map.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a file, read in fixed-size chunks.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Maps content hashes to the remote key the content was uploaded under.
///
/// Shared by every worker of one uploader. Two workers hashing the same
/// content before either registers will both miss and both upload; the map
/// only guarantees it is never corrupted.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: Mutex<HashMap<String, String>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(hash)
            .cloned()
    }

    /// Record `key` for `hash`. The first registration wins.
    pub fn register(&self, hash: &str, key: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .entry(hash.to_string())
            .or_insert_with(|| key.to_string());
        debug!(hash, key, cached = entries.len(), "Registered content hash");
    }

    /// Hash `path` and look it up.
    ///
    /// Returns the hash together with the cached key, if any. A `None` key
    /// means the caller should upload and then [`register`](Self::register).
    pub async fn lookup(&self, path: &Path) -> std::io::Result<(String, Option<String>)> {
        let hash = hash_file(path).await?;
        let key = self.get(&hash);
        Ok((hash, key))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
