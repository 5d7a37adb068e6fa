use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::naming::NamingRule;

pub const DEFAULT_ALLOWED_FORMATS: &[&str] =
    &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".bmp"];

/// Everything the upload pipeline and the Markdown rewriter read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub upload: UploadConfig,
    pub markdown: MarkdownConfig,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.store.bucket_name,
            endpoint = %self.store.endpoint,
            naming_rule = ?self.upload.naming_rule,
            concurrent_limit = self.upload.concurrent_limit,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// Public addressing of the bucket. Credentials are not part of the core config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoint: String,
    pub bucket_name: String,
    #[serde(default)]
    pub custom_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub path_prefix: String,
    pub naming_rule: NamingRule,
    pub enable_md5_check: bool,
    pub concurrent_limit: usize,
    pub retry_times: u32,
    pub allowed_formats: Vec<String>,
    pub max_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            naming_rule: NamingRule::Uuid,
            enable_md5_check: true,
            concurrent_limit: 5,
            retry_times: 3,
            allowed_formats: DEFAULT_ALLOWED_FORMATS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_size_mb: 10,
        }
    }
}

impl UploadConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub backup_original: bool,
    pub backup_suffix: String,
    pub image_alt_text: String,
    pub recursive: bool,
    /// Overrides the built-in local image pattern. Group 1 is the alt text,
    /// group 2 the path.
    pub local_image_pattern: Option<String>,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            backup_original: true,
            backup_suffix: ".bak".to_string(),
            image_alt_text: "image".to_string(),
            recursive: true,
            local_image_pattern: None,
        }
    }
}
