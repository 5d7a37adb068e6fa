/// `load_config` module: reads the YAML config file, injects secrets from the
/// environment and maps it into the core's typed [`Config`].
///
/// # Responsibilities
/// - Locate the config file when `--config` is not given
/// - Parse the `aliyun`, `upload` and `markdown` sections
/// - Let `OSS_ACCESS_KEY_ID` / `OSS_ACCESS_KEY_SECRET` override the file's keys
/// - Reject missing or placeholder (`your-...`) required fields with a message
///   naming the field and the file
///
/// All errors are `anyhow::Error` and surface at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use oss_image_bed_core::config::{Config, MarkdownConfig, StoreConfig, UploadConfig};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const USER_CONFIG_DIR: &str = ".oss_image_bed";
pub const ACCESS_KEY_ID_ENV: &str = "OSS_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_ENV: &str = "OSS_ACCESS_KEY_SECRET";

const PLACEHOLDER_PREFIX: &str = "your-";

/// Template written by `oss-image init`.
pub const DEFAULT_CONFIG_YAML: &str = r#"# oss-image configuration

aliyun:
  # Required. May also be set through OSS_ACCESS_KEY_ID / OSS_ACCESS_KEY_SECRET.
  access_key_id: "your-access-key-id"
  access_key_secret: "your-access-key-secret"
  # Region endpoint, e.g. oss-cn-hangzhou.aliyuncs.com
  endpoint: "oss-cn-guangzhou.aliyuncs.com"
  bucket_name: "your-bucket-name"
  # Optional, e.g. https://img.example.com
  custom_domain: ""

upload:
  # Supports {year}, {month} and {day}.
  path_prefix: "{year}{month}{day}/"
  # uuid | timestamp | original
  naming_rule: "uuid"
  enable_md5_check: true
  concurrent_limit: 5
  retry_times: 3
  allowed_formats: [".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".bmp"]
  max_size_mb: 10

markdown:
  backup_original: true
  backup_suffix: ".bak"
  image_alt_text: "image"
  recursive: true
"#;

#[derive(Debug, Deserialize)]
pub struct AliyunSection {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub custom_domain: String,
    /// Signing region. Derived from the endpoint when absent.
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl Credentials {
    /// First eight characters of the key id followed by `...`.
    pub fn masked_key_id(&self) -> String {
        let head: String = self.access_key_id.chars().take(8).collect();
        format!("{head}...")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.masked_key_id())
            .field("access_key_secret", &"***")
            .finish()
    }
}

/// Fully loaded CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub core: Config,
    pub credentials: Credentials,
    pub region: Option<String>,
    /// File the configuration was read from.
    pub source: PathBuf,
}

/// Candidate config locations, in lookup order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = user_config_path() {
        paths.push(home);
    }
    paths
}

/// `$HOME/.oss_image_bed/config.yaml`, if `HOME` is set.
pub fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME))
}

/// Pick the explicit path when given, otherwise the first existing default.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let candidates = default_config_paths();
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            error!(?candidates, "No configuration file found");
            anyhow!(
                "no configuration file found (looked in {}); run 'oss-image init' first",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}

/// Loads a YAML config file and injects secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!(
                "Failed to read config file {}: {}; run 'oss-image init' to create one",
                path_ref.display(),
                e
            ));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        aliyun: Option<AliyunSection>,
        #[serde(default)]
        upload: UploadConfig,
        #[serde(default)]
        markdown: MarkdownConfig,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut aliyun = raw.aliyun.ok_or_else(|| {
        anyhow!(
            "config file {} is missing the 'aliyun' section",
            path_ref.display()
        )
    })?;

    if let Ok(id) = std::env::var(ACCESS_KEY_ID_ENV) {
        if !id.is_empty() {
            info!(env = ACCESS_KEY_ID_ENV, "Access key id taken from environment");
            aliyun.access_key_id = id;
        }
    }
    if let Ok(secret) = std::env::var(ACCESS_KEY_SECRET_ENV) {
        if !secret.is_empty() {
            info!(env = ACCESS_KEY_SECRET_ENV, "Access key secret taken from environment");
            aliyun.access_key_secret = secret;
        }
    }

    validate(&aliyun, path_ref)?;

    if raw.upload.concurrent_limit == 0 {
        warn!("upload.concurrent_limit is 0, using 1");
    }

    let core = Config {
        store: StoreConfig {
            endpoint: aliyun.endpoint,
            bucket_name: aliyun.bucket_name,
            custom_domain: aliyun.custom_domain,
        },
        upload: raw.upload,
        markdown: raw.markdown,
    };
    core.trace_loaded();

    Ok(CliConfig {
        core,
        credentials: Credentials {
            access_key_id: aliyun.access_key_id,
            access_key_secret: aliyun.access_key_secret,
        },
        region: aliyun.region.filter(|r| !r.is_empty()),
        source: path_ref.to_path_buf(),
    })
}

fn validate(aliyun: &AliyunSection, path: &Path) -> Result<()> {
    let required = [
        ("access_key_id", &aliyun.access_key_id),
        ("access_key_secret", &aliyun.access_key_secret),
        ("endpoint", &aliyun.endpoint),
        ("bucket_name", &aliyun.bucket_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() || value.starts_with(PLACEHOLDER_PREFIX) {
            error!(field, config_path = ?path, "Required config field missing");
            return Err(anyhow!(
                "please fill in 'aliyun.{field}' in config file {}",
                path.display()
            ));
        }
    }
    Ok(())
}

/// Write [`DEFAULT_CONFIG_YAML`] to `path`, creating parent directories.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "config file already exists: {} (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_YAML)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    info!(config_path = ?path, "Wrote default configuration");
    Ok(())
}
