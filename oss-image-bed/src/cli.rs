//! # oss-image CLI
//!
//! Command parsing and orchestration for the `oss-image` binary. Upload,
//! dedup and Markdown rewriting live in `oss-image-bed-core`; this module
//! only loads configuration, builds the OSS client and prints results.
//!
//! Command output goes to stdout, logs go to stderr.
//!
//! For programmatic or integration use, call [`run`] with a constructed [`Cli`].
use crate::client::OssClient;
use crate::progress::BatchProgress;
use crate::load_config::{load_config, resolve_config_path, user_config_path, write_default_config, CliConfig, CONFIG_FILE_NAME};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use oss_image_bed_core::format::format_size;
use oss_image_bed_core::markdown::{MarkdownRewriter, RewriteReport, RewriteStatus};
use oss_image_bed_core::uploader::ImageUploader;
use std::path::{Path, PathBuf};

/// Upload local images to Aliyun OSS and rewrite Markdown to reference them.
#[derive(Parser)]
#[clap(
    name = "oss-image",
    version,
    about = "Upload local images to Aliyun OSS and generate Markdown links"
)]
pub struct Cli {
    /// Path to the YAML config file (defaults to ./config.yaml, then ~/.oss_image_bed/config.yaml)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file
    Init {
        /// Create ./config.yaml instead of ~/.oss_image_bed/config.yaml
        #[clap(long)]
        project: bool,
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },
    /// Upload a single image
    Upload {
        image: PathBuf,
        /// Alt text for the Markdown link
        #[clap(long, default_value = "image")]
        alt: String,
        /// Store under this folder instead of the configured prefix ("" for the bucket root)
        #[clap(long)]
        folder: Option<String>,
        /// Print the result as JSON
        #[clap(long)]
        json: bool,
    },
    /// Upload every image in a directory
    UploadBatch {
        dir: PathBuf,
        /// Only scan the top-level directory
        #[clap(long)]
        no_recursive: bool,
        #[clap(long)]
        folder: Option<String>,
    },
    /// Replace local images in a Markdown file or directory with uploaded links
    Convert { path: PathBuf },
    /// Inspect the configuration
    Config {
        #[clap(subcommand)]
        action: ConfigAction,
    },
    /// List objects in the bucket
    List {
        #[clap(long, default_value = "")]
        prefix: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete an object from the bucket
    Delete {
        key: String,
        /// Confirm the deletion
        #[clap(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration with secrets masked
    Show,
    /// Check that the bucket is reachable
    Test,
}

/// `--folder` value as a key prefix: non-empty values end with `/`.
pub fn normalize_folder(folder: &str) -> String {
    if folder.is_empty() || folder.ends_with('/') {
        folder.to_string()
    } else {
        format!("{folder}/")
    }
}

fn load(config: Option<&Path>) -> Result<CliConfig> {
    let path = resolve_config_path(config)?;
    load_config(path)
}

fn build_uploader(config: &CliConfig) -> Result<ImageUploader<OssClient>> {
    let client = OssClient::new(config).context("Failed to construct OSS client")?;
    Ok(ImageUploader::new(
        client,
        config.core.store.clone(),
        config.core.upload.clone(),
    ))
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { project, force } => {
            let target = if project {
                PathBuf::from(CONFIG_FILE_NAME)
            } else {
                user_config_path().ok_or_else(|| anyhow!("HOME is not set; use --project"))?
            };
            write_default_config(&target, force)?;
            println!("Config file created: {}", target.display());
            println!("Fill in the required fields:");
            for field in ["access_key_id", "access_key_secret", "endpoint", "bucket_name"] {
                println!("  - aliyun.{field}");
            }
            Ok(())
        }
        Commands::Upload {
            image,
            alt,
            folder,
            json,
        } => {
            let config = load(config_path)?;
            let mut uploader = build_uploader(&config)?;
            if let Some(folder) = folder {
                uploader.set_path_prefix(normalize_folder(&folder));
            }
            tracing::info!(command = "upload", image = %image.display(), "Uploading image");
            let result = uploader.upload_single(&image, &alt).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.success {
                println!("URL: {}", result.url);
                println!("Markdown: {}", result.markdown);
                println!("Size: {}", format_size(result.size_bytes));
            }
            if !result.success {
                bail!(
                    "upload failed: {}",
                    result.error_message.unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::UploadBatch {
            dir,
            no_recursive,
            folder,
        } => {
            let config = load(config_path)?;
            let mut uploader = build_uploader(&config)?;
            if let Some(folder) = folder {
                uploader.set_path_prefix(normalize_folder(&folder));
            }
            let tasks = uploader
                .directory_tasks(&dir, !no_recursive)
                .with_context(|| format!("Failed to scan {}", dir.display()))?;
            if tasks.is_empty() {
                println!("No images found in {}", dir.display());
                return Ok(());
            }

            let mut progress = BatchProgress::new(tasks.len());
            let results = uploader
                .upload_batch_with_progress(tasks, config.core.upload.concurrent_limit, |r| {
                    progress.on_result(r)
                })
                .await;
            progress.finish();

            let succeeded = results.iter().filter(|r| r.success).count();
            let failed = results.len() - succeeded;
            println!("Done: {succeeded} succeeded, {failed} failed");
            for r in results.iter().filter(|r| !r.success) {
                println!(
                    "  - {}: {}",
                    r.local_path.display(),
                    r.error_message.as_deref().unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Convert { path } => {
            let config = load(config_path)?;
            let uploader = build_uploader(&config)?;
            let rewriter = MarkdownRewriter::new(&uploader, config.core.markdown.clone())?;

            if path.is_file() {
                let report = rewriter.process_file(&path).await;
                print_report(&report);
                if report.status == RewriteStatus::Failed {
                    bail!(
                        "conversion failed: {}",
                        report.error_message.unwrap_or_default()
                    );
                }
            } else if path.is_dir() {
                let summary = rewriter.process_directory(&path).await?;
                for report in &summary.files {
                    print_report(report);
                }
                println!(
                    "Processed {} files: {} images uploaded, {} failed",
                    summary.files.len(),
                    summary.total_processed,
                    summary.total_failed
                );
            } else {
                bail!("invalid path: {}", path.display());
            }
            Ok(())
        }
        Commands::Config { action } => {
            let config = load(config_path)?;
            match action {
                ConfigAction::Show => {
                    show_config(&config);
                    Ok(())
                }
                ConfigAction::Test => {
                    let uploader = build_uploader(&config)?;
                    let info = uploader
                        .bucket_info()
                        .await
                        .context("connection failed, check the configuration")?;
                    println!("Connection OK");
                    println!("  Name: {}", info.name);
                    println!("  Location: {}", info.location);
                    println!(
                        "  Created: {}",
                        info.creation_date.as_deref().unwrap_or("unknown")
                    );
                    Ok(())
                }
            }
        }
        Commands::List { prefix, limit } => {
            let config = load(config_path)?;
            let uploader = build_uploader(&config)?;
            let objects = uploader.list_objects(&prefix, limit).await?;
            if objects.is_empty() {
                println!("No objects found");
                return Ok(());
            }
            println!("{:<50}  {:>10}  {}", "KEY", "SIZE", "LAST MODIFIED");
            for obj in &objects {
                let modified = obj
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!(
                    "{:<50}  {:>10}  {}",
                    key_tail(&obj.key, 50),
                    format_size(obj.size),
                    modified
                );
            }
            println!("{} objects", objects.len());
            Ok(())
        }
        Commands::Delete { key, yes } => {
            if !yes {
                bail!("refusing to delete {key} without --yes");
            }
            let config = load(config_path)?;
            let uploader = build_uploader(&config)?;
            uploader
                .delete_object(&key)
                .await
                .with_context(|| format!("Failed to delete {key}"))?;
            println!("Deleted: {key}");
            Ok(())
        }
    }
}

/// Last `max` characters of `key`.
fn key_tail(key: &str, max: usize) -> &str {
    let count = key.chars().count();
    if count <= max {
        return key;
    }
    let start = key
        .char_indices()
        .nth(count - max)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &key[start..]
}

fn print_report(report: &RewriteReport) {
    match report.status {
        RewriteStatus::Rewritten => {
            println!(
                "{}: {} uploaded, {} failed",
                report.file_path.display(),
                report.processed,
                report.failed
            );
            if let Some(backup) = &report.backup_path {
                println!("  backup: {}", backup.display());
            }
        }
        RewriteStatus::NoLocalImages => {
            println!("{}: no local images", report.file_path.display());
        }
        RewriteStatus::Failed => {
            println!(
                "{}: {}",
                report.file_path.display(),
                report.error_message.as_deref().unwrap_or("failed")
            );
        }
    }
}

fn show_config(config: &CliConfig) {
    let store = &config.core.store;
    let upload = &config.core.upload;
    println!("[aliyun]");
    println!("  access_key_id: {}", config.credentials.masked_key_id());
    println!("  endpoint: {}", store.endpoint);
    println!("  bucket_name: {}", store.bucket_name);
    if !store.custom_domain.is_empty() {
        println!("  custom_domain: {}", store.custom_domain);
    }
    println!("[upload]");
    println!("  path_prefix: {}", upload.path_prefix);
    println!("  naming_rule: {}", String::from(upload.naming_rule));
    println!(
        "  md5_check: {}",
        if upload.enable_md5_check { "enabled" } else { "disabled" }
    );
    println!("  concurrent_limit: {}", upload.concurrent_limit);
    println!("\nConfig file: {}", config.source.display());
}
