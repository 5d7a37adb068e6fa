//! # markdown: replace local image references with uploaded URLs
//!
//! For each document:
//!   - local references `![alt](path)` are extracted with a regex, skipping
//!     anything whose path starts with `http` and anything that does not
//!     resolve to an existing file;
//!   - each reference is uploaded in turn through the [`ImageUploader`];
//!   - if at least one upload succeeded the original is backed up (when
//!     enabled) and the document is rewritten through a temp file + rename.
//!
//! Nothing is written when no upload succeeds, and a failed backup aborts the
//! rewrite before the document is touched.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::MarkdownConfig;
use crate::contract::BucketClient;
use crate::error::{RewriteError, ScanError};
use crate::naming::lowercase_extension;
use crate::scan::DirectoryScanner;
use crate::uploader::ImageUploader;

/// Group 1 is the alt text, group 2 the path.
pub const DEFAULT_LOCAL_IMAGE_PATTERN: &str = r"!\[([^\]]*)\]\(([^)]+)\)";

/// Extensions accepted by [`MarkdownRewriter::process_file`], any case.
pub const MARKDOWN_EXTENSIONS: &[&str] = &[".md", ".markdown"];

/// Extension enumerated by [`MarkdownRewriter::process_directory`], exact case.
pub const DIRECTORY_MARKDOWN_EXTENSION: &str = "md";

/// A local image reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// The full matched text, e.g. `![logo](./img/logo.png)`.
    pub raw: String,
    pub alt_text: String,
    /// Absolute, canonical path of the referenced file.
    pub path: PathBuf,
    /// How many times `raw` appears in the document.
    pub occurrences: usize,
}

/// Raw matched text → replacement Markdown, in document order.
pub type RewriteMap = Vec<(String, String)>;

/// Extract local image references from `content`.
///
/// Relative paths resolve against `base_dir`. Paths are percent-decoded
/// first. References whose file does not exist are dropped. Repeated
/// identical matches are reported once, with their count in `occurrences`.
pub fn extract_local_images(pattern: &Regex, content: &str, base_dir: &Path) -> Vec<ImageReference> {
    let mut seen: HashMap<&str, Option<usize>> = HashMap::new();
    let mut images: Vec<ImageReference> = Vec::new();

    for caps in pattern.captures_iter(content) {
        let (Some(full), Some(raw_path)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let raw_path = raw_path.as_str();
        if raw_path.starts_with("http") {
            continue;
        }
        let raw = full.as_str();
        if let Some(index) = seen.get(raw) {
            if let Some(i) = index {
                images[*i].occurrences += 1;
            }
            continue;
        }

        let decoded: Cow<'_, str> = urlencoding::decode(raw_path).unwrap_or(Cow::Borrowed(raw_path));
        let candidate = Path::new(decoded.as_ref());
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base_dir.join(candidate)
        };

        match candidate.canonicalize() {
            Ok(path) => {
                seen.insert(raw, Some(images.len()));
                images.push(ImageReference {
                    raw: raw.to_string(),
                    alt_text: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    path,
                    occurrences: 1,
                });
            }
            Err(_) => {
                seen.insert(raw, None);
                debug!(path = %candidate.display(), "Referenced image does not exist, skipping")
            }
        }
    }
    images
}

/// Replace every occurrence of each raw match, treating it as literal text.
pub fn apply_rewrites(content: &str, rewrites: &RewriteMap) -> String {
    rewrites
        .iter()
        .fold(content.to_string(), |text, (old, new)| text.replace(old.as_str(), new))
}

/// Terminal state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    Rewritten,
    NoLocalImages,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub file_path: PathBuf,
    pub status: RewriteStatus,
    /// Image references rewritten, counted per occurrence in the document.
    pub processed: usize,
    /// Image references left untouched because their upload failed, per occurrence.
    pub failed: usize,
    pub backup_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl RewriteReport {
    fn new(file_path: &Path) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
            status: RewriteStatus::Failed,
            processed: 0,
            failed: 0,
            backup_path: None,
            error_message: None,
        }
    }

    /// True for both a rewrite and a document without local images.
    pub fn is_success(&self) -> bool {
        self.status != RewriteStatus::Failed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryReport {
    pub files: Vec<RewriteReport>,
    pub total_processed: usize,
    pub total_failed: usize,
}

/// Rewrites Markdown documents using a shared [`ImageUploader`].
pub struct MarkdownRewriter<'a, C: BucketClient> {
    uploader: &'a ImageUploader<C>,
    config: MarkdownConfig,
    pattern: Regex,
}

impl<'a, C: BucketClient> MarkdownRewriter<'a, C> {
    pub fn new(uploader: &'a ImageUploader<C>, config: MarkdownConfig) -> Result<Self, RewriteError> {
        let pattern = Regex::new(
            config
                .local_image_pattern
                .as_deref()
                .unwrap_or(DEFAULT_LOCAL_IMAGE_PATTERN),
        )?;
        Ok(Self {
            uploader,
            config,
            pattern,
        })
    }

    pub fn backup_path_for(&self, path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(&self.config.backup_suffix);
        PathBuf::from(name)
    }

    /// Process one document. Never fails; the outcome is in the report.
    pub async fn process_file(&self, path: &Path) -> RewriteReport {
        let mut report = RewriteReport::new(path);
        if let Err(e) = self.try_process_file(path, &mut report).await {
            error!(file = %path.display(), error = %e, "Markdown rewrite failed");
            report.status = RewriteStatus::Failed;
            report.error_message = Some(e.to_string());
        }
        report
    }

    async fn try_process_file(&self, path: &Path, report: &mut RewriteReport) -> Result<(), RewriteError> {
        let path = path
            .canonicalize()
            .map_err(|_| RewriteError::NotFound(path.to_path_buf()))?;
        report.file_path = path.clone();

        if !MARKDOWN_EXTENSIONS.contains(&lowercase_extension(&path).as_str()) {
            return Err(RewriteError::NotMarkdown(path));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let images = extract_local_images(&self.pattern, &content, base_dir);

        if images.is_empty() {
            info!(file = %path.display(), "No local image references found");
            report.status = RewriteStatus::NoLocalImages;
            report.error_message = Some("no local image references found".to_string());
            return Ok(());
        }
        info!(file = %path.display(), count = images.len(), "Found local image references");

        let mut rewrites: RewriteMap = Vec::new();
        for image in &images {
            let alt = if image.alt_text.is_empty() {
                self.config.image_alt_text.as_str()
            } else {
                image.alt_text.as_str()
            };
            let result = self.uploader.upload_single(&image.path, alt).await;
            if result.success {
                debug!(image = %image.path.display(), url = %result.url, "Image uploaded");
                rewrites.push((image.raw.clone(), result.markdown));
                report.processed += image.occurrences;
            } else {
                warn!(
                    image = %image.path.display(),
                    error = result.error_message.as_deref().unwrap_or_default(),
                    "Image upload failed, leaving reference untouched"
                );
                report.failed += image.occurrences;
            }
        }

        if rewrites.is_empty() {
            return Err(RewriteError::NoUploadsSucceeded);
        }

        if self.config.backup_original {
            let backup = self.backup_path_for(&path);
            tokio::fs::copy(&path, &backup)
                .await
                .map_err(|source| RewriteError::BackupFailed {
                    path: backup.clone(),
                    source,
                })?;
            debug!(backup = %backup.display(), "Backed up original document");
            report.backup_path = Some(backup);
        }

        let rewritten = apply_rewrites(&content, &rewrites);
        write_replacing(&path, &rewritten)?;

        report.status = RewriteStatus::Rewritten;
        info!(
            file = %path.display(),
            processed = report.processed,
            failed = report.failed,
            "Markdown rewrite complete"
        );
        Ok(())
    }

    /// Process every `*.md` file under `root`, continuing past failures.
    ///
    /// Unlike [`process_file`](Self::process_file), the extension match is
    /// case-sensitive and `.markdown` files are not picked up.
    pub async fn process_directory(&self, root: &Path) -> Result<DirectoryReport, ScanError> {
        let mut files: Vec<PathBuf> = DirectoryScanner::new(
            root,
            self.config.recursive,
            &[DIRECTORY_MARKDOWN_EXTENSION],
        )?
        .filter(|path| path.extension() == Some(OsStr::new(DIRECTORY_MARKDOWN_EXTENSION)))
        .collect();
        files.sort();

        if files.is_empty() {
            warn!(root = %root.display(), "No Markdown files found in directory");
        }

        let mut report = DirectoryReport::default();
        for file in &files {
            let file_report = self.process_file(file).await;
            report.total_processed += file_report.processed;
            report.total_failed += file_report.failed;
            report.files.push(file_report);
        }

        info!(
            files = report.files.len(),
            processed = report.total_processed,
            failed = report.total_failed,
            "Directory rewrite complete"
        );
        Ok(report)
    }
}

/// Write `content` to a temp file next to `path`, then rename it over `path`,
/// keeping the original permissions.
fn write_replacing(path: &Path, content: &str) -> Result<(), RewriteError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    std::fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| RewriteError::Io(e.error))?;
    Ok(())
}
