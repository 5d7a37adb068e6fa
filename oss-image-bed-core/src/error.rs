use std::path::PathBuf;

use thiserror::Error;

use crate::contract::StoreError;
use crate::format::format_size;

/// Why a single image upload did not succeed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("file size exceeds limit: {} (max {max_mb} MB)", format_size(*.size))]
    SizeLimitExceeded { size: u64, max_mb: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a Markdown document could not be rewritten.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a Markdown file: {}", .0.display())]
    NotMarkdown(PathBuf),

    #[error("failed to back up {}: {source}", .path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no images uploaded successfully")]
    NoUploadsSucceeded,

    #[error("invalid local image pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised before any per-file work starts.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
