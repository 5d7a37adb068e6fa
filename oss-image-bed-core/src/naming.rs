//! Remote object key generation.
//!
//! A key is `resolved_prefix + filename`. The prefix template may contain
//! `{year}`, `{month}` and `{day}`, resolved against the `now` passed in by the
//! caller. The filename depends on the [`NamingRule`].

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Duration, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the filename part of a remote key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NamingRule {
    /// Random 128-bit hex id plus the lower-cased extension.
    Uuid,
    /// `YYYYMMDD_HHMMSS_micros` plus the lower-cased extension.
    Timestamp,
    /// The source file's base name, unchanged.
    Original,
}

impl From<&str> for NamingRule {
    fn from(s: &str) -> Self {
        match s {
            "uuid" => NamingRule::Uuid,
            "timestamp" => NamingRule::Timestamp,
            "original" => NamingRule::Original,
            other => {
                tracing::warn!(rule = other, "Unknown naming rule, defaulting to uuid");
                NamingRule::Uuid
            }
        }
    }
}

impl From<String> for NamingRule {
    fn from(s: String) -> Self {
        NamingRule::from(s.as_str())
    }
}

impl From<NamingRule> for String {
    fn from(rule: NamingRule) -> Self {
        match rule {
            NamingRule::Uuid => "uuid",
            NamingRule::Timestamp => "timestamp",
            NamingRule::Original => "original",
        }
        .to_string()
    }
}

/// Last microsecond value handed out by the timestamp rule, process-wide.
static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Substitute `{year}`, `{month}` and `{day}` in a prefix template.
pub fn resolve_prefix(template: &str, now: &DateTime<Local>) -> String {
    template
        .replace("{year}", &format!("{:04}", now.year()))
        .replace("{month}", &format!("{:02}", now.month()))
        .replace("{day}", &format!("{:02}", now.day()))
}

/// Lower-cased extension including the leading dot, or an empty string.
pub fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Build the remote key for `local_path`.
///
/// No separator is inserted between prefix and filename: a non-empty prefix
/// is expected to end with `/` already.
pub fn generate_key(
    local_path: &Path,
    rule: NamingRule,
    prefix_template: &str,
    now: &DateTime<Local>,
) -> String {
    let prefix = resolve_prefix(prefix_template, now);
    let filename = match rule {
        NamingRule::Uuid => format!("{}{}", Uuid::new_v4().simple(), lowercase_extension(local_path)),
        NamingRule::Timestamp => {
            let stamp = unique_timestamp(now);
            format!(
                "{}{}",
                stamp.format("%Y%m%d_%H%M%S_%6f"),
                lowercase_extension(local_path)
            )
        }
        NamingRule::Original => local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    format!("{prefix}{filename}")
}

/// Returns `now`, bumped forward by whole microseconds if an equal or later
/// instant has already been issued in this process.
fn unique_timestamp(now: &DateTime<Local>) -> DateTime<Local> {
    let wanted = now.timestamp_micros();
    let previous = LAST_TIMESTAMP_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if wanted > last { wanted } else { last + 1 })
        })
        .unwrap_or(wanted);
    let issued = if wanted > previous { wanted } else { previous + 1 };
    *now + Duration::microseconds(issued - wanted)
}
