//! Lazy directory enumeration filtered by file extension.

use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ScanError;
use crate::naming::lowercase_extension;

/// Iterator over absolute paths of allow-listed files below a root.
///
/// Order is whatever the filesystem yields. Subdirectories that cannot be
/// read are logged and skipped. Symlinked directories are not descended into.
pub struct DirectoryScanner {
    stack: Vec<ReadDir>,
    recursive: bool,
    extensions: Vec<String>,
}

impl DirectoryScanner {
    /// `extensions` are matched case-insensitively; a leading dot is optional.
    pub fn new<S: AsRef<str>>(
        root: &Path,
        recursive: bool,
        extensions: &[S],
    ) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        let reader = fs::read_dir(&root)?;
        debug!(root = %root.display(), recursive, "Scanning directory");
        Ok(Self {
            stack: vec![reader],
            recursive,
            extensions: normalize_extensions(extensions),
        })
    }

    fn allowed(&self, path: &Path) -> bool {
        let ext = lowercase_extension(path);
        !ext.is_empty() && self.extensions.iter().any(|allowed| *allowed == ext)
    }
}

impl Iterator for DirectoryScanner {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        while let Some(reader) = self.stack.last_mut() {
            let entry = match reader.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    warn!(error = ?e, "Failed to read directory entry");
                    continue;
                }
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            let path = entry.path();
            // `DirEntry::file_type` does not follow symlinks.
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    warn!(error = ?e, path = %path.display(), "Failed to read file type");
                    continue;
                }
            };
            if file_type.is_dir() {
                if self.recursive {
                    match fs::read_dir(&path) {
                        Ok(sub) => self.stack.push(sub),
                        Err(e) => {
                            warn!(error = ?e, path = %path.display(), "Skipping unreadable directory")
                        }
                    }
                }
            } else if file_type.is_symlink() {
                // Linked files are yielded, linked directories are never entered.
                if path.is_file() && self.allowed(&path) {
                    return Some(path);
                }
                debug!(path = %path.display(), "Not following symlink");
            } else if file_type.is_file() && self.allowed(&path) {
                return Some(path);
            }
        }
        None
    }
}

/// Lower-case every entry and make sure it starts with a dot.
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| {
            let ext = ext.as_ref().trim().to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

/// Collect a scan into a sorted vector.
pub fn scan_sorted<S: AsRef<str>>(
    root: &Path,
    recursive: bool,
    extensions: &[S],
) -> Result<Vec<PathBuf>, ScanError> {
    let mut paths: Vec<PathBuf> = DirectoryScanner::new(root, recursive, extensions)?.collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};
    use tempfile::tempdir;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    #[test]
    fn filters_by_extension_case_insensitively() {
        let tmp = tempdir().unwrap();
        touch(&tmp.path().join("a.png"));
        touch(&tmp.path().join("b.JPG"));
        touch(&tmp.path().join("notes.txt"));
        touch(&tmp.path().join("noext"));

        let found = scan_sorted(tmp.path(), false, &[".png", "jpg"]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn recursion_is_optional() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("deep/er");
        create_dir_all(&nested).unwrap();
        touch(&tmp.path().join("top.gif"));
        touch(&nested.join("inner.gif"));

        assert_eq!(scan_sorted(tmp.path(), false, &[".gif"]).unwrap().len(), 1);
        assert_eq!(scan_sorted(tmp.path(), true, &[".gif"]).unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        use std::os::unix::fs::symlink;

        let tmp = tempdir().unwrap();
        touch(&tmp.path().join("a.png"));
        symlink(tmp.path(), tmp.path().join("loop")).unwrap();

        let found = scan_sorted(tmp.path(), true, &[".png"]).unwrap();
        assert_eq!(found.len(), 1, "found {found:?}");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_yielded() {
        use std::os::unix::fs::symlink;

        let tmp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        touch(&outside.path().join("real.png"));
        symlink(outside.path().join("real.png"), tmp.path().join("link.png")).unwrap();
        symlink(outside.path(), tmp.path().join("linked_dir")).unwrap();

        let found = scan_sorted(tmp.path(), true, &[".png"]).unwrap();
        assert_eq!(found, vec![tmp.path().canonicalize().unwrap().join("link.png")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = DirectoryScanner::new(&tmp.path().join("nope"), true, &[".png"]).err();
        assert!(matches!(err, Some(ScanError::NotADirectory(_))));
    }
}
