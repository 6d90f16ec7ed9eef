//! Discovery of bundle/index pairs on disk.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! └── _alllayers/            # optional container directory
//!     ├── L00/
//!     │   ├── R0000C0000.bundle
//!     │   └── R0000C0000.bundlx
//!     └── L01/
//!         └── ...
//! ```
//!
//! Flat layouts that carry the level in the file name
//! (`L03_R0080C0100.bundlx`) are recognised as well. Index files are found by
//! extension; the data file is the index path with the bundle extension.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::coord::Level;
use crate::error::{CacheError, Result};

/// An index file found on disk, with its level and paired data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleCandidate {
    /// Level parsed from the path.
    pub level: Level,
    /// Path of the index file.
    pub index_path: PathBuf,
    /// Expected path of the paired data file (may not exist).
    pub data_path: PathBuf,
}

/// Result of walking a cache tree.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Index files with a recognisable level, sorted by path.
    pub candidates: Vec<BundleCandidate>,
    /// Index files skipped because no level designator was found.
    pub skipped_no_level: Vec<PathBuf>,
    /// Directories below the scan root that could not be listed.
    pub unreadable_dirs: Vec<PathBuf>,
}

/// Walks a cache root looking for index files.
#[derive(Debug, Clone)]
pub struct BundleDiscovery {
    root: PathBuf,
    index_extension: String,
    bundle_extension: String,
    container_dirs: Vec<PathBuf>,
}

impl BundleDiscovery {
    /// Create a discovery for `root` using the extensions and container
    /// directories from `config`.
    pub fn new(root: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self {
            root: root.into(),
            index_extension: config.index_extension.clone(),
            bundle_extension: config.bundle_extension.clone(),
            container_dirs: config.container_dirs.clone(),
        }
    }

    /// Root directory as given.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the walk starts from: the first existing container directory
    /// under the root, or the root itself.
    pub fn scan_root(&self) -> Result<PathBuf> {
        let meta = std::fs::metadata(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        if !meta.is_dir() {
            return Err(CacheError::format(&self.root, "cache root is not a directory"));
        }

        Ok(self
            .container_dirs
            .iter()
            .map(|dir| self.root.join(dir))
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| self.root.clone()))
    }

    /// Walk the tree and collect every index file.
    pub fn discover(&self) -> Result<DiscoveryReport> {
        let scan_root = self.scan_root()?;
        debug!(root = %scan_root.display(), "Scanning cache tree");

        let entries = std::fs::read_dir(&scan_root).map_err(|e| CacheError::io(&scan_root, e))?;

        let mut report = DiscoveryReport::default();
        self.walk_entries(&scan_root, entries, &mut report);

        report.candidates.sort_by(|a, b| a.index_path.cmp(&b.index_path));
        report.skipped_no_level.sort();
        report.unreadable_dirs.sort();
        Ok(report)
    }

    fn walk(&self, dir: &Path, report: &mut DiscoveryReport) {
        match std::fs::read_dir(dir) {
            Ok(entries) => self.walk_entries(dir, entries, report),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                report.unreadable_dirs.push(dir.to_path_buf());
            }
        }
    }

    fn walk_entries(&self, dir: &Path, entries: std::fs::ReadDir, report: &mut DiscoveryReport) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();

            // Skip hidden entries
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            if path.is_dir() {
                self.walk(&path, report);
                continue;
            }

            if !has_extension(&path, &self.index_extension) {
                continue;
            }

            // Only the part below the root may carry the level designator.
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            match Level::find_in_path(relative) {
                Some(level) => report.candidates.push(BundleCandidate {
                    level,
                    data_path: self.paired_data_path(&path),
                    index_path: path,
                }),
                None => {
                    debug!(path = %path.display(), "Skipping index file without level designator");
                    report.skipped_no_level.push(path);
                }
            }
        }
    }

    /// Data file paired with `index_path`.
    ///
    /// The extension is matched ignoring case, so `R0000C0000.BUNDLX` pairs
    /// with `R0000C0000.BUNDLE`. Falls back to the configured extension when
    /// no sibling matches.
    fn paired_data_path(&self, index_path: &Path) -> PathBuf {
        let expected = index_path.with_extension(&self.bundle_extension);
        if expected.is_file() {
            return expected;
        }

        let (Some(parent), Some(stem)) = (index_path.parent(), index_path.file_stem()) else {
            return expected;
        };
        let Ok(siblings) = std::fs::read_dir(parent) else {
            return expected;
        };

        siblings
            .flatten()
            .map(|entry| entry.path())
            .find(|p| {
                p.file_stem() == Some(stem)
                    && has_extension(p, &self.bundle_extension)
                    && p.is_file()
            })
            .unwrap_or(expected)
    }
}

/// Case-insensitive extension check.
fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
