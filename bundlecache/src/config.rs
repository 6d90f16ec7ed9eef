//! Cache reader configuration.
//!
//! Configuration can be built in code or read from an INI file:
//!
//! ```ini
//! [cache]
//! bundle_extension = bundle
//! index_extension = bundlx
//! slot_order = column-major
//! verify_signature = true
//! parallel_open = true
//! container_dirs = _alllayers, Layers/_alllayers
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::warn;

use crate::bundle::BundleOptions;
use crate::error::{CacheError, Result};
use crate::index::SlotOrder;

/// INI section holding cache settings.
pub const CONFIG_SECTION: &str = "cache";

/// Default data file extension.
pub const DEFAULT_BUNDLE_EXTENSION: &str = "bundle";

/// Default index file extension.
pub const DEFAULT_INDEX_EXTENSION: &str = "bundlx";

/// Container directories that hold the level directories of a cache.
pub const DEFAULT_CONTAINER_DIRS: &[&str] = &["_alllayers", "Layers/_alllayers"];

/// Configuration for building a [`Cache`](crate::Cache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Extension of bundle data files (without the dot).
    pub bundle_extension: String,

    /// Extension of index files (without the dot).
    pub index_extension: String,

    /// Container directories, relative to the root, where discovery starts
    /// if present. The first existing one wins.
    pub container_dirs: Vec<PathBuf>,

    /// Slot enumeration of index files.
    pub slot_order: SlotOrder,

    /// Reject tile payloads that lack the PNG signature.
    pub verify_signature: bool,

    /// Validate discovered bundles on the rayon thread pool.
    pub parallel_open: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bundle_extension: DEFAULT_BUNDLE_EXTENSION.to_string(),
            index_extension: DEFAULT_INDEX_EXTENSION.to_string(),
            container_dirs: DEFAULT_CONTAINER_DIRS.iter().map(PathBuf::from).collect(),
            slot_order: SlotOrder::default(),
            verify_signature: true,
            parallel_open: true,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bundle and index file extensions.
    pub fn with_extensions(
        mut self,
        bundle_extension: impl Into<String>,
        index_extension: impl Into<String>,
    ) -> Self {
        self.bundle_extension = bundle_extension.into();
        self.index_extension = index_extension.into();
        self
    }

    /// Set the slot enumeration order.
    pub fn with_slot_order(mut self, order: SlotOrder) -> Self {
        self.slot_order = order;
        self
    }

    /// Enable or disable PNG signature checks.
    pub fn with_verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }

    /// Enable or disable parallel bundle validation.
    pub fn with_parallel_open(mut self, parallel: bool) -> Self {
        self.parallel_open = parallel;
        self
    }

    /// Replace the container directory list.
    pub fn with_container_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.container_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Options handed to each bundle.
    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            slot_order: self.slot_order,
            verify_signature: self.verify_signature,
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, ext) in [
            ("bundle_extension", &self.bundle_extension),
            ("index_extension", &self.index_extension),
        ] {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(CacheError::Config(format!(
                    "{} must be a bare extension, got '{}'",
                    name, ext
                )));
            }
        }
        if self.bundle_extension.eq_ignore_ascii_case(&self.index_extension) {
            return Err(CacheError::Config(
                "bundle and index extensions must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from an INI file.
    ///
    /// Missing keys keep their defaults.
    pub fn from_ini_file(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            CacheError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_ini(&ini)
    }

    /// Load configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| CacheError::Config(format!("invalid INI: {}", e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let mut config = Self::default();

        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            return Ok(config);
        };

        for (key, value) in section.iter() {
            let value = value.trim();
            match key {
                "bundle_extension" => config.bundle_extension = value.to_string(),
                "index_extension" => config.index_extension = value.to_string(),
                "slot_order" => {
                    config.slot_order = SlotOrder::parse(value).ok_or_else(|| {
                        CacheError::Config(format!("invalid slot_order '{}'", value))
                    })?;
                }
                "verify_signature" => config.verify_signature = parse_bool(key, value)?,
                "parallel_open" => config.parallel_open = parse_bool(key, value)?,
                "container_dirs" => {
                    config.container_dirs = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect();
                }
                other => warn!(key = other, "Ignoring unknown cache config key"),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(CacheError::Config(format!(
            "invalid boolean for {}: '{}'",
            key, value
        ))),
    }
}
