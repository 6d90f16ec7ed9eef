//! The tile cache: discovery, catalog construction, and tile lookups.
//!
//! A [`Cache`] is built once from a root directory and is immutable
//! afterwards. It is `Send + Sync`; share it between worker threads with an
//! `Arc` and call [`Cache::get_tile`] concurrently without further locking.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::bundle::{Bundle, TileLookup};
use crate::catalog::{Coverage, LevelCatalog};
use crate::config::CacheConfig;
use crate::coord::{Level, TileCoord};
use crate::discovery::{BundleCandidate, BundleDiscovery};
use crate::error::{CacheError, Result};

/// Build a cache from `root` with the default configuration.
pub fn build_cache(root: impl AsRef<Path>) -> Result<Cache> {
    Cache::build(root, CacheConfig::default())
}

/// Build a cache from `root` with an explicit configuration.
pub fn build_cache_with_config(root: impl AsRef<Path>, config: CacheConfig) -> Result<Cache> {
    Cache::build(root, config)
}

/// Per-level figures in a [`CacheSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSummary {
    pub level: Level,
    pub bundles: usize,
    pub coverage: Option<Coverage>,
}

/// Overview of a built cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSummary {
    /// Root the cache was built from.
    pub root: PathBuf,
    /// One entry per level, ascending.
    pub levels: Vec<LevelSummary>,
    /// Total bundles across all levels.
    pub bundles: usize,
    /// Index files skipped during construction.
    pub skipped: usize,
}

impl fmt::Display for CacheSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} levels, {} bundles ({} skipped)",
            self.root.display(),
            self.levels.len(),
            self.bundles,
            self.skipped
        )
    }
}

/// A read-only tile cache.
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
    config: CacheConfig,
    levels: BTreeMap<Level, LevelCatalog>,
    skipped: usize,
}

impl Cache {
    /// Discover the tree under `root` and build one catalog per level.
    ///
    /// Bundles that fail to open are logged and skipped. Two bundles with the
    /// same origin in one level, or a tree without any usable level, fail the
    /// whole build.
    pub fn build(root: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        config.validate()?;

        let started = Instant::now();
        let report = BundleDiscovery::new(&root, &config).discover()?;
        let mut skipped = report.skipped_no_level.len();

        debug!(
            root = %root.display(),
            candidates = report.candidates.len(),
            skipped_no_level = skipped,
            unreadable_dirs = report.unreadable_dirs.len(),
            "Discovery complete"
        );

        let opened = open_candidates(report.candidates, &config);

        let mut levels: BTreeMap<Level, LevelCatalog> = BTreeMap::new();
        for (candidate, result) in opened {
            match result {
                Ok(bundle) => {
                    levels
                        .entry(candidate.level)
                        .or_insert_with(|| LevelCatalog::new(candidate.level))
                        .insert(bundle)?;
                }
                Err(e) => {
                    warn!(
                        path = %candidate.index_path.display(),
                        level = %candidate.level,
                        error = %e,
                        "Skipping bundle"
                    );
                    skipped += 1;
                }
            }
        }

        if levels.is_empty() {
            return Err(CacheError::format(
                &root,
                "no recognizable levels found under cache root",
            ));
        }

        let cache = Self {
            root,
            config,
            levels,
            skipped,
        };

        info!(
            root = %cache.root.display(),
            levels = cache.levels.len(),
            bundles = cache.bundle_count(),
            skipped = cache.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache built"
        );

        Ok(cache)
    }

    /// Look up a tile by integer coordinates.
    ///
    /// Negative coordinates and levels above the designator range are a
    /// bounds error; a level with no catalog is a not-found error. A block
    /// without a bundle, or a slot without a tile, is [`TileLookup::Absent`].
    pub fn get_tile(&self, level: i64, row: i64, col: i64) -> Result<TileLookup> {
        self.get(&TileCoord::new(level, row, col)?)
    }

    /// Look up a tile by typed coordinate.
    pub fn get(&self, tile: &TileCoord) -> Result<TileLookup> {
        match self.level_catalog(tile.level)?.find_bundle(tile.row, tile.col) {
            Some(bundle) => bundle.read_local(tile.local()),
            None => Ok(TileLookup::Absent),
        }
    }

    /// Whether a tile is stored, consulting only index files.
    pub fn contains_tile(&self, level: i64, row: i64, col: i64) -> Result<bool> {
        let tile = TileCoord::new(level, row, col)?;
        match self.level_catalog(tile.level)?.find_bundle(tile.row, tile.col) {
            Some(bundle) => bundle.contains(tile.local()),
            None => Ok(false),
        }
    }

    /// Bundle that would hold `tile`, if its block is present.
    pub fn bundle_for(&self, tile: &TileCoord) -> Result<Option<&Bundle>> {
        Ok(self.level_catalog(tile.level)?.find_bundle(tile.row, tile.col))
    }

    fn level_catalog(&self, level: Level) -> Result<&LevelCatalog> {
        self.levels.get(&level).ok_or(CacheError::NotFound {
            level: level.value(),
        })
    }

    /// Catalog for `level`, if present.
    pub fn catalog(&self, level: Level) -> Option<&LevelCatalog> {
        self.levels.get(&level)
    }

    /// Levels present in this cache, ascending.
    pub fn levels(&self) -> Vec<Level> {
        self.levels.keys().copied().collect()
    }

    /// Total number of bundles.
    pub fn bundle_count(&self) -> usize {
        self.levels.values().map(LevelCatalog::len).sum()
    }

    /// Root directory the cache was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Overview of levels and bundles.
    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            root: self.root.clone(),
            levels: self
                .levels
                .values()
                .map(|catalog| LevelSummary {
                    level: catalog.level(),
                    bundles: catalog.len(),
                    coverage: catalog.coverage(),
                })
                .collect(),
            bundles: self.bundle_count(),
            skipped: self.skipped,
        }
    }
}

/// Open every candidate, in parallel when configured. Order is preserved.
fn open_candidates(
    candidates: Vec<BundleCandidate>,
    config: &CacheConfig,
) -> Vec<(BundleCandidate, Result<Bundle>)> {
    let options = config.bundle_options();
    let open = |candidate: BundleCandidate| {
        let result = Bundle::open(
            candidate.data_path.clone(),
            candidate.index_path.clone(),
            options,
        );
        (candidate, result)
    };

    if config.parallel_open {
        candidates.into_par_iter().map(open).collect()
    } else {
        candidates.into_iter().map(open).collect()
    }
}
