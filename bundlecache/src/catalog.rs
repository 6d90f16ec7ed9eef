//! Per-level bundle catalog.
//!
//! Bundles are keyed by their grid origin, so finding the bundle for a tile is
//! a single hash lookup regardless of how many bundles the level holds.

use std::collections::HashMap;

use crate::bundle::Bundle;
use crate::coord::{GridOrigin, Level};
use crate::error::{CacheError, Result};

/// All bundles of one level, keyed by grid origin.
#[derive(Debug)]
pub struct LevelCatalog {
    level: Level,
    bundles: HashMap<GridOrigin, Bundle>,
}

/// Extent of the blocks present in a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    /// Smallest origin row and column.
    pub min: GridOrigin,
    /// Largest origin row and column.
    pub max: GridOrigin,
}

impl LevelCatalog {
    /// Create an empty catalog for `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            bundles: HashMap::new(),
        }
    }

    /// Level this catalog belongs to.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Register a bundle under its origin.
    ///
    /// Two bundles claiming the same origin make the cache inconsistent; the
    /// second registration fails and the catalog keeps the first.
    pub fn insert(&mut self, bundle: Bundle) -> Result<()> {
        let origin = bundle.origin();
        if let Some(existing) = self.bundles.get(&origin) {
            return Err(CacheError::format(
                bundle.index_path(),
                format!(
                    "duplicate bundle origin {} at level {} (already registered by '{}')",
                    origin,
                    self.level,
                    existing.index_path().display()
                ),
            ));
        }
        self.bundles.insert(origin, bundle);
        Ok(())
    }

    /// Bundle owning the tile at `(row, col)`, if this level has one.
    #[inline]
    pub fn find_bundle(&self, row: u32, col: u32) -> Option<&Bundle> {
        self.bundles.get(&GridOrigin::containing(row, col))
    }

    /// Bundle registered at exactly `origin`.
    pub fn bundle_at(&self, origin: GridOrigin) -> Option<&Bundle> {
        self.bundles.get(&origin)
    }

    /// Iterate every bundle in this level (unordered).
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }

    /// Origins of every bundle, sorted.
    pub fn origins(&self) -> Vec<GridOrigin> {
        let mut origins: Vec<_> = self.bundles.keys().copied().collect();
        origins.sort();
        origins
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Bounding origins of all bundles, or `None` for an empty catalog.
    pub fn coverage(&self) -> Option<Coverage> {
        let mut origins = self.bundles.keys();
        let first = *origins.next()?;
        let (min, max) = origins.fold((first, first), |(min, max), o| {
            (
                GridOrigin {
                    row0: min.row0.min(o.row0),
                    col0: min.col0.min(o.col0),
                },
                GridOrigin {
                    row0: max.row0.max(o.row0),
                    col0: max.col0.max(o.col0),
                },
            )
        });
        Some(Coverage { min, max })
    }
}
