//! BundleCache - read-only access to compact bundle/index tile caches.
//!
//! A cache is a directory tree of zoom levels (`L00`, `L01`, ...). Each level
//! is split into 128×128-tile grid blocks, and each block is stored as a pair
//! of files: a bundle holding length-prefixed image blobs and an index holding
//! one 40-bit offset per tile slot.
//!
//! # Example
//!
//! ```ignore
//! use bundlecache::{build_cache, TileLookup};
//!
//! let cache = build_cache("/srv/tiles/MapServer")?;
//! match cache.get_tile(12, 1530, 902)? {
//!     TileLookup::Found(png) => serve(png),
//!     TileLookup::Absent => serve_blank(),
//! }
//! ```
//!
//! Lookups flow `Cache` → `LevelCatalog` → `Bundle` → `IndexTable`, followed
//! by a single ranged read from the bundle data file.

pub mod bundle;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod coord;
pub mod discovery;
pub mod error;
pub mod index;
pub mod logging;

pub use bundle::{Bundle, BundleOptions, TileLookup, PNG_SIGNATURE};
pub use cache::{build_cache, build_cache_with_config, Cache, CacheSummary, LevelSummary};
pub use catalog::{Coverage, LevelCatalog};
pub use config::CacheConfig;
pub use coord::{GridOrigin, Level, LocalCoord, TileCoord, BLOCK_COLUMNS, BLOCK_ROWS};
pub use discovery::{BundleCandidate, BundleDiscovery, DiscoveryReport};
pub use error::{CacheError, ErrorKind, Result};
pub use index::{IndexTable, SlotOrder};
pub use logging::{init_logging, LoggingConfig, LoggingError};
