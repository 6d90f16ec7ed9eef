//! Tile addressing.
//!
//! A tile is addressed by `(level, row, col)`. Each level is partitioned into
//! grid blocks of [`BLOCK_ROWS`] × [`BLOCK_COLUMNS`] tiles; one bundle covers
//! exactly one block, anchored at its [`GridOrigin`]. Inside a block a tile is
//! addressed by its [`LocalCoord`].
//!
//! ```text
//! row 0 ┌────────┬────────┐
//!       │ R0000  │ R0000  │
//!       │ C0000  │ C0080  │   origins in hex
//! 128   ├────────┼────────┤
//!       │ R0080  │ R0080  │
//!       │ C0000  │ C0080  │
//!       └────────┴────────┘
//! ```

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CacheError, Result};

/// Tile rows covered by one grid block.
pub const BLOCK_ROWS: u32 = 128;

/// Tile columns covered by one grid block.
pub const BLOCK_COLUMNS: u32 = 128;

/// Tile slots in one bundle (and records in one index file).
pub const SLOTS_PER_BUNDLE: usize = (BLOCK_ROWS * BLOCK_COLUMNS) as usize;

/// Highest level expressible by an `L<NNN>` designator.
pub const MAX_LEVEL: u32 = 999;

/// A zoom level, rendered as `L00`, `L01`, ... `L999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Level(u32);

impl Level {
    /// Create a level, rejecting values above [`MAX_LEVEL`].
    pub fn new(value: u32) -> Result<Self> {
        if value > MAX_LEVEL {
            return Err(CacheError::Bounds(format!(
                "level {} exceeds maximum {}",
                value, MAX_LEVEL
            )));
        }
        Ok(Self(value))
    }

    /// Create a level from a signed integer, as received from callers.
    pub fn from_i64(value: i64) -> Result<Self> {
        let value = u32::try_from(value)
            .map_err(|_| CacheError::Bounds(format!("invalid level {}", value)))?;
        Self::new(value)
    }

    /// Numeric value of the level.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Parse a bare designator such as `L05` or `L012`.
    pub fn parse_designator(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('L')?;
        if !(2..=3).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }

    /// Find the level designator embedded in a path.
    ///
    /// Components are searched innermost first, so a designator in the file
    /// name wins over one in a parent directory.
    pub fn find_in_path(path: &Path) -> Option<Self> {
        path.components().rev().find_map(|component| {
            let text = component.as_os_str().to_str()?;
            let captures = level_pattern().captures(text)?;
            captures.get(1)?.as_str().parse().ok().map(Self)
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{:02}", self.0)
    }
}

/// `L` followed by 2-3 digits, not embedded in a longer word or number.
fn level_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z0-9])L(\d{2,3})(?:[^0-9]|$)").expect("valid level regex")
    })
}

/// Top-left tile of a grid block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridOrigin {
    pub row0: u32,
    pub col0: u32,
}

impl GridOrigin {
    /// Origin of the block containing `(row, col)`.
    #[inline]
    pub fn containing(row: u32, col: u32) -> Self {
        Self {
            row0: row - row % BLOCK_ROWS,
            col0: col - col % BLOCK_COLUMNS,
        }
    }

    /// Whether this origin sits on the block grid.
    pub fn is_aligned(&self) -> bool {
        self.row0 % BLOCK_ROWS == 0 && self.col0 % BLOCK_COLUMNS == 0
    }

    /// Whether `(row, col)` falls inside this block.
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.row0
            && col >= self.col0
            && row - self.row0 < BLOCK_ROWS
            && col - self.col0 < BLOCK_COLUMNS
    }
}

impl fmt::Display for GridOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{:04x}C{:04x}", self.row0, self.col0)
    }
}

/// Tile position inside a grid block, both axes in `[0, 128)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalCoord {
    pub row: u32,
    pub col: u32,
}

impl LocalCoord {
    /// Create a local coordinate, rejecting values outside the block.
    pub fn new(row: u32, col: u32) -> Result<Self> {
        if row >= BLOCK_ROWS || col >= BLOCK_COLUMNS {
            return Err(CacheError::Bounds(format!(
                "local coordinate ({}, {}) outside {}x{} block",
                row, col, BLOCK_ROWS, BLOCK_COLUMNS
            )));
        }
        Ok(Self { row, col })
    }
}

/// A fully addressed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: Level,
    pub row: u32,
    pub col: u32,
}

impl TileCoord {
    /// Build a tile coordinate from caller-supplied integers.
    ///
    /// Negative values and levels above [`MAX_LEVEL`] are a bounds error.
    pub fn new(level: i64, row: i64, col: i64) -> Result<Self> {
        let level = Level::from_i64(level)?;
        let row = u32::try_from(row)
            .map_err(|_| CacheError::Bounds(format!("invalid row {}", row)))?;
        let col = u32::try_from(col)
            .map_err(|_| CacheError::Bounds(format!("invalid column {}", col)))?;
        Ok(Self { level, row, col })
    }

    /// Origin of the grid block holding this tile.
    #[inline]
    pub fn origin(&self) -> GridOrigin {
        GridOrigin::containing(self.row, self.col)
    }

    /// Position of this tile inside its grid block.
    #[inline]
    pub fn local(&self) -> LocalCoord {
        LocalCoord {
            row: self.row % BLOCK_ROWS,
            col: self.col % BLOCK_COLUMNS,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}
