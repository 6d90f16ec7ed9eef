//! Index file decoding.
//!
//! # Index File Format
//!
//! ```text
//! offset  size           content
//! 0       16             header (format metadata, not interpreted)
//! 16      16384 × 5      offset records, unsigned 40-bit little-endian
//! ```
//!
//! A file is exactly [`INDEX_FILE_LEN`] bytes. Each record holds the byte
//! offset of a tile's payload in the paired bundle file. A record below
//! [`MIN_TILE_OFFSET`] means no tile is stored in that slot.

use std::fmt;
use std::path::Path;

use crate::coord::{LocalCoord, BLOCK_COLUMNS, BLOCK_ROWS, SLOTS_PER_BUNDLE};
use crate::error::{CacheError, Result};

/// Bytes of opaque header preceding the records.
pub const INDEX_HEADER_LEN: usize = 16;

/// Bytes per offset record.
pub const INDEX_RECORD_LEN: usize = 5;

/// Exact size of a valid index file.
pub const INDEX_FILE_LEN: usize = INDEX_HEADER_LEN + SLOTS_PER_BUNDLE * INDEX_RECORD_LEN;

/// Largest value a record can hold.
pub const MAX_RECORD_VALUE: u64 = (1 << 40) - 1;

/// Smallest offset that leaves room for the 4-byte length prefix before it.
pub const MIN_TILE_OFFSET: u64 = 4;

/// How the 16384 records enumerate the 128×128 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotOrder {
    /// `slot = col * 128 + row` (compact cache V1 layout).
    #[default]
    ColumnMajor,
    /// `slot = row * 128 + col`.
    RowMajor,
}

impl SlotOrder {
    /// Linear slot index for a local coordinate.
    #[inline]
    pub fn slot(self, local: LocalCoord) -> usize {
        let (major, minor) = match self {
            SlotOrder::ColumnMajor => (local.col, local.row),
            SlotOrder::RowMajor => (local.row, local.col),
        };
        (major * BLOCK_ROWS + minor) as usize
    }

    /// Local coordinate for a linear slot index.
    #[inline]
    pub fn local(self, slot: usize) -> LocalCoord {
        let major = slot as u32 / BLOCK_COLUMNS;
        let minor = slot as u32 % BLOCK_COLUMNS;
        match self {
            SlotOrder::ColumnMajor => LocalCoord {
                row: minor,
                col: major,
            },
            SlotOrder::RowMajor => LocalCoord {
                row: major,
                col: minor,
            },
        }
    }

    /// Parse a configuration value (`column-major` / `row-major`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "column-major" | "col-major" | "column" => Some(SlotOrder::ColumnMajor),
            "row-major" | "row" => Some(SlotOrder::RowMajor),
            _ => None,
        }
    }
}

impl fmt::Display for SlotOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotOrder::ColumnMajor => write!(f, "column-major"),
            SlotOrder::RowMajor => write!(f, "row-major"),
        }
    }
}

/// Decode one 5-byte little-endian record.
#[inline]
pub fn decode_record(bytes: [u8; INDEX_RECORD_LEN]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Encode a value as a 5-byte little-endian record.
///
/// Bits above 40 are discarded.
#[inline]
pub fn encode_record(value: u64) -> [u8; INDEX_RECORD_LEN] {
    let le = value.to_le_bytes();
    [le[0], le[1], le[2], le[3], le[4]]
}

/// Decoded offset table of one index file.
#[derive(Clone)]
pub struct IndexTable {
    offsets: Box<[u64]>,
    order: SlotOrder,
}

impl IndexTable {
    /// Decode an in-memory index file.
    ///
    /// `path` is only used for error reporting.
    pub fn from_bytes(path: &Path, bytes: &[u8], order: SlotOrder) -> Result<Self> {
        if bytes.len() != INDEX_FILE_LEN {
            return Err(CacheError::format(
                path,
                format!(
                    "index file is {} bytes, expected {}",
                    bytes.len(),
                    INDEX_FILE_LEN
                ),
            ));
        }

        let offsets = bytes[INDEX_HEADER_LEN..]
            .chunks_exact(INDEX_RECORD_LEN)
            .map(|chunk| decode_record([chunk[0], chunk[1], chunk[2], chunk[3], chunk[4]]))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { offsets, order })
    }

    /// Read and decode an index file from disk.
    pub fn load(path: &Path, order: SlotOrder) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Self::from_bytes(path, &bytes, order)
    }

    /// Slot enumeration used by this table.
    pub fn order(&self) -> SlotOrder {
        self.order
    }

    /// Raw record value at `(local_row, local_col)`.
    ///
    /// Coordinates outside `[0, 128)` are a bounds error.
    pub fn offset_at(&self, local_row: u32, local_col: u32) -> Result<u64> {
        let local = LocalCoord::new(local_row, local_col)?;
        Ok(self.offset_of(local))
    }

    /// Raw record value for an already-validated local coordinate.
    #[inline]
    pub fn offset_of(&self, local: LocalCoord) -> u64 {
        self.offsets[self.order.slot(local)]
    }

    /// Raw record value by linear slot index.
    pub fn slot_offset(&self, slot: usize) -> Result<u64> {
        self.offsets.get(slot).copied().ok_or_else(|| {
            CacheError::Bounds(format!(
                "slot {} outside 0..{}",
                slot, SLOTS_PER_BUNDLE
            ))
        })
    }

    /// Whether a record value denotes a stored tile.
    #[inline]
    pub fn is_present(offset: u64) -> bool {
        offset >= MIN_TILE_OFFSET
    }

    /// Every slot holding a tile, as `(local coordinate, offset)`, in slot order.
    pub fn present(&self) -> impl Iterator<Item = (LocalCoord, u64)> + '_ {
        self.offsets
            .iter()
            .enumerate()
            .filter(|(_, &offset)| Self::is_present(offset))
            .map(move |(slot, &offset)| (self.order.local(slot), offset))
    }

    /// Number of slots holding a tile.
    pub fn present_count(&self) -> usize {
        self.offsets
            .iter()
            .filter(|&&offset| Self::is_present(offset))
            .count()
    }
}

impl fmt::Debug for IndexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexTable")
            .field("order", &self.order)
            .field("present", &self.present_count())
            .finish()
    }
}
