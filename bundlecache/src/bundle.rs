//! Bundle files: one data file plus its index covering one grid block.
//!
//! # Bundle File Format
//!
//! The data file is a sequence of records, each a 4-byte little-endian signed
//! length followed by that many bytes of image payload. Index records point at
//! the first payload byte, so the length prefix sits at `offset - 4`.
//!
//! ```text
//!            offset - 4      offset                 offset + size
//! ... ───────┬──────────────┬──────────────────────┬─────── ...
//!            │ size (i32 LE)│ payload (PNG bytes)  │
//! ```
//!
//! Both files are opened lazily on first use and shared read-only between
//! threads afterwards. The index is loaded independently of the data file, so
//! lookups of absent tiles never touch the data file.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use memmap2::Mmap;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, trace};

use crate::coord::{GridOrigin, LocalCoord};
use crate::error::{CacheError, Result};
use crate::index::{IndexTable, SlotOrder, INDEX_FILE_LEN};

/// Bytes of the length prefix preceding each payload.
pub const LENGTH_PREFIX_LEN: u64 = 4;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Outcome of a tile lookup.
///
/// `Absent` is a normal result: the coordinate is addressable but nothing is
/// stored there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileLookup {
    /// Raw stored bytes of the tile.
    Found(Bytes),
    /// No tile stored at this coordinate.
    Absent,
}

impl TileLookup {
    /// Whether tile bytes were found.
    pub fn is_found(&self) -> bool {
        matches!(self, TileLookup::Found(_))
    }

    /// Whether nothing is stored at the coordinate.
    pub fn is_absent(&self) -> bool {
        matches!(self, TileLookup::Absent)
    }

    /// Borrow the tile bytes, if any.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            TileLookup::Found(bytes) => Some(bytes),
            TileLookup::Absent => None,
        }
    }

    /// Take the tile bytes, if any.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            TileLookup::Found(bytes) => Some(bytes),
            TileLookup::Absent => None,
        }
    }
}

/// Settings that govern how a bundle is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleOptions {
    /// Slot enumeration of the index file.
    pub slot_order: SlotOrder,
    /// Reject payloads that do not begin with [`PNG_SIGNATURE`].
    pub verify_signature: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            slot_order: SlotOrder::default(),
            verify_signature: true,
        }
    }
}

/// Get the bundle name regex.
///
/// Pattern: `R<hex-row>C<hex-col>` at the end of the file stem, optionally
/// preceded by a non-letter prefix such as a level token (`L03_R0080C0100`).
///
/// We capture:
/// - Group 1: origin row in hex (1-8 digits)
/// - Group 2: origin column in hex (1-8 digits)
fn bundle_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z])R([0-9A-Fa-f]{1,8})C([0-9A-Fa-f]{1,8})$")
            .expect("valid bundle name regex")
    })
}

/// Parse the grid origin encoded in a bundle or index file name.
///
/// # Examples
///
/// ```
/// use bundlecache::bundle::parse_bundle_name;
/// use std::path::Path;
///
/// let origin = parse_bundle_name(Path::new("L05/R0480C0380.bundlx")).unwrap();
/// assert_eq!(origin.row0, 0x480);
/// assert_eq!(origin.col0, 0x380);
/// ```
pub fn parse_bundle_name(path: &Path) -> Result<GridOrigin> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CacheError::path_parse(path, "file name is not valid UTF-8"))?;

    let captures = bundle_name_pattern()
        .captures(stem)
        .ok_or_else(|| CacheError::path_parse(path, "name does not match R<hex>C<hex>"))?;

    let row_str = &captures[1];
    let row0 = u32::from_str_radix(row_str, 16)
        .map_err(|_| CacheError::path_parse(path, format!("invalid row '{}'", row_str)))?;

    let col_str = &captures[2];
    let col0 = u32::from_str_radix(col_str, 16)
        .map_err(|_| CacheError::path_parse(path, format!("invalid column '{}'", col_str)))?;

    let origin = GridOrigin { row0, col0 };
    if !origin.is_aligned() {
        return Err(CacheError::path_parse(
            path,
            format!("origin {} is not aligned to the block grid", origin),
        ));
    }

    Ok(origin)
}

/// A value loaded on first use and then shared.
///
/// A failed load is not remembered; the next caller retries.
struct Lazy<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Lazy<T> {
    fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    fn get_or_try_load(&self, load: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        if let Some(value) = self.slot.read().as_ref() {
            return Ok(Arc::clone(value));
        }

        let mut slot = self.slot.write();
        // Another reader may have loaded it while we waited for the lock.
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(load()?);
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}

/// Read-only view of a bundle data file.
enum BundleData {
    Mapped(Mmap),
    Empty,
}

impl BundleData {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let len = file.metadata().map_err(|e| CacheError::io(path, e))?.len();
        if len == 0 {
            return Ok(BundleData::Empty);
        }
        // SAFETY: cache files are never written while a cache is open; the
        // mapping is only ever read.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| CacheError::io(path, e))?;
        Ok(BundleData::Mapped(mmap))
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            BundleData::Mapped(mmap) => &mmap[..],
            BundleData::Empty => &[],
        }
    }
}

/// One bundle data file and its index, covering one grid block.
pub struct Bundle {
    origin: GridOrigin,
    data_path: PathBuf,
    index_path: PathBuf,
    options: BundleOptions,
    index: Lazy<IndexTable>,
    data: Lazy<BundleData>,
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("origin", &self.origin)
            .field("data_path", &self.data_path)
            .field("index_path", &self.index_path)
            .field("options", &self.options)
            .finish()
    }
}

impl Bundle {
    /// Open a bundle from its data and index paths.
    ///
    /// The origin is parsed from the index file name. Only file metadata is
    /// read here: the index must be exactly [`INDEX_FILE_LEN`] bytes and the
    /// data file must exist. Contents are loaded on first read.
    pub fn open(
        data_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        options: BundleOptions,
    ) -> Result<Self> {
        let data_path = data_path.into();
        let index_path = index_path.into();

        let origin = parse_bundle_name(&index_path)?;

        let index_meta =
            std::fs::metadata(&index_path).map_err(|e| CacheError::io(&index_path, e))?;
        if !index_meta.is_file() {
            return Err(CacheError::format(&index_path, "index path is not a file"));
        }
        if index_meta.len() != INDEX_FILE_LEN as u64 {
            return Err(CacheError::format(
                &index_path,
                format!(
                    "index file is {} bytes, expected {}",
                    index_meta.len(),
                    INDEX_FILE_LEN
                ),
            ));
        }

        if !data_path.is_file() {
            return Err(CacheError::format(
                &data_path,
                "paired bundle data file is missing",
            ));
        }

        debug!(
            index = %index_path.display(),
            row0 = origin.row0,
            col0 = origin.col0,
            "Opened bundle"
        );

        Ok(Self {
            origin,
            data_path,
            index_path,
            options,
            index: Lazy::new(),
            data: Lazy::new(),
        })
    }

    /// Grid origin covered by this bundle.
    pub fn origin(&self) -> GridOrigin {
        self.origin
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Path of the index file.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Whether the index table has been loaded yet.
    pub fn is_index_loaded(&self) -> bool {
        self.index.is_loaded()
    }

    /// Whether the data file has been mapped yet.
    pub fn is_data_loaded(&self) -> bool {
        self.data.is_loaded()
    }

    /// Decoded index table, loading it on first use.
    pub fn index(&self) -> Result<Arc<IndexTable>> {
        self.index
            .get_or_try_load(|| IndexTable::load(&self.index_path, self.options.slot_order))
    }

    fn data(&self) -> Result<Arc<BundleData>> {
        self.data.get_or_try_load(|| BundleData::open(&self.data_path))
    }

    /// Read the tile at local grid coordinates.
    pub fn read_tile(&self, local_row: u32, local_col: u32) -> Result<TileLookup> {
        self.read_local(LocalCoord::new(local_row, local_col)?)
    }

    /// Read the tile at an already-validated local coordinate.
    pub fn read_local(&self, local: LocalCoord) -> Result<TileLookup> {
        let offset = self.index()?.offset_of(local);
        self.read_at(offset)
    }

    /// Read the tile stored in a linear index slot.
    pub fn read_slot(&self, slot: usize) -> Result<TileLookup> {
        let offset = self.index()?.slot_offset(slot)?;
        self.read_at(offset)
    }

    /// Whether a tile is stored at `local`, consulting only the index.
    pub fn contains(&self, local: LocalCoord) -> Result<bool> {
        Ok(IndexTable::is_present(self.index()?.offset_of(local)))
    }

    /// Every stored tile as `(local coordinate, payload offset)`.
    pub fn stored_tiles(&self) -> Result<Vec<(LocalCoord, u64)>> {
        Ok(self.index()?.present().collect())
    }

    /// Read every stored tile.
    ///
    /// A corrupt entry does not stop the scan; its error is returned in place
    /// of its bytes.
    pub fn extract_all(&self) -> Result<Vec<(LocalCoord, Result<Bytes>)>> {
        let index = self.index()?;
        let mut tiles = Vec::with_capacity(index.present_count());

        for (local, offset) in index.present() {
            let result = self.read_at(offset).and_then(|lookup| {
                lookup.into_bytes().ok_or_else(|| {
                    CacheError::format(&self.index_path, "present slot resolved to no tile")
                })
            });
            tiles.push((local, result));
        }

        Ok(tiles)
    }

    fn read_at(&self, offset: u64) -> Result<TileLookup> {
        if !IndexTable::is_present(offset) {
            trace!(bundle = %self.origin, offset, "Tile absent");
            return Ok(TileLookup::Absent);
        }

        let data = self.data()?;
        let bytes = data.as_slice();
        let range = self.payload_range(bytes, offset)?;
        let payload = &bytes[range];

        if self.options.verify_signature && !payload.starts_with(&PNG_SIGNATURE) {
            return Err(CacheError::format(
                &self.data_path,
                format!("payload at offset {} does not start with PNG signature", offset),
            ));
        }

        trace!(
            bundle = %self.origin,
            offset,
            size = payload.len(),
            "Read tile"
        );

        Ok(TileLookup::Found(Bytes::copy_from_slice(payload)))
    }

    /// Validate the length prefix before `offset` and return the payload range.
    fn payload_range(&self, bytes: &[u8], offset: u64) -> Result<Range<usize>> {
        let file_len = bytes.len() as u64;
        let corrupt = || {
            CacheError::format(
                &self.data_path,
                format!("corrupt length prefix at offset {}", offset),
            )
        };

        if offset > file_len {
            return Err(corrupt());
        }

        let prefix_start = (offset - LENGTH_PREFIX_LEN) as usize;
        let mut prefix = [0u8; LENGTH_PREFIX_LEN as usize];
        prefix.copy_from_slice(&bytes[prefix_start..offset as usize]);
        let size = i32::from_le_bytes(prefix);

        if size <= 0 || offset + size as u64 > file_len {
            return Err(corrupt());
        }

        Ok(offset as usize..(offset + size as u64) as usize)
    }
}
