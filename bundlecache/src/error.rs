//! Error types for cache construction and tile reads.
//!
//! A tile that is simply not stored is reported as
//! [`TileLookup::Absent`](crate::TileLookup::Absent), never as an error.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while building a cache or reading a tile.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A file or directory name does not follow the naming convention.
    #[error("Cannot parse '{}': {reason}", path.display())]
    PathParse { path: PathBuf, reason: String },

    /// File contents or cache structure do not match the expected format.
    #[error("Format error in '{}': {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// A coordinate or level is outside the addressable range.
    #[error("Out of bounds: {0}")]
    Bounds(String),

    /// The requested level has no catalog in this cache.
    #[error("Level {level} not found in cache")]
    NotFound { level: u32 },

    /// I/O error while reading a cache file.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration file or value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathParse,
    Format,
    Bounds,
    NotFound,
    Io,
    Config,
}

impl CacheError {
    pub(crate) fn path_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheError::PathParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// The kind of this error, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::PathParse { .. } => ErrorKind::PathParse,
            CacheError::Format { .. } => ErrorKind::Format,
            CacheError::Bounds(_) => ErrorKind::Bounds,
            CacheError::NotFound { .. } => ErrorKind::NotFound,
            CacheError::Io { .. } => ErrorKind::Io,
            CacheError::Config(_) => ErrorKind::Config,
        }
    }
}
