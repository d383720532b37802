use std::path::PathBuf;
use thiserror::Error;

/// A decode failure for one tile. Recoverable: the tile shows a placeholder
/// and the scheduler keeps going.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no readable source image at {filepath:?}")]
    NoSource { filepath: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// The tile pool hit its hard ceiling. Resolved by an eviction pass, never by
/// unbounded growth.
#[derive(Debug, Clone, Copy, Error)]
#[error("tile pool exhausted: {live} live tiles at ceiling {ceiling}")]
pub struct PoolExhausted {
    pub live: usize,
    pub ceiling: usize,
}

/// The record source could not produce a record. Fatal only to the page
/// materialization in progress; already-materialized tiles are unaffected.
#[derive(Debug, Error)]
pub enum RecordSourceError {
    #[error("record index {index} out of bounds (count {count})")]
    OutOfBounds { index: usize, count: usize },

    #[error("record source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
