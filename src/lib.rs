use std::path::PathBuf;

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod layout;
pub mod pool;
pub mod scheduler;
pub mod selection;
pub mod source;

pub use config::EngineConfig;
pub use decode::{Decoder, ImageFileDecoder};
pub use engine::{EngineStats, GridEngine};
pub use error::{ConfigError, DecodeError, PoolExhausted, RecordSourceError};
pub use layout::GridLayout;
pub use pool::{PoolStats, SlotId, Tile, TilePool, TileState};
pub use scheduler::{LoadScheduler, LoadTask, SchedulerStats};
pub use selection::{SelectionController, SelectionMode};
pub use source::{RecordSource, VecSource};

/// Stable per-session photo identifier. Never reused while a source snapshot
/// is alive.
pub type RecordId = i64;

/// Immutable snapshot of one photo row, as handed over by the record source.
/// The engine copies what it needs into tiles and never mutates this.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: RecordId,
    pub filename: String,
    pub filepath: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// 0-5 stars.
    pub rating: u8,
    pub is_favorite: bool,
}

/// Decoded RGBA8 pixels for one tile.
#[derive(Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self { width, height, data }
    }

    pub fn memory_size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Notifications the host drains after driving the engine. Delivered in
/// order, at most once each.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Repaint hint: the tile in this slot changed state (Ready or Failed).
    TileReady { slot: SlotId },
    /// Full selection set after a mutation, sorted by record id.
    SelectionChanged(Vec<RecordId>),
    /// Primary click in single-select mode ("open photo" in the host).
    Activated(RecordId),
}
