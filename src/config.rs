use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Engine tunables. All constructors start from [`EngineConfig::default`];
/// an optional TOML overlay can override individual fields.
///
/// `max_cache_size` and `max_visible_items` are the two knobs that trade
/// peak memory against decode thrash; the rest shape dispatch cadence.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records materialized per pagination step.
    pub page_size: usize,
    /// Fixed decode worker thread count.
    pub worker_count: usize,
    /// Upper bound on recycled tiles retained in the pool's free list.
    pub max_cache_size: usize,
    /// Materialized-tile budget that triggers an immediate eviction pass.
    pub max_visible_items: usize,
    /// Cadence of the periodic eviction pass.
    pub eviction_interval: Duration,
    /// Rows kept materialized beyond the strictly visible range, per side.
    pub eviction_buffer_rows: usize,
    /// Minimum gap between scroll-triggered pagination/eviction decisions.
    pub scroll_debounce: Duration,
    /// Scroll deltas below this never trigger a decision on their own.
    pub scroll_min_delta_px: f32,
    /// Pagination fires when scroll gets this close to the content bottom.
    pub bottom_trigger_px: f32,
    /// Tasks handed to the worker pool per dispatch tick.
    pub dispatch_batch: usize,
    /// Gap between dispatch ticks.
    pub dispatch_interval: Duration,
    /// Pending-queue cap; not-visible tasks are dropped beyond it.
    pub queue_cap: usize,
    /// Tile cell geometry, margins included in the cell step.
    pub tile_width: f32,
    pub tile_height: f32,
    pub tile_margin: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            worker_count: 4,
            max_cache_size: 150,
            max_visible_items: 150,
            eviction_interval: Duration::from_millis(500),
            eviction_buffer_rows: 2,
            scroll_debounce: Duration::from_millis(100),
            scroll_min_delta_px: 8.0,
            bottom_trigger_px: 200.0,
            dispatch_batch: 3,
            dispatch_interval: Duration::from_millis(50),
            queue_cap: 200,
            tile_width: 200.0,
            tile_height: 180.0,
            tile_margin: 20.0,
        }
    }
}

impl EngineConfig {
    /// Hard ceiling on live tile objects: one full page can be materialized
    /// on top of the visible budget before acquire forces an eviction pass.
    pub fn pool_ceiling(&self) -> usize {
        self.max_visible_items + self.page_size
    }

    /// Cell step in x, margins included.
    pub fn cell_width(&self) -> f32 {
        self.tile_width + self.tile_margin
    }

    /// Cell step in y, margins included.
    pub fn cell_height(&self) -> f32 {
        self.tile_height + self.tile_margin
    }

    /// Load defaults overridden by the TOML file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: ConfigOverlay =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let mut cfg = Self::default();
        cfg.apply(&overlay);
        Ok(cfg)
    }

    fn apply(&mut self, overlay: &ConfigOverlay) {
        if let Some(v) = overlay.page_size {
            self.page_size = v.max(1);
        }
        if let Some(v) = overlay.worker_count {
            self.worker_count = v.max(1);
        }
        if let Some(v) = overlay.max_cache_size {
            self.max_cache_size = v;
        }
        if let Some(v) = overlay.max_visible_items {
            self.max_visible_items = v.max(1);
        }
        if let Some(v) = overlay.eviction_interval_ms {
            self.eviction_interval = Duration::from_millis(v);
        }
        if let Some(v) = overlay.eviction_buffer_rows {
            self.eviction_buffer_rows = v;
        }
        if let Some(v) = overlay.scroll_debounce_ms {
            self.scroll_debounce = Duration::from_millis(v);
        }
        if let Some(v) = overlay.scroll_min_delta_px {
            self.scroll_min_delta_px = v.max(0.0);
        }
        if let Some(v) = overlay.bottom_trigger_px {
            self.bottom_trigger_px = v.max(0.0);
        }
        if let Some(v) = overlay.dispatch_batch {
            self.dispatch_batch = v.max(1);
        }
        if let Some(v) = overlay.dispatch_interval_ms {
            self.dispatch_interval = Duration::from_millis(v);
        }
        if let Some(v) = overlay.queue_cap {
            self.queue_cap = v.max(1);
        }
        if let Some(v) = overlay.tile_width {
            self.tile_width = v;
        }
        if let Some(v) = overlay.tile_height {
            self.tile_height = v;
        }
        if let Some(v) = overlay.tile_margin {
            self.tile_margin = v;
        }
    }
}

/// On-disk overlay. Every field optional so a config file only has to name
/// what it changes.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    page_size: Option<usize>,
    worker_count: Option<usize>,
    max_cache_size: Option<usize>,
    max_visible_items: Option<usize>,
    eviction_interval_ms: Option<u64>,
    eviction_buffer_rows: Option<usize>,
    scroll_debounce_ms: Option<u64>,
    scroll_min_delta_px: Option<f32>,
    bottom_trigger_px: Option<f32>,
    dispatch_batch: Option<usize>,
    dispatch_interval_ms: Option<u64>,
    queue_cap: Option<usize>,
    tile_width: Option<f32>,
    tile_height: Option<f32>,
    tile_margin: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.max_cache_size, 150);
        assert_eq!(cfg.max_visible_items, 150);
        assert_eq!(cfg.eviction_interval, Duration::from_millis(500));
        assert_eq!(cfg.scroll_debounce, Duration::from_millis(100));
        assert_eq!(cfg.bottom_trigger_px, 200.0);
        assert_eq!(cfg.pool_ceiling(), 200);
    }

    #[test]
    fn overlay_overrides_only_named_fields() {
        let overlay: ConfigOverlay =
            toml::from_str("page_size = 25\neviction_interval_ms = 1000\n").unwrap();
        let mut cfg = EngineConfig::default();
        cfg.apply(&overlay);
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.eviction_interval, Duration::from_millis(1000));
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.max_cache_size, 150);
    }

    #[test]
    fn overlay_rejects_unknown_keys() {
        let parsed = toml::from_str::<ConfigOverlay>("pagesize = 25\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let overlay: ConfigOverlay = toml::from_str("page_size = 0\n").unwrap();
        let mut cfg = EngineConfig::default();
        cfg.apply(&overlay);
        assert_eq!(cfg.page_size, 1);
    }
}
