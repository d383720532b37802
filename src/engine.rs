use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::decode::Decoder;
use crate::error::RecordSourceError;
use crate::layout::GridLayout;
use crate::pool::{PoolStats, SlotId, Tile, TilePool, TileState};
use crate::scheduler::{Delivery, LoadScheduler, SchedulerStats};
use crate::selection::{SelectionController, SelectionMode};
use crate::source::RecordSource;
use crate::{EngineEvent, RecordId};

mod evict;
mod window;

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub pages_loaded: u64,
    pub evicted_tiles: u64,
    pub stale_dropped: u64,
    pub decode_failures: u64,
}

/// The control-thread owner of the whole grid: layout, window, tile pool,
/// load scheduler, evictor and selection. All state here is single-writer;
/// worker threads only ever talk back through the scheduler's result channel.
///
/// The host drives it with input calls (`scroll_to`, `click_at`, viewport
/// changes) plus a periodic `pump`, then drains `take_events` and paints
/// whatever `tiles()` yields.
pub struct GridEngine {
    cfg: EngineConfig,
    source: Box<dyn RecordSource>,
    layout: GridLayout,
    pool: TilePool,
    scheduler: LoadScheduler,
    selection: SelectionController,
    /// Record index -> slot currently backing it. Holes inside the window
    /// are evicted tiles awaiting a cache-miss refill.
    placements: FxHashMap<usize, SlotId>,
    /// Window size: `[0, materialized)` has been materialized at least once.
    /// Grows monotonically; eviction never shrinks it.
    materialized: usize,
    viewport_w: f32,
    viewport_h: f32,
    scroll_y: f32,
    pending_scroll: Option<f32>,
    /// Scroll position at the last pagination/eviction decision; small
    /// jitters accumulate against this anchor instead of firing decisions.
    decision_anchor: f32,
    last_decision: Option<Instant>,
    last_dispatch: Option<Instant>,
    last_eviction: Option<Instant>,
    events: VecDeque<EngineEvent>,
    stats: EngineStats,
}

impl GridEngine {
    pub fn new(
        source: Box<dyn RecordSource>,
        decoder: Arc<dyn Decoder>,
        cfg: EngineConfig,
        viewport_w: f32,
        viewport_h: f32,
    ) -> Self {
        let layout = GridLayout::new(viewport_w, &cfg);
        let pool = TilePool::new(cfg.max_cache_size, cfg.pool_ceiling());
        let scheduler = LoadScheduler::new(&cfg, decoder);
        Self {
            source,
            layout,
            pool,
            scheduler,
            selection: SelectionController::new(SelectionMode::Single),
            placements: FxHashMap::default(),
            materialized: 0,
            viewport_w,
            viewport_h,
            scroll_y: 0.0,
            pending_scroll: None,
            decision_anchor: 0.0,
            last_decision: None,
            last_dispatch: None,
            last_eviction: None,
            events: VecDeque::new(),
            stats: EngineStats::default(),
            cfg,
        }
    }

    /// Materialize the first page. Also the entry point after a source swap;
    /// any previous placements are released first.
    pub fn materialize_initial(&mut self) -> Result<usize, RecordSourceError> {
        window::materialize_initial(self)
    }

    /// Grow the window by one page. No-op at the tail.
    pub fn load_next_page(&mut self) -> Result<usize, RecordSourceError> {
        window::load_next_page(self)
    }

    /// Record the newest scroll target. Coalesced: only `pump` turns it into
    /// pagination/eviction work, at most once per debounce interval.
    pub fn scroll_to(&mut self, offset: f32) {
        self.pending_scroll = Some(offset.max(0.0));
    }

    /// One control-thread tick: apply the debounced scroll decision, feed the
    /// worker pool, drain decode results, and run the evictor when due.
    pub fn pump(&mut self, now: Instant) {
        let debounce_over = self
            .last_decision
            .is_none_or(|t| now.duration_since(t) >= self.cfg.scroll_debounce);
        if self.pending_scroll.is_some() && debounce_over {
            window::apply_scroll_decision(self, now);
        }

        let dispatch_due = self
            .last_dispatch
            .is_none_or(|t| now.duration_since(t) >= self.cfg.dispatch_interval);
        if dispatch_due {
            self.scheduler.dispatch();
            self.last_dispatch = Some(now);
        }

        for delivery in self.scheduler.try_deliveries() {
            self.apply_delivery(delivery);
        }

        if evict::due(self, now) {
            self.run_eviction(now);
        }
    }

    /// Force an eviction pass, independent of cadence.
    pub fn run_eviction(&mut self, now: Instant) {
        let released = evict::run(self);
        if released > 0 {
            debug!("evicted {released} tiles, {} placed", self.placements.len());
        }
        self.last_eviction = Some(now);
    }

    /// Viewport geometry changed. Re-places materialized tiles; never
    /// touches pixel state or re-enqueues loads.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport_w = width;
        self.viewport_h = height;
        let layout = GridLayout::new(width, &self.cfg);
        if layout == self.layout {
            return;
        }
        self.layout = layout;
        for (&index, &slot) in &self.placements {
            if let Some(tile) = self.pool.get_mut(slot) {
                let (row, col) = layout.place(index);
                tile.row = row;
                tile.col = col;
            }
        }
    }

    /// Swap in a fresh source snapshot (append-only hosts re-query and call
    /// this) and re-materialize from the top.
    pub fn reset_records(
        &mut self,
        source: Box<dyn RecordSource>,
    ) -> Result<usize, RecordSourceError> {
        self.source = source;
        self.scroll_y = 0.0;
        self.pending_scroll = None;
        self.decision_anchor = 0.0;
        if let Some(set) = self.selection.clear() {
            self.events.push_back(EngineEvent::SelectionChanged(set));
        }
        self.materialize_initial()
    }

    // --- Input ---

    /// Primary click on a record. Single-select replaces the selection and
    /// activates the record; multi-select toggles it.
    pub fn click(&mut self, id: RecordId) {
        let snapshot = self.selection.click(id);
        self.events.push_back(EngineEvent::SelectionChanged(snapshot));
        if self.selection.mode() == SelectionMode::Single {
            self.events.push_back(EngineEvent::Activated(id));
        }
    }

    /// Primary click at a viewport position. Returns the record id that was
    /// hit, if any.
    pub fn click_at(&mut self, x: f32, y: f32) -> Option<RecordId> {
        let id = self.hit_test(x, y)?;
        self.click(id);
        Some(id)
    }

    /// Record under a viewport position, margins excluded.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<RecordId> {
        let index = self
            .layout
            .index_at(x, y + self.scroll_y, self.materialized)?;
        if let Some(&slot) = self.placements.get(&index) {
            return self.pool.get(slot).and_then(|tile| tile.record_id);
        }
        // Evicted hole: fall back to the source for the id.
        self.source.record(index).ok().map(|record| record.id)
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        if let Some(set) = self.selection.set_mode(mode) {
            self.events.push_back(EngineEvent::SelectionChanged(set));
        }
    }

    /// Select every record in the window, materialized or not.
    pub fn select_all(&mut self) {
        let ids: Vec<RecordId> = (0..self.materialized)
            .filter_map(|i| self.source.record(i).ok())
            .map(|record| record.id)
            .collect();
        let snapshot = self.selection.select_all(ids);
        self.events.push_back(EngineEvent::SelectionChanged(snapshot));
    }

    pub fn clear_selection(&mut self) {
        if let Some(set) = self.selection.clear() {
            self.events.push_back(EngineEvent::SelectionChanged(set));
        }
    }

    // --- Host-facing state ---

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn tile(&self, slot: SlotId) -> Option<&Tile> {
        self.pool.get(slot)
    }

    /// Materialized tiles with their record indices, paint-ready.
    pub fn tiles(&self) -> impl Iterator<Item = (usize, &Tile)> {
        self.placements
            .iter()
            .filter_map(|(&index, &slot)| self.pool.get(slot).map(|tile| (index, tile)))
    }

    /// Tiles currently backing records (excludes the pool's free list).
    pub fn materialized_count(&self) -> usize {
        self.placements.len()
    }

    /// Logical window size; never shrinks.
    pub fn window_len(&self) -> usize {
        self.materialized
    }

    pub fn record_count(&self) -> usize {
        self.source.count()
    }

    pub fn viewport(&self) -> (f32, f32) {
        (self.viewport_w, self.viewport_h)
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_y
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn is_selected(&self, id: RecordId) -> bool {
        self.selection.is_selected(id)
    }

    pub fn selection_snapshot(&self) -> Vec<RecordId> {
        self.selection.snapshot()
    }

    /// True while decodes are pending or in flight.
    pub fn is_loading(&self) -> bool {
        !self.scheduler.is_idle()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    // --- Delivery ---

    fn apply_delivery(&mut self, delivery: Delivery) {
        let Some(tile) = self.pool.get_mut(delivery.slot) else {
            self.stats.stale_dropped += 1;
            debug!(
                "dropping decode result for destroyed slot {:?} (record {})",
                delivery.slot, delivery.record_id
            );
            return;
        };
        if tile.state == TileState::Free || tile.generation != delivery.generation {
            self.stats.stale_dropped += 1;
            debug!(
                "dropping stale decode result for slot {:?}: generation {} vs current {}",
                delivery.slot, delivery.generation, tile.generation
            );
            return;
        }
        match delivery.result {
            Ok(pixels) => {
                tile.pixels = Some(pixels);
                tile.state = TileState::Ready;
            }
            Err(err) => {
                self.stats.decode_failures += 1;
                warn!(
                    "thumbnail decode failed for record {}: {err}",
                    delivery.record_id
                );
                tile.state = TileState::Failed;
            }
        }
        self.events
            .push_back(EngineEvent::TileReady { slot: delivery.slot });
    }
}
