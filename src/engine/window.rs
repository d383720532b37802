use log::warn;

use super::GridEngine;
use crate::error::RecordSourceError;
use crate::pool::TileState;
use crate::scheduler::LoadTask;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Materialize {
    Placed,
    AlreadyPlaced,
    /// Acquire failed even after a forced eviction pass; stop materializing
    /// until the view moves.
    PoolSaturated,
}

/// Materialize the first page, releasing any previous window first.
pub(super) fn materialize_initial(engine: &mut GridEngine) -> Result<usize, RecordSourceError> {
    for (_, slot) in engine.placements.drain() {
        engine.pool.release(slot);
    }
    engine.materialized = 0;
    let end = engine.cfg.page_size.min(engine.source.count());
    materialize_range(engine, 0, end)
}

/// Grow the window by one page; no-op at the tail.
pub(super) fn load_next_page(engine: &mut GridEngine) -> Result<usize, RecordSourceError> {
    let count = engine.source.count();
    if engine.materialized >= count {
        return Ok(0);
    }
    let start = engine.materialized;
    let end = (start + engine.cfg.page_size).min(count);
    let added = materialize_range(engine, start, end)?;
    if added > 0 {
        engine.stats.pages_loaded += 1;
    }
    Ok(added)
}

fn materialize_range(
    engine: &mut GridEngine,
    start: usize,
    end: usize,
) -> Result<usize, RecordSourceError> {
    let mut added = 0;
    for index in start..end {
        match materialize_index(engine, index)? {
            Materialize::Placed => added += 1,
            Materialize::AlreadyPlaced => {}
            Materialize::PoolSaturated => break,
        }
    }
    Ok(added)
}

/// Bind one record index to a pooled tile and queue its decode. A source
/// error abandons the materialization in progress; tiles already placed stay
/// as they are.
pub(super) fn materialize_index(
    engine: &mut GridEngine,
    index: usize,
) -> Result<Materialize, RecordSourceError> {
    if engine.placements.contains_key(&index) {
        engine.materialized = engine.materialized.max(index + 1);
        return Ok(Materialize::AlreadyPlaced);
    }
    let record = engine.source.record(index)?;
    let (row, col) = engine.layout.place(index);
    let slot = match engine.pool.acquire(&record, row, col) {
        Ok(slot) => slot,
        Err(_) => {
            // At the ceiling: reclaim off-screen tiles, then retry once.
            super::evict::run(engine);
            match engine.pool.acquire(&record, row, col) {
                Ok(slot) => slot,
                Err(err) => {
                    warn!("cannot materialize record {}: {err}", record.id);
                    return Ok(Materialize::PoolSaturated);
                }
            }
        }
    };
    engine.placements.insert(index, slot);
    engine.materialized = engine.materialized.max(index + 1);

    let (first_row, last_row) = buffered_rows(engine);
    let visible = (first_row..=last_row).contains(&row);
    let generation = engine
        .pool
        .get(slot)
        .map(|tile| tile.generation)
        .unwrap_or_default();
    let task = LoadTask {
        slot,
        generation,
        record_id: record.id,
        filepath: record.filepath,
        thumbnail_path: record.thumbnail_path,
    };
    if engine.scheduler.enqueue(task, visible)
        && let Some(tile) = engine.pool.get_mut(slot)
    {
        tile.state = TileState::Loading;
    }
    Ok(Materialize::Placed)
}

/// Turn the newest scroll target into at most one pagination/refill
/// decision. Sub-threshold jitter moves the offset but decides nothing;
/// movement accumulates against the last decision position.
pub(super) fn apply_scroll_decision(engine: &mut GridEngine, now: Instant) {
    let Some(target) = engine.pending_scroll.take() else {
        return;
    };
    let max_scroll = (engine.layout.content_height(engine.materialized) - engine.viewport_h)
        .max(0.0);
    let target = target.clamp(0.0, max_scroll);
    engine.scroll_y = target;
    if (target - engine.decision_anchor).abs() < engine.cfg.scroll_min_delta_px {
        return;
    }
    engine.decision_anchor = target;
    engine.last_decision = Some(now);

    if engine.materialized < engine.source.count()
        && engine
            .layout
            .distance_to_bottom(engine.scroll_y, engine.viewport_h, engine.materialized)
            <= engine.cfg.bottom_trigger_px
        && let Err(err) = load_next_page(engine)
    {
        warn!("pagination abandoned: {err}");
    }
    refill_visible(engine);
}

/// Re-materialize evicted indices that scrolled back into the buffered
/// visible range. Cache misses: fresh acquire, fresh decode.
pub(super) fn refill_visible(engine: &mut GridEngine) {
    let (first_row, last_row) = buffered_rows(engine);
    let columns = engine.layout.columns();
    let start = first_row * columns;
    let end = ((last_row + 1) * columns).min(engine.materialized);
    for index in start..end {
        match materialize_index(engine, index) {
            Ok(Materialize::PoolSaturated) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("refill abandoned: {err}");
                break;
            }
        }
    }
}

/// Visible row range widened by the eviction buffer.
pub(super) fn buffered_rows(engine: &GridEngine) -> (usize, usize) {
    let (first, last) = engine
        .layout
        .visible_rows(engine.scroll_y, engine.viewport_h);
    (
        first.saturating_sub(engine.cfg.eviction_buffer_rows),
        last + engine.cfg.eviction_buffer_rows,
    )
}
