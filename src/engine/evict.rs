use std::time::Instant;

use super::GridEngine;

/// The evictor fires on its own cadence, or immediately once the
/// materialized tile count exceeds the visible budget.
pub(super) fn due(engine: &GridEngine, now: Instant) -> bool {
    if engine.placements.len() > engine.cfg.max_visible_items {
        return true;
    }
    engine
        .last_eviction
        .is_none_or(|t| now.duration_since(t) >= engine.cfg.eviction_interval)
}

/// One eviction pass: every materialized tile whose row lies outside the
/// buffered visible range goes back to the pool. Window membership is
/// untouched; a reclaimed index is a cache miss if it scrolls back in.
pub(super) fn run(engine: &mut GridEngine) -> usize {
    let (first_row, last_row) = super::window::buffered_rows(engine);
    let doomed: Vec<(usize, crate::pool::SlotId)> = engine
        .placements
        .iter()
        .filter(|&(&index, _)| {
            let row = engine.layout.row_of(index);
            row < first_row || row > last_row
        })
        .map(|(&index, &slot)| (index, slot))
        .collect();

    for &(index, slot) in &doomed {
        engine.placements.remove(&index);
        engine.pool.release(slot);
    }
    engine.stats.evicted_tiles += doomed.len() as u64;
    doomed.len()
}
