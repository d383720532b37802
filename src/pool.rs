use crate::{PhotoRecord, PixelBuffer, RecordId};

/// Pool-local slot handle. Indices are reused after a slot is destroyed, so a
/// slot alone never identifies an assignment: `(SlotId, generation)` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Free,
    Assigned,
    Loading,
    Ready,
    Failed,
}

/// One grid cell's display state. Created by the pool, mutated only on the
/// control thread: assignment, delivery, reclamation.
#[derive(Debug)]
pub struct Tile {
    pub slot: SlotId,
    /// Bumped on every reassignment. A delivery carrying an older value is
    /// for a previous occupant of this slot and must be dropped.
    pub generation: u64,
    pub record_id: Option<RecordId>,
    pub state: TileState,
    pub pixels: Option<PixelBuffer>,
    pub row: usize,
    pub col: usize,
    // Display state copied from the record so the host can paint captions
    // without consulting the source again.
    pub filename: String,
    pub rating: u8,
    pub is_favorite: bool,
}

impl Tile {
    fn assign(&mut self, generation: u64, record: &PhotoRecord, row: usize, col: usize) {
        self.generation = generation;
        self.record_id = Some(record.id);
        self.state = TileState::Assigned;
        self.pixels = None;
        self.row = row;
        self.col = col;
        self.filename = record.filename.clone();
        self.rating = record.rating;
        self.is_favorite = record.is_favorite;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PoolStats {
    pub acquired: u64,
    /// Acquires satisfied from the free list.
    pub reused: u64,
    /// Acquires that created a tile object.
    pub allocated: u64,
    pub released: u64,
    /// Releases past the retain bound that dropped the tile object.
    pub destroyed: u64,
}

/// Bounded recycling pool of tile slots.
///
/// Released tiles are retained (buffers included) in a free list capped at
/// `max_cache_size`; releases past that bound destroy the tile object so peak
/// memory stays bounded. Live tiles never exceed `ceiling`.
///
/// Generations live in a side table indexed by slot so they stay monotonic
/// even when a destroyed slot index is later reused.
#[derive(Debug)]
pub struct TilePool {
    slots: Vec<Option<Tile>>,
    generations: Vec<u64>,
    free: Vec<u32>,
    vacant: Vec<u32>,
    max_cache_size: usize,
    ceiling: usize,
    live: usize,
    stats: PoolStats,
}

impl TilePool {
    pub fn new(max_cache_size: usize, ceiling: usize) -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            vacant: Vec::new(),
            max_cache_size,
            ceiling,
            live: 0,
            stats: PoolStats::default(),
        }
    }

    /// Bind a slot to `record`. Prefers a recycled tile; allocates below the
    /// ceiling; errors at the ceiling so the caller can run an eviction pass
    /// and retry.
    pub fn acquire(
        &mut self,
        record: &PhotoRecord,
        row: usize,
        col: usize,
    ) -> Result<SlotId, crate::error::PoolExhausted> {
        if let Some(i) = self.free.pop() {
            self.stats.acquired += 1;
            self.stats.reused += 1;
            let generation = self.bump_generation(i);
            let tile = self.slots[i as usize]
                .as_mut()
                .expect("free list entry points at destroyed slot");
            tile.assign(generation, record, row, col);
            return Ok(SlotId(i));
        }
        if self.live >= self.ceiling {
            return Err(crate::error::PoolExhausted {
                live: self.live,
                ceiling: self.ceiling,
            });
        }
        self.stats.acquired += 1;
        self.stats.allocated += 1;
        let i = match self.vacant.pop() {
            Some(i) => i,
            None => {
                let i = self.slots.len() as u32;
                self.slots.push(None);
                self.generations.push(0);
                i
            }
        };
        let generation = self.bump_generation(i);
        let mut tile = Tile {
            slot: SlotId(i),
            generation,
            record_id: None,
            state: TileState::Free,
            pixels: None,
            row: 0,
            col: 0,
            filename: String::new(),
            rating: 0,
            is_favorite: false,
        };
        tile.assign(generation, record, row, col);
        self.slots[i as usize] = Some(tile);
        self.live += 1;
        Ok(SlotId(i))
    }

    /// Return a tile to the free list, or destroy it once the retain bound is
    /// reached.
    pub fn release(&mut self, slot: SlotId) {
        let i = slot.0 as usize;
        let tile = self.slots[i]
            .as_mut()
            .expect("release of destroyed tile slot");
        assert!(tile.state != TileState::Free, "double release of tile slot");
        self.stats.released += 1;
        if self.free.len() >= self.max_cache_size {
            self.stats.destroyed += 1;
            self.slots[i] = None;
            self.vacant.push(slot.0);
            self.live -= 1;
        } else {
            tile.record_id = None;
            tile.state = TileState::Free;
            self.free.push(slot.0);
        }
    }

    pub fn get(&self, slot: SlotId) -> Option<&Tile> {
        self.slots.get(slot.index())?.as_ref()
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut Tile> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// Live tile objects, retained free tiles included.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn assigned(&self) -> usize {
        self.live - self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn bump_generation(&mut self, i: u32) -> u64 {
        let generation = &mut self.generations[i as usize];
        *generation += 1;
        *generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(id: i64) -> PhotoRecord {
        PhotoRecord {
            id,
            filename: format!("{id}.jpg"),
            filepath: PathBuf::from(format!("/p/{id}.jpg")),
            thumbnail_path: None,
            width: 100,
            height: 100,
            rating: 3,
            is_favorite: id % 2 == 0,
        }
    }

    #[test]
    fn acquire_assigns_and_copies_display_state() {
        let mut pool = TilePool::new(4, 8);
        let slot = pool.acquire(&record(7), 2, 1).unwrap();
        let tile = pool.get(slot).unwrap();
        assert_eq!(tile.record_id, Some(7));
        assert_eq!(tile.state, TileState::Assigned);
        assert_eq!((tile.row, tile.col), (2, 1));
        assert_eq!(tile.filename, "7.jpg");
        assert_eq!(tile.rating, 3);
        assert!(tile.pixels.is_none());
    }

    #[test]
    fn release_recycles_and_reuse_bumps_generation() {
        let mut pool = TilePool::new(4, 8);
        let slot = pool.acquire(&record(1), 0, 0).unwrap();
        let first_gen = pool.get(slot).unwrap().generation;
        pool.release(slot);
        assert_eq!(pool.get(slot).unwrap().state, TileState::Free);

        let again = pool.acquire(&record(2), 0, 1).unwrap();
        assert_eq!(again, slot);
        let tile = pool.get(again).unwrap();
        assert_eq!(tile.record_id, Some(2));
        assert!(tile.generation > first_gen);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn free_list_never_exceeds_cache_bound() {
        let mut pool = TilePool::new(2, 16);
        let slots: Vec<_> = (0..6)
            .map(|i| pool.acquire(&record(i), 0, 0).unwrap())
            .collect();
        for slot in slots {
            pool.release(slot);
            assert!(pool.free_len() <= 2);
        }
        assert_eq!(pool.free_len(), 2);
        assert_eq!(pool.stats().destroyed, 4);
        assert_eq!(pool.live(), 2);
    }

    #[test]
    fn ceiling_is_hard() {
        let mut pool = TilePool::new(8, 3);
        for i in 0..3 {
            pool.acquire(&record(i), 0, 0).unwrap();
        }
        let err = pool.acquire(&record(99), 0, 0).unwrap_err();
        assert_eq!(err.live, 3);
        assert_eq!(err.ceiling, 3);
        // Bound from the pool-bound property: live <= retained free + assigned.
        assert!(pool.live() <= pool.free_len() + pool.assigned());
    }

    #[test]
    fn generations_survive_destroy_and_index_reuse() {
        // Retain nothing: every release destroys, every acquire recreates.
        let mut pool = TilePool::new(0, 4);
        let slot = pool.acquire(&record(1), 0, 0).unwrap();
        let g1 = pool.get(slot).unwrap().generation;
        pool.release(slot);
        assert!(pool.get(slot).is_none());

        let reborn = pool.acquire(&record(2), 0, 0).unwrap();
        assert_eq!(reborn, slot);
        let g2 = pool.get(reborn).unwrap().generation;
        assert!(g2 > g1, "generation must not restart on index reuse");
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_panics() {
        let mut pool = TilePool::new(4, 8);
        let slot = pool.acquire(&record(1), 0, 0).unwrap();
        pool.release(slot);
        pool.release(slot);
    }
}
