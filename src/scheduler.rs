use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use rustc_hash::FxHashSet;

use crate::PixelBuffer;
use crate::RecordId;
use crate::config::EngineConfig;
use crate::decode::Decoder;
use crate::error::DecodeError;
use crate::pool::SlotId;

/// Work order for one slot assignment. Carries the source paths so workers
/// never reach back into control-thread state.
#[derive(Debug, Clone)]
pub struct LoadTask {
    pub slot: SlotId,
    pub generation: u64,
    pub record_id: RecordId,
    pub filepath: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
}

impl LoadTask {
    fn key(&self) -> (SlotId, u64) {
        (self.slot, self.generation)
    }
}

/// Decode outcome for one task. The control thread validates
/// `(slot, generation)` against the slot's current assignment before any
/// tile is touched.
#[derive(Debug)]
pub struct Delivery {
    pub slot: SlotId,
    pub generation: u64,
    pub record_id: RecordId,
    pub result: Result<PixelBuffer, DecodeError>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub delivered: u64,
    /// Not-visible tasks refused because the pending queue was at its cap.
    pub dropped_full: u64,
}

/// FIFO load queue in front of a fixed pool of decode workers.
///
/// Dispatch is batched: each tick hands at most `dispatch_batch` tasks to the
/// workers, bounding how many repaints a fast decoder can force per tick.
/// Results come back over a single-consumer channel drained with `try_recv`
/// on the control thread.
pub struct LoadScheduler {
    pending: VecDeque<LoadTask>,
    queued: FxHashSet<(SlotId, u64)>,
    task_tx: Option<Sender<LoadTask>>,
    result_rx: Receiver<Delivery>,
    workers: Vec<JoinHandle<()>>,
    queue_cap: usize,
    dispatch_batch: usize,
    in_flight: usize,
    stats: SchedulerStats,
}

impl LoadScheduler {
    pub fn new(cfg: &EngineConfig, decoder: Arc<dyn Decoder>) -> Self {
        let (task_tx, task_rx) = unbounded::<LoadTask>();
        let (result_tx, result_rx) = unbounded::<Delivery>();

        let workers = (0..cfg.worker_count.max(1))
            .map(|_| {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                let decoder = Arc::clone(&decoder);
                thread::spawn(move || {
                    while let Ok(task) = rx.recv() {
                        let result =
                            decoder.decode(&task.filepath, task.thumbnail_path.as_deref());
                        let _ = tx.send(Delivery {
                            slot: task.slot,
                            generation: task.generation,
                            record_id: task.record_id,
                            result,
                        });
                    }
                })
            })
            .collect();

        Self {
            pending: VecDeque::new(),
            queued: FxHashSet::default(),
            task_tx: Some(task_tx),
            result_rx,
            workers,
            queue_cap: cfg.queue_cap,
            dispatch_batch: cfg.dispatch_batch.max(1),
            in_flight: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Append a task. A no-op when the same `(slot, generation)` is already
    /// pending. At the cap, not-visible tasks are dropped instead of
    /// blocking; visible ones are always accepted.
    pub fn enqueue(&mut self, task: LoadTask, visible: bool) -> bool {
        let key = task.key();
        if self.queued.contains(&key) {
            return false;
        }
        if self.pending.len() >= self.queue_cap && !visible {
            self.stats.dropped_full += 1;
            debug!(
                "load queue full ({}), dropping off-screen task for record {}",
                self.pending.len(),
                task.record_id
            );
            return false;
        }
        self.queued.insert(key);
        self.pending.push_back(task);
        self.stats.enqueued += 1;
        true
    }

    /// One dispatch tick: hand at most `dispatch_batch` tasks to the worker
    /// pool. Returns how many were sent.
    pub fn dispatch(&mut self) -> usize {
        let Some(tx) = &self.task_tx else { return 0 };
        let mut sent = 0;
        while sent < self.dispatch_batch {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&task.key());
            if tx.send(task).is_err() {
                break;
            }
            self.in_flight += 1;
            self.stats.dispatched += 1;
            sent += 1;
        }
        sent
    }

    /// Drain every finished decode without blocking.
    pub fn try_deliveries(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = self.result_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.stats.delivered += 1;
            out.push(delivery);
        }
        out
    }

    pub fn queue_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

impl Drop for LoadScheduler {
    fn drop(&mut self) {
        // Closing the task channel ends the worker loops.
        self.task_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::{Duration, Instant};

    /// Decodes any path whose file stem parses as a number into a 1x1 pixel
    /// carrying that number; everything else fails.
    struct StemDecoder;

    impl Decoder for StemDecoder {
        fn decode(
            &self,
            filepath: &Path,
            _thumbnail_path: Option<&Path>,
        ) -> Result<PixelBuffer, DecodeError> {
            let value: u8 = filepath
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| DecodeError::NoSource {
                    filepath: filepath.to_path_buf(),
                })?;
            Ok(PixelBuffer::new(1, 1, vec![value, value, value, 255]))
        }
    }

    fn task(slot: u32, generation: u64, record_id: RecordId) -> LoadTask {
        LoadTask {
            slot: SlotId(slot),
            generation,
            record_id,
            filepath: PathBuf::from(format!("/p/{record_id}.jpg")),
            thumbnail_path: None,
        }
    }

    fn cfg(queue_cap: usize, dispatch_batch: usize) -> EngineConfig {
        EngineConfig {
            queue_cap,
            dispatch_batch,
            worker_count: 2,
            ..EngineConfig::default()
        }
    }

    fn drain_until(sched: &mut LoadScheduler, wanted: usize) -> Vec<Delivery> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while got.len() < wanted {
            got.extend(sched.try_deliveries());
            assert!(Instant::now() < deadline, "timed out waiting for deliveries");
            thread::sleep(Duration::from_millis(2));
        }
        got
    }

    #[test]
    fn enqueue_is_idempotent_per_assignment() {
        let mut sched = LoadScheduler::new(&cfg(16, 3), Arc::new(StemDecoder));
        assert!(sched.enqueue(task(0, 1, 10), true));
        assert!(!sched.enqueue(task(0, 1, 10), true));
        // A new generation of the same slot is a different assignment.
        assert!(sched.enqueue(task(0, 2, 11), true));
        assert_eq!(sched.queue_len(), 2);
    }

    #[test]
    fn dispatch_drains_bounded_batches_in_fifo_order() {
        let mut sched = LoadScheduler::new(&cfg(16, 3), Arc::new(StemDecoder));
        for i in 0..7 {
            sched.enqueue(task(i, 1, i as RecordId), true);
        }
        assert_eq!(sched.dispatch(), 3);
        assert_eq!(sched.dispatch(), 3);
        assert_eq!(sched.dispatch(), 1);
        assert_eq!(sched.dispatch(), 0);

        let mut delivered = drain_until(&mut sched, 7);
        delivered.sort_by_key(|d| d.record_id);
        for (i, d) in delivered.iter().enumerate() {
            let pixels = d.result.as_ref().unwrap();
            assert_eq!(pixels.data[0] as usize, i);
        }
        assert!(sched.is_idle());
    }

    #[test]
    fn cap_drops_only_offscreen_tasks() {
        let mut sched = LoadScheduler::new(&cfg(2, 3), Arc::new(StemDecoder));
        assert!(sched.enqueue(task(0, 1, 0), false));
        assert!(sched.enqueue(task(1, 1, 1), false));
        assert!(!sched.enqueue(task(2, 1, 2), false));
        assert!(sched.enqueue(task(3, 1, 3), true));
        assert_eq!(sched.queue_len(), 3);
        assert_eq!(sched.stats().dropped_full, 1);
    }

    #[test]
    fn decode_failures_are_delivered_not_fatal() {
        let mut sched = LoadScheduler::new(&cfg(16, 8), Arc::new(StemDecoder));
        let mut bad = task(0, 1, 17);
        bad.filepath = PathBuf::from("/p/broken.jpg");
        sched.enqueue(bad, true);
        sched.enqueue(task(1, 1, 18), true);
        sched.dispatch();

        let delivered = drain_until(&mut sched, 2);
        let failed = delivered.iter().find(|d| d.record_id == 17).unwrap();
        assert!(failed.result.is_err());
        let ok = delivered.iter().find(|d| d.record_id == 18).unwrap();
        assert!(ok.result.is_ok());
    }
}
