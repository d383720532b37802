use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::info;

use picgrid::{
    Decoder, DecodeError, EngineConfig, EngineEvent, GridEngine, PhotoRecord, PixelBuffer,
    RecordId, SelectionMode, VecSource,
};

/// Drives the grid engine against a synthetic photo collection: scrolls from
/// top to bottom, paginating, decoding and evicting along the way, then
/// prints the counters. Useful for eyeballing cache behavior under different
/// tunables without a real photo library.
#[derive(Parser, Debug)]
#[command(version, about = "Stress the virtualized thumbnail grid engine.")]
struct Cli {
    /// Synthetic records in the collection
    #[arg(long, default_value_t = 1000)]
    records: usize,

    #[arg(long, default_value_t = 900.0)]
    viewport_width: f32,

    #[arg(long, default_value_t = 600.0)]
    viewport_height: f32,

    /// Simulated decode latency per thumbnail, in milliseconds
    #[arg(long, default_value_t = 4)]
    decode_ms: u64,

    /// Fail every Nth decode (0 = never fail)
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    /// Scroll distance per simulated frame, in pixels
    #[arg(long, default_value_t = 120.0)]
    scroll_step: f32,

    /// Simulated frame interval, in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Optional TOML file overriding engine tunables
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn validate(&self) -> Result<(), String> {
        if self.records == 0 {
            return Err("Need at least one record".to_string());
        }
        if self.scroll_step <= 0.0 {
            return Err("Scroll step must be positive".to_string());
        }
        if self.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return Err("Viewport must be positive".to_string());
        }
        Ok(())
    }
}

/// Decoder stand-in: sleeps for the configured latency, then produces a flat
/// color derived from the record id. Optionally fails every Nth record.
struct SyntheticDecoder {
    latency: Duration,
    fail_every: u64,
}

impl Decoder for SyntheticDecoder {
    fn decode(
        &self,
        filepath: &std::path::Path,
        _thumbnail_path: Option<&std::path::Path>,
    ) -> Result<PixelBuffer, DecodeError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let id: u64 = filepath
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        if self.fail_every > 0 && id % self.fail_every == self.fail_every - 1 {
            return Err(DecodeError::NoSource {
                filepath: filepath.to_path_buf(),
            });
        }
        let shade = (id % 200 + 40) as u8;
        let mut data = Vec::with_capacity(32 * 32 * 4);
        for _ in 0..32 * 32 {
            data.extend_from_slice(&[shade, shade.wrapping_mul(3), shade.wrapping_mul(7), 255]);
        }
        Ok(PixelBuffer::new(32, 32, data))
    }
}

fn synthetic_records(count: usize) -> Vec<PhotoRecord> {
    (0..count)
        .map(|i| PhotoRecord {
            id: i as RecordId,
            filename: format!("img_{i:05}.jpg"),
            filepath: PathBuf::from(format!("/synthetic/{i}.jpg")),
            thumbnail_path: None,
            width: 4000,
            height: 3000,
            rating: (i % 6) as u8,
            is_favorite: i % 7 == 0,
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;

    let args = Cli::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let cfg = match &args.config {
        Some(path) => EngineConfig::from_file(path).context("loading engine config")?,
        None => EngineConfig::default(),
    };
    let decoder = Arc::new(SyntheticDecoder {
        latency: Duration::from_millis(args.decode_ms),
        fail_every: args.fail_every,
    });

    let source = Box::new(VecSource::new(synthetic_records(args.records)));
    let mut engine = GridEngine::new(
        source,
        decoder,
        cfg,
        args.viewport_width,
        args.viewport_height,
    );
    engine.materialize_initial()?;
    info!(
        "materialized first page: {} of {} records, {} columns",
        engine.window_len(),
        engine.record_count(),
        engine.layout().columns()
    );

    // Exercise multi-select on the first visible row before scrolling away.
    engine.set_selection_mode(SelectionMode::Multi);
    for id in 0..engine.layout().columns() as RecordId {
        engine.click(id);
    }

    let started = Instant::now();
    let mut offset = 0.0f32;
    let mut frames = 0u64;
    let mut repaints = 0u64;
    let mut selection_updates = 0u64;

    loop {
        frames += 1;
        offset += args.scroll_step;
        engine.scroll_to(offset);
        engine.pump(Instant::now());

        for event in engine.take_events() {
            match event {
                EngineEvent::TileReady { .. } => repaints += 1,
                EngineEvent::SelectionChanged(_) => selection_updates += 1,
                EngineEvent::Activated(_) => {}
            }
        }

        let full_window = engine.window_len() == engine.record_count();
        let at_bottom = engine
            .layout()
            .distance_to_bottom(engine.scroll_offset(), args.viewport_height, engine.window_len())
            <= 0.0;
        if full_window && at_bottom && !engine.is_loading() {
            break;
        }
        if frames > 1_000_000 {
            anyhow::bail!("simulation did not converge");
        }
        thread::sleep(Duration::from_millis(args.frame_ms));
    }

    let elapsed = started.elapsed();
    let stats = engine.stats();
    let pool = engine.pool_stats();
    let sched = engine.scheduler_stats();

    println!("\n=== gridsim: {} records in {:.1}s ({} frames) ===", args.records, elapsed.as_secs_f32(), frames);
    println!("window            : {}", engine.window_len());
    println!("materialized tiles: {}", engine.materialized_count());
    println!("pages loaded      : {}", stats.pages_loaded);
    println!("repaint events    : {repaints}");
    println!("selection updates : {selection_updates}, selected {}", engine.selection_snapshot().len());
    println!("tiles evicted     : {}", stats.evicted_tiles);
    println!("stale results     : {}", stats.stale_dropped);
    println!("decode failures   : {}", stats.decode_failures);
    println!(
        "pool              : {} acquired ({} reused, {} allocated), {} released, {} destroyed",
        pool.acquired, pool.reused, pool.allocated, pool.released, pool.destroyed
    );
    println!(
        "scheduler         : {} enqueued, {} dispatched, {} delivered, {} dropped at cap",
        sched.enqueued, sched.dispatched, sched.delivered, sched.dropped_full
    );
    Ok(())
}
