//! Parallel, tiled scan of one product into spatial bins.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use l3_common::BoundingBox;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, instrument};

use crate::bins::SpatialBin;
use crate::collector::{ScanContext, SpatialBinConsumer};
use crate::context::BinningContext;
use crate::error::{BinningError, Result};
use crate::product::{GeoCoding, Product, TileRect};
use crate::progress::ProgressMonitor;

/// Sub-pixel sample offsets `(2k - 1) / (2n)` for `k = 1..=n`.
pub fn super_sampling_offsets(n: i32) -> Vec<f64> {
    let n = n.max(1);
    (1..=n)
        .map(|k| (2 * k - 1) as f64 / (2 * n) as f64)
        .collect()
}

/// Counters of one product scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub tiles: u64,
    pub pixels: u64,
    /// Pixels rejected by the mask expression.
    pub masked_pixels: u64,
    /// Sub-samples accumulated into a bin.
    pub samples: u64,
    /// Sub-samples without a valid location, outside the region, or with
    /// no finite variable value.
    pub skipped_samples: u64,
    /// Spatial bins handed to the consumer.
    pub bins: u64,
}

impl ScanStats {
    pub(crate) fn add(&mut self, other: &ScanStats) {
        self.tiles += other.tiles;
        self.pixels += other.pixels;
        self.masked_pixels += other.masked_pixels;
        self.samples += other.samples;
        self.skipped_samples += other.skipped_samples;
        self.bins += other.bins;
    }
}

/// Scans products tile by tile on a dedicated worker pool.
pub struct SpatialProductBinner {
    ctx: Arc<BinningContext>,
    pool: ThreadPool,
    tile_size: usize,
    region: Option<BoundingBox>,
}

impl SpatialProductBinner {
    /// Create a binner with `parallelism` worker threads.
    pub fn new(ctx: Arc<BinningContext>, parallelism: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(BinningError::configuration("tile_size must be positive"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("l3bin-tile-{}", i))
            .build()
            .map_err(|e| BinningError::configuration(format!("failed to build worker pool: {}", e)))?;
        Ok(Self {
            ctx,
            pool,
            tile_size,
            region: None,
        })
    }

    /// Only bin samples located inside `region`.
    pub fn with_region(mut self, region: Option<BoundingBox>) -> Self {
        self.region = region;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Bin every pixel of `product` and push the spatial bins into
    /// `consumer`, one batch per tile.
    ///
    /// The first tile failure is kept and returned after running tiles
    /// drain; no tile starts after a failure or a cancellation request.
    #[instrument(skip_all, fields(product = %product.name(), scan = scan.scan))]
    pub fn process_product(
        &self,
        product: &dyn Product,
        consumer: &dyn SpatialBinConsumer,
        scan: ScanContext,
        progress: &dyn ProgressMonitor,
    ) -> Result<ScanStats> {
        let geo_coding = product
            .geo_coding()
            .ok_or_else(|| BinningError::geo_coding(product.name(), "no pixel to geo-location mapping"))?;

        let tiles = TileRect::tiles(product.width(), product.height(), self.tile_size);
        let start = Instant::now();
        info!(
            width = product.width(),
            height = product.height(),
            tiles = tiles.len(),
            super_sampling = self.ctx.super_sampling(),
            threads = self.parallelism(),
            "Scanning product"
        );

        let failure: Mutex<Option<BinningError>> = Mutex::new(None);
        let stats = Mutex::new(ScanStats::default());
        let cancelled = AtomicBool::new(false);
        let started = AtomicU64::new(0);

        self.pool.install(|| {
            tiles.par_iter().for_each(|rect| {
                if failure.lock().is_some() {
                    return;
                }
                if progress.is_cancelled() {
                    cancelled.store(true, Ordering::SeqCst);
                    return;
                }
                started.fetch_add(1, Ordering::Relaxed);

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.process_tile(product, geo_coding, *rect, consumer, scan)
                }))
                .unwrap_or_else(|payload| Err(BinningError::Worker(panic_message(payload.as_ref()))));

                match outcome {
                    Ok(tile_stats) => {
                        stats.lock().add(&tile_stats);
                        progress.worked(rect.len() as u64);
                    }
                    Err(e) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            debug!(x = rect.x, y = rect.y, error = %e, "Tile failed");
                            *slot = Some(e);
                        }
                    }
                }
            });
        });

        if let Some(e) = failure.into_inner() {
            return Err(e);
        }
        if cancelled.load(Ordering::SeqCst) {
            info!(tiles_started = started.load(Ordering::Relaxed), "Scan cancelled");
            return Err(BinningError::Cancelled);
        }

        let stats = stats.into_inner();
        info!(
            samples = stats.samples,
            masked_pixels = stats.masked_pixels,
            skipped_samples = stats.skipped_samples,
            bins = stats.bins,
            duration_ms = start.elapsed().as_millis() as u64,
            "Product scanned"
        );
        Ok(stats)
    }

    fn process_tile(
        &self,
        product: &dyn Product,
        geo_coding: &dyn GeoCoding,
        rect: TileRect,
        consumer: &dyn SpatialBinConsumer,
        scan: ScanContext,
    ) -> Result<ScanStats> {
        let variables = self.ctx.variables();
        let manager = self.ctx.bin_manager();
        let grid = self.ctx.grid();
        let offsets = super_sampling_offsets(self.ctx.super_sampling());
        let per_pixel = (offsets.len() * offsets.len()) as u64;

        let tile = variables.read_tile(product, rect)?;
        let mut stats = ScanStats {
            tiles: 1,
            pixels: rect.len() as u64,
            ..ScanStats::default()
        };
        let mut bins: HashMap<i64, SpatialBin> = HashMap::new();
        let mut values = vec![0.0f32; variables.len()];

        for j in 0..rect.height {
            for i in 0..rect.width {
                variables.pixel_values(&tile, j * rect.width + i, &mut values);
                if !variables.is_valid(&values) {
                    stats.masked_pixels += 1;
                    continue;
                }
                if !manager.accepts_sample(&values) {
                    stats.skipped_samples += per_pixel;
                    continue;
                }

                let x = (rect.x + i) as f64;
                let y = (rect.y + j) as f64;
                for dy in &offsets {
                    for dx in &offsets {
                        let pos = match geo_coding.pixel_to_geo(x + dx, y + dy) {
                            Some(pos) if pos.is_valid() => pos,
                            _ => {
                                stats.skipped_samples += 1;
                                continue;
                            }
                        };
                        if let Some(region) = &self.region {
                            if !region.contains_point(pos.lon, pos.lat) {
                                stats.skipped_samples += 1;
                                continue;
                            }
                        }
                        let cell_id = grid.cell_id(pos.lat, pos.lon);
                        let bin = bins
                            .entry(cell_id)
                            .or_insert_with(|| manager.create_spatial_bin(cell_id));
                        manager.aggregate_spatial_bin(&values, bin);
                        stats.samples += 1;
                    }
                }
            }
        }

        let mut completed: Vec<SpatialBin> = bins.into_values().collect();
        completed.sort_unstable_by_key(|b| b.cell_id);
        for bin in &mut completed {
            manager.complete_spatial_bin(bin);
        }
        stats.bins = completed.len() as u64;
        if !completed.is_empty() {
            consumer.consume_spatial_bins(&scan, completed)?;
        }
        Ok(stats)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
