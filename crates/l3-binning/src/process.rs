//! End-to-end binning run: filter, scan, seal, composite, write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use l3_common::BoundingBox;
use tracing::{info, warn};

use crate::binner::{ScanStats, SpatialProductBinner};
use crate::collector::ScanContext;
use crate::config::BinningConfig;
use crate::context::BinningContext;
use crate::error::{BinningError, Result};
use crate::filter::RegionFilter;
use crate::product::Product;
use crate::progress::ProgressMonitor;
use crate::source::CollectorBinSource;
use crate::temporal::TemporalBinner;
use crate::writer::{BinWriter, WriteSummary};

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct BinningSummary {
    pub region: BoundingBox,
    /// Products that were scanned, in scan order.
    pub products_binned: Vec<String>,
    /// Products left out, with the filter that rejected them.
    pub products_excluded: Vec<(String, &'static str)>,
    pub stats: ScanStats,
    /// Distinct cells holding at least one spatial bin.
    pub cells: usize,
    pub time_coverage: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub output: WriteSummary,
}

/// Runs a [`BinningConfig`] over a set of products.
#[derive(Debug, Clone)]
pub struct BinningProcess {
    config: BinningConfig,
}

impl BinningProcess {
    /// Validate the configuration up front.
    pub fn new(config: BinningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    /// Output path of the configuration.
    pub fn output_path(&self) -> &PathBuf {
        &self.config.output.path
    }

    /// The configured region, or the union of the product footprints.
    ///
    /// The first product is the reference product and must be geo-located;
    /// other products without geo-coding do not widen the region.
    pub fn region(&self, products: &[&dyn Product]) -> Result<BoundingBox> {
        if let Some(region) = self.config.region {
            return Ok(region);
        }
        let reference = products
            .first()
            .ok_or_else(|| BinningError::configuration("no source products"))?;
        let footprint = reference.footprint().ok_or_else(|| {
            BinningError::geo_coding(
                reference.name(),
                "the reference product defines the default region and must be geo-located",
            )
        })?;
        Ok(products[1..]
            .iter()
            .filter_map(|p| p.footprint())
            .fold(footprint, |region, f| region.union(&f)))
    }

    pub fn run(&self, products: &[&dyn Product], progress: &dyn ProgressMonitor) -> Result<BinningSummary> {
        let start = Instant::now();
        let ctx = Arc::new(self.config.build_context()?);
        let region = self.region(products)?;
        info!(
            num_rows = ctx.grid().num_rows(),
            total_bins = ctx.grid().total_bins(),
            compositing_type = %ctx.compositing_type(),
            super_sampling = ctx.super_sampling(),
            region = %region,
            products = products.len(),
            "Starting binning run"
        );

        let filter = self.config.product_filter()?.with(RegionFilter::new(region));
        let mut accepted: Vec<&dyn Product> = Vec::new();
        let mut excluded = Vec::new();
        for product in products {
            match filter.rejected_by(*product) {
                None => accepted.push(*product),
                Some(reason) => {
                    warn!(product = %product.name(), filter = reason, "Excluding product");
                    excluded.push((product.name().to_string(), reason));
                }
            }
        }
        accepted.sort_by_key(|p| p.start_time());

        let collector = self.config.collector.create(ctx.clone())?;
        let binner = SpatialProductBinner::new(ctx.clone(), self.config.parallelism, self.config.tile_size)?
            .with_region(self.config.region);

        let mut stats = ScanStats::default();
        for (scan, product) in accepted.iter().enumerate() {
            if progress.is_cancelled() {
                info!("Binning run cancelled");
                return Err(BinningError::Cancelled);
            }
            let scan_stats = binner.process_product(
                *product,
                collector.as_consumer(),
                ScanContext { scan: scan as u32 },
                progress,
            )?;
            stats.add(&scan_stats);
        }

        collector.consuming_completed()?;
        let cells = collector.cell_count()?;

        let time_coverage = time_coverage(&accepted);
        let mut writer = BinWriter::new(&ctx, &self.config.output.title);
        writer.set_attribute("product_count", accepted.len() as i32);
        if let Some((first, last)) = time_coverage {
            writer.set_time_coverage(first, last);
        }
        let mut source = CollectorBinSource::new(
            collector.as_ref(),
            TemporalBinner::new(ctx.clone()),
            self.config.num_parts,
        );
        let output = writer.write(&mut source, &self.config.output.path)?;

        info!(
            products_binned = accepted.len(),
            products_excluded = excluded.len(),
            cells,
            bins_written = output.bins_written,
            duration_ms = start.elapsed().as_millis() as u64,
            "Binning run complete"
        );

        Ok(BinningSummary {
            region,
            products_binned: accepted.iter().map(|p| p.name().to_string()).collect(),
            products_excluded: excluded,
            stats,
            cells,
            time_coverage,
            output,
        })
    }

    /// Build the shared context without running.
    pub fn context(&self) -> Result<BinningContext> {
        self.config.build_context()
    }
}

fn time_coverage(products: &[&dyn Product]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = products.iter().filter_map(|p| p.start_time()).min()?;
    let last = products
        .iter()
        .filter_map(|p| p.end_time().or_else(|| p.start_time()))
        .max()?;
    Some((first, last))
}
