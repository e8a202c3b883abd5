//! Spatial/temporal binning of Earth-observation rasters.
//!
//! Pixels of one or more source products are aggregated into the cells of
//! a fixed global equal-area grid, composited over time, and written as a
//! row/list binned file.
//!
//! # Architecture
//!
//! ```text
//! Product ──► SpatialProductBinner (rayon pool, one task per tile)
//!                 │  GridIndex places each sub-sample
//!                 │  BinManager aggregates into per-tile SpatialBins
//!                 ▼
//!             SpatialBinCollector (memory | spill file)
//!                 │  consuming_completed() seals, ascending cell ids
//!                 ▼
//!             CollectorBinSource ─► TemporalBinner (BINNING | MOSAICKING)
//!                 │
//!                 ▼
//!             BinWriter ─► bin_index + bin_list tables
//! ```
//!
//! [`BinningProcess`] wires the stages together from a [`BinningConfig`].
//!
//! # Example
//!
//! ```ignore
//! use l3_binning::{BinningConfig, BinningProcess, NullProgress};
//!
//! let config = BinningConfig::from_file("request.yaml")?;
//! let process = BinningProcess::new(config)?;
//! let summary = process.run(&products, &NullProgress)?;
//! println!("{} bins written", summary.output.bins_written);
//! ```

pub mod aggregator;
pub mod binner;
pub mod bins;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod filter;
pub mod grid;
pub mod manager;
pub mod postprocess;
pub mod process;
pub mod product;
pub mod progress;
pub mod source;
pub mod temporal;
pub mod variable;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at crate root
pub use aggregator::{Aggregator, AggregatorConfig};
pub use binner::{super_sampling_offsets, ScanStats, SpatialProductBinner};
pub use bins::{CellGroup, SpatialBin, TemporalBin};
pub use collector::{
    CollectorConfig, MemoryCollector, ScanContext, SpatialBinCollector, SpatialBinConsumer, SpillCollector,
};
pub use config::{BinningConfig, OutputConfig, TimeFilterConfig};
pub use context::{BinningContext, CompositingType};
pub use error::{BinningError, Result};
pub use filter::{
    ChainedFilter, GeoCodingFilter, RegionFilter, SourceProductFilter, SpatialDataDayFilter, TimeFilter,
};
pub use grid::GridIndex;
pub use manager::BinManager;
pub use postprocess::{PostProcessor, PostProcessorConfig};
pub use process::{BinningProcess, BinningSummary};
pub use product::{AffineGeoCoding, GeoCoding, GeoPos, PixelGeoCoding, Product, RasterProduct, TileRect};
pub use progress::{AtomicProgress, NullProgress, ProgressMonitor};
pub use source::{CollectorBinSource, TemporalBinSource, VecTemporalBinSource, ALL_PARTS};
pub use temporal::TemporalBinner;
pub use variable::{VariableConfig, VariableContext};
pub use writer::{BinFileReader, BinWriter, WriteSummary};
