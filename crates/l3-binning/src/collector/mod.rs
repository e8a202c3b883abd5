//! Sinks for spatial bins.
//!
//! Tile workers push completed spatial bins through
//! [`SpatialBinConsumer::consume_spatial_bins`] concurrently. Once every
//! product is scanned the collector is sealed and yields one [`CellGroup`]
//! per cell id, in ascending order, as often as asked.

mod memory;
mod spill;

pub use memory::MemoryCollector;
pub use spill::SpillCollector;

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bins::{CellGroup, SpatialBin};
use crate::context::BinningContext;
use crate::error::Result;

/// Identifies the scan a batch of spatial bins came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanContext {
    /// Position of the product in the run; later scans are more recent.
    pub scan: u32,
}

/// Receives batches of completed spatial bins.
pub trait SpatialBinConsumer: Send + Sync {
    fn consume_spatial_bins(&self, scan: &ScanContext, bins: Vec<SpatialBin>) -> Result<()>;
}

/// Iterator over the groups of a sealed collector.
pub type CollectedBins<'a> = Box<dyn Iterator<Item = Result<CellGroup>> + Send + 'a>;

/// A consumer that can be sealed and read back in cell-id order.
pub trait SpatialBinCollector: SpatialBinConsumer {
    fn as_consumer(&self) -> &dyn SpatialBinConsumer;

    /// Seal the collector. Further batches are rejected.
    fn consuming_completed(&self) -> Result<()>;

    fn is_sealed(&self) -> bool;

    /// Number of distinct cells collected. Only valid once sealed.
    fn cell_count(&self) -> Result<usize>;

    /// Groups whose cell id lies in `cells`, ascending. Only valid once
    /// sealed; every call starts a fresh pass.
    fn collected_bins_in(&self, cells: Range<i64>) -> Result<CollectedBins<'_>>;

    /// All groups, ascending.
    fn collected_bins(&self) -> Result<CollectedBins<'_>> {
        self.collected_bins_in(i64::MIN..i64::MAX)
    }
}

/// Which collector a run uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorConfig {
    #[default]
    Memory,
    /// Spill records to a temporary file, in `directory` or the system
    /// temp dir.
    Spill {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        directory: Option<PathBuf>,
    },
}

impl CollectorConfig {
    pub fn create(&self, ctx: Arc<BinningContext>) -> Result<Box<dyn SpatialBinCollector>> {
        Ok(match self {
            Self::Memory => Box::new(MemoryCollector::new(ctx)),
            Self::Spill { directory } => Box::new(SpillCollector::new(ctx, directory.as_deref())?),
        })
    }
}

/// Insert a bin into a scan-ordered list, merging with a bin of the same
/// scan.
pub(crate) fn insert_by_scan(
    ctx: &BinningContext,
    bins: &mut Vec<(u32, SpatialBin)>,
    scan: u32,
    bin: SpatialBin,
) {
    match bins.binary_search_by_key(&scan, |(s, _)| *s) {
        Ok(i) => ctx.bin_manager().merge_spatial_bins(&mut bins[i].1, &bin),
        Err(i) => bins.insert(i, (scan, bin)),
    }
}
