//! Sequential, restartable access to composited temporal bins.

use std::ops::Range;

use tracing::debug;

use crate::bins::TemporalBin;
use crate::collector::SpatialBinCollector;
use crate::error::{BinningError, Result};
use crate::temporal::TemporalBinner;

/// Part id selecting every part at once.
pub const ALL_PARTS: i32 = -1;

/// Iterator over temporal bins, ascending cell id.
pub type TemporalBins<'a> = Box<dyn Iterator<Item = Result<TemporalBin>> + Send + 'a>;

/// A source of temporal bins split into parts of ascending cell-id ranges.
pub trait TemporalBinSource {
    /// Prepare for reading; returns the number of parts.
    fn open(&mut self) -> Result<usize>;

    /// Bins of one part, or of all parts for [`ALL_PARTS`]. Each call
    /// starts a fresh pass.
    fn get_part(&self, part: i32) -> Result<TemporalBins<'_>>;

    fn close(&mut self) -> Result<()>;
}

fn check_part(opened: bool, part: i32, num_parts: usize) -> Result<()> {
    if !opened {
        return Err(BinningError::invalid_state("bin source is not open"));
    }
    if part != ALL_PARTS && (part < 0 || part as usize >= num_parts) {
        return Err(BinningError::invalid_state(format!(
            "part {} out of range, source has {} part(s)",
            part, num_parts
        )));
    }
    Ok(())
}

/// Composites the groups of a sealed collector on the fly.
///
/// Parts are contiguous bands of grid rows, so every part covers an
/// ascending cell-id range.
pub struct CollectorBinSource<'a> {
    collector: &'a dyn SpatialBinCollector,
    binner: TemporalBinner,
    requested_parts: usize,
    parts: Vec<Range<i64>>,
    opened: bool,
}

impl<'a> CollectorBinSource<'a> {
    pub fn new(collector: &'a dyn SpatialBinCollector, binner: TemporalBinner, num_parts: usize) -> Self {
        Self {
            collector,
            binner,
            requested_parts: num_parts.max(1),
            parts: Vec::new(),
            opened: false,
        }
    }
}

impl TemporalBinSource for CollectorBinSource<'_> {
    fn open(&mut self) -> Result<usize> {
        if !self.collector.is_sealed() {
            return Err(BinningError::invalid_state(
                "collector must be sealed before reading temporal bins",
            ));
        }
        let grid = self.binner.context().grid();
        let rows = grid.num_rows();
        let num_parts = self.requested_parts.min(rows);
        let rows_per_part = rows.div_ceil(num_parts);

        self.parts = (0..rows)
            .step_by(rows_per_part)
            .map(|first| {
                let (start, end) = grid.cell_range_of_rows(first, first + rows_per_part);
                start..end
            })
            .collect();
        self.opened = true;
        debug!(parts = self.parts.len(), rows_per_part, "Opened collector bin source");
        Ok(self.parts.len())
    }

    fn get_part(&self, part: i32) -> Result<TemporalBins<'_>> {
        check_part(self.opened, part, self.parts.len())?;
        let range = if part == ALL_PARTS {
            i64::MIN..i64::MAX
        } else {
            self.parts[part as usize].clone()
        };
        let binner = &self.binner;
        let groups = self.collector.collected_bins_in(range)?;
        Ok(Box::new(
            groups.map(move |group| group.map(|g| binner.process_cell(&g))),
        ))
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.parts.clear();
        Ok(())
    }
}

/// Serves pre-computed temporal bins as a single part.
#[derive(Debug, Clone, Default)]
pub struct VecTemporalBinSource {
    bins: Vec<TemporalBin>,
    opened: bool,
}

impl VecTemporalBinSource {
    pub fn new(bins: Vec<TemporalBin>) -> Self {
        Self { bins, opened: false }
    }
}

impl TemporalBinSource for VecTemporalBinSource {
    fn open(&mut self) -> Result<usize> {
        self.bins.sort_by_key(|b| b.cell_id);
        self.opened = true;
        Ok(1)
    }

    fn get_part(&self, part: i32) -> Result<TemporalBins<'_>> {
        check_part(self.opened, part, 1)?;
        Ok(Box::new(self.bins.iter().cloned().map(Ok)))
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }
}
