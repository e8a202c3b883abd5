//! Reduces the spatial bins of one cell into a temporal bin.

use std::sync::Arc;

use crate::bins::{CellGroup, TemporalBin};
use crate::context::{BinningContext, CompositingType};

/// Applies the compositing policy and the bin manager's temporal phase.
#[derive(Debug, Clone)]
pub struct TemporalBinner {
    ctx: Arc<BinningContext>,
}

impl TemporalBinner {
    pub fn new(ctx: Arc<BinningContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &BinningContext {
        &self.ctx
    }

    /// Composite one cell.
    ///
    /// BINNING aggregates every spatial bin of the group; MOSAICKING keeps
    /// only the one from the most recent scan. The returned bin holds the
    /// final features (post-processed when configured).
    pub fn process_cell(&self, group: &CellGroup) -> TemporalBin {
        let manager = self.ctx.bin_manager();
        let mut temporal = manager.create_temporal_vector();
        let mut num_obs = 0;
        let mut num_passes = 0;

        let mut contribute = |bin: &crate::bins::SpatialBin| {
            manager.aggregate_temporal(bin, &mut temporal);
            num_obs += bin.num_obs;
            num_passes += bin.num_passes;
        };

        match self.ctx.compositing_type() {
            CompositingType::Binning => group.bins.iter().for_each(|(_, bin)| contribute(bin)),
            CompositingType::Mosaicking => {
                if let Some(bin) = group.latest() {
                    contribute(bin);
                }
            }
        }

        manager.finish_temporal_bin(group.cell_id, num_obs, num_passes, temporal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{min_max_bin, min_max_context};

    fn group(ctx: &BinningContext) -> CellGroup {
        CellGroup {
            cell_id: 11,
            bins: vec![
                (0, min_max_bin(ctx, 11, &[0.2, 0.9])),
                (3, min_max_bin(ctx, 11, &[0.5])),
            ],
        }
    }

    #[test]
    fn test_binning_combines_all_scans() {
        let ctx = min_max_context(CompositingType::Binning);
        let bin = TemporalBinner::new(ctx.clone()).process_cell(&group(&ctx));
        assert_eq!(bin.num_obs, 3);
        assert_eq!(bin.num_passes, 2);
        assert_eq!(bin.features, vec![0.2, 0.9]);
    }

    #[test]
    fn test_mosaicking_keeps_latest_scan() {
        let ctx = min_max_context(CompositingType::Mosaicking);
        let bin = TemporalBinner::new(ctx.clone()).process_cell(&group(&ctx));
        assert_eq!(bin.num_obs, 1);
        assert_eq!(bin.num_passes, 1);
        assert_eq!(bin.features, vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_group_is_empty_bin() {
        let ctx = min_max_context(CompositingType::Binning);
        let bin = TemporalBinner::new(ctx).process_cell(&CellGroup {
            cell_id: 4,
            bins: vec![],
        });
        assert!(bin.is_empty());
        assert!(bin.features.iter().all(|v| v.is_nan()));
    }
}
