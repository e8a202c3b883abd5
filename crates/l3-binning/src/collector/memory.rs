use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::{insert_by_scan, CollectedBins, ScanContext, SpatialBinCollector, SpatialBinConsumer};
use crate::bins::{CellGroup, SpatialBin};
use crate::context::BinningContext;
use crate::error::{BinningError, Result};

type CellMap = BTreeMap<i64, Vec<(u32, SpatialBin)>>;

/// Collects spatial bins in an ordered in-memory map.
pub struct MemoryCollector {
    ctx: Arc<BinningContext>,
    /// `None` once sealed.
    open: Mutex<Option<CellMap>>,
    sealed: OnceLock<CellMap>,
}

impl MemoryCollector {
    pub fn new(ctx: Arc<BinningContext>) -> Self {
        Self {
            ctx,
            open: Mutex::new(Some(BTreeMap::new())),
            sealed: OnceLock::new(),
        }
    }

    fn sealed_map(&self) -> Result<&CellMap> {
        self.sealed
            .get()
            .ok_or_else(|| BinningError::invalid_state("collector has not been sealed"))
    }
}

impl SpatialBinConsumer for MemoryCollector {
    fn consume_spatial_bins(&self, scan: &ScanContext, bins: Vec<SpatialBin>) -> Result<()> {
        let mut guard = self.open.lock();
        let map = guard
            .as_mut()
            .ok_or_else(|| BinningError::invalid_state("collector is sealed"))?;
        for bin in bins {
            let entry = map.entry(bin.cell_id).or_default();
            insert_by_scan(&self.ctx, entry, scan.scan, bin);
        }
        Ok(())
    }
}

impl SpatialBinCollector for MemoryCollector {
    fn as_consumer(&self) -> &dyn SpatialBinConsumer {
        self
    }

    fn consuming_completed(&self) -> Result<()> {
        let mut open = self.open.lock();
        let Some(map) = open.take() else {
            return Ok(());
        };
        tracing::debug!(cells = map.len(), "Sealed in-memory collector");
        let _ = self.sealed.set(map);
        Ok(())
    }

    fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn cell_count(&self) -> Result<usize> {
        Ok(self.sealed_map()?.len())
    }

    fn collected_bins_in(&self, cells: Range<i64>) -> Result<CollectedBins<'_>> {
        let map = self.sealed_map()?;
        Ok(Box::new(map.range(cells).map(|(cell_id, bins)| {
            Ok(CellGroup {
                cell_id: *cell_id,
                bins: bins.clone(),
            })
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompositingType;
    use crate::test_support::{min_max_bin, min_max_context};

    #[test]
    fn test_read_before_seal_fails() {
        let ctx = min_max_context(CompositingType::Binning);
        let collector = MemoryCollector::new(ctx);
        assert!(matches!(
            collector.collected_bins(),
            Err(BinningError::InvalidState(_))
        ));
    }

    #[test]
    fn test_consume_after_seal_fails() {
        let ctx = min_max_context(CompositingType::Binning);
        let collector = MemoryCollector::new(ctx.clone());
        collector.consuming_completed().unwrap();
        let err = collector.consume_spatial_bins(&ScanContext { scan: 0 }, vec![min_max_bin(&ctx, 1, &[1.0])]);
        assert!(matches!(err, Err(BinningError::InvalidState(_))));
    }

    #[test]
    fn test_groups_ascending_and_merged() {
        let ctx = min_max_context(CompositingType::Binning);
        let collector = MemoryCollector::new(ctx.clone());
        let s0 = ScanContext { scan: 0 };
        let s1 = ScanContext { scan: 1 };
        collector
            .consume_spatial_bins(&s1, vec![min_max_bin(&ctx, 9, &[5.0]), min_max_bin(&ctx, 2, &[1.0])])
            .unwrap();
        collector
            .consume_spatial_bins(&s0, vec![min_max_bin(&ctx, 9, &[3.0])])
            .unwrap();
        // Same scan, other tile.
        collector
            .consume_spatial_bins(&s1, vec![min_max_bin(&ctx, 9, &[7.0, 6.0])])
            .unwrap();
        collector.consuming_completed().unwrap();

        let groups: Vec<CellGroup> = collector.collected_bins().unwrap().map(|g| g.unwrap()).collect();
        assert_eq!(groups.iter().map(|g| g.cell_id).collect::<Vec<_>>(), vec![2, 9]);
        let nine = &groups[1];
        assert_eq!(nine.bins.len(), 2);
        assert_eq!(nine.bins[0].0, 0);
        let latest = nine.latest().unwrap();
        assert_eq!(latest.num_obs, 3);
        assert_eq!(latest.features, vec![5.0, 7.0]);

        // Restartable.
        assert_eq!(collector.collected_bins().unwrap().count(), 2);
        assert_eq!(collector.collected_bins_in(3..100).unwrap().count(), 1);
        assert_eq!(collector.cell_count().unwrap(), 2);
    }
}
