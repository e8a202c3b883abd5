use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::{Buf, BufMut};
use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::{insert_by_scan, CollectedBins, ScanContext, SpatialBinCollector, SpatialBinConsumer};
use crate::bins::{CellGroup, SpatialBin};
use crate::context::BinningContext;
use crate::error::{BinningError, Result};

/// `cell_id i64 | scan u32 | num_obs i32 | num_passes i32`, little-endian.
const RECORD_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    cell_id: i64,
    scan: u32,
    offset: u64,
}

struct OpenSpill {
    writer: BufWriter<NamedTempFile>,
    index: Vec<IndexEntry>,
    written: u64,
    buf: Vec<u8>,
}

struct SealedSpill {
    mmap: Option<Mmap>,
    _file: NamedTempFile,
    index: Vec<IndexEntry>,
    cells: usize,
}

/// Appends fixed-size spatial bin records to a temporary file and reads
/// them back through a memory map once sealed.
///
/// Only the `(cell, scan, offset)` index stays in memory. It is sorted
/// once on seal; records of the same cell and scan are merged while
/// iterating. The temporary file is removed when the collector is dropped.
pub struct SpillCollector {
    ctx: Arc<BinningContext>,
    record_len: usize,
    path: PathBuf,
    open: Mutex<Option<OpenSpill>>,
    sealed: OnceLock<SealedSpill>,
    failure: OnceLock<String>,
}

impl SpillCollector {
    /// Create the spill file in `directory`, or the system temp dir.
    pub fn new(ctx: Arc<BinningContext>, directory: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("l3bin-spill-").suffix(".bin");
        let file = match directory {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| BinningError::spill_io(format!("failed to create spill file: {}", e)))?;

        let path = file.path().to_path_buf();
        let record_len = RECORD_HEADER_LEN + 4 * ctx.bin_manager().spatial_feature_count();
        tracing::debug!(path = %path.display(), record_len, "Created spill file");

        Ok(Self {
            ctx,
            record_len,
            path,
            open: Mutex::new(Some(OpenSpill {
                writer: BufWriter::new(file),
                index: Vec::new(),
                written: 0,
                buf: Vec::new(),
            })),
            sealed: OnceLock::new(),
            failure: OnceLock::new(),
        })
    }

    /// Location of the spill file while the collector is alive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sealed_spill(&self) -> Result<&SealedSpill> {
        self.sealed
            .get()
            .ok_or_else(|| BinningError::invalid_state("collector has not been sealed"))
    }

    fn check_usable(&self) -> Result<()> {
        match self.failure.get() {
            Some(reason) => Err(BinningError::spill_io(format!(
                "spill file {} is unusable: {}",
                self.path.display(),
                reason
            ))),
            None => Ok(()),
        }
    }

    /// Abandon the spill after a failed append. A partial batch may sit in
    /// the file past `written`, so nothing more is appended or read.
    fn fail(&self, open: &mut Option<OpenSpill>, reason: String) -> BinningError {
        tracing::error!(path = %self.path.display(), %reason, "Spill collector failed");
        *open = None;
        let _ = self.failure.set(reason.clone());
        BinningError::spill_io(format!("failed to append to {}: {}", self.path.display(), reason))
    }

    fn encode(&self, buf: &mut Vec<u8>, scan: u32, bin: &SpatialBin) -> Result<()> {
        let expected = (self.record_len - RECORD_HEADER_LEN) / 4;
        if bin.features.len() != expected {
            return Err(BinningError::invalid_state(format!(
                "spatial bin of cell {} has {} features, expected {}",
                bin.cell_id,
                bin.features.len(),
                expected
            )));
        }
        buf.put_i64_le(bin.cell_id);
        buf.put_u32_le(scan);
        buf.put_i32_le(bin.num_obs);
        buf.put_i32_le(bin.num_passes);
        for f in &bin.features {
            buf.put_f32_le(*f);
        }
        Ok(())
    }

    fn decode(&self, data: &[u8], entry: &IndexEntry) -> Result<SpatialBin> {
        let start = entry.offset as usize;
        let record = data
            .get(start..start + self.record_len)
            .ok_or_else(|| BinningError::spill_io(format!("record at offset {} is truncated", start)))?;
        let mut cursor = record;
        let cell_id = cursor.get_i64_le();
        let _scan = cursor.get_u32_le();
        let num_obs = cursor.get_i32_le();
        let num_passes = cursor.get_i32_le();
        if cell_id != entry.cell_id {
            return Err(BinningError::spill_io(format!(
                "record at offset {} holds cell {}, index says {}",
                start, cell_id, entry.cell_id
            )));
        }
        let features = (0..(self.record_len - RECORD_HEADER_LEN) / 4)
            .map(|_| cursor.get_f32_le())
            .collect();
        Ok(SpatialBin {
            cell_id,
            num_obs,
            num_passes,
            features,
        })
    }
}

impl SpatialBinConsumer for SpillCollector {
    fn consume_spatial_bins(&self, scan: &ScanContext, bins: Vec<SpatialBin>) -> Result<()> {
        self.check_usable()?;
        let mut guard = self.open.lock();
        let open = guard
            .as_mut()
            .ok_or_else(|| BinningError::invalid_state("collector is sealed"))?;

        open.buf.clear();
        for bin in &bins {
            self.encode(&mut open.buf, scan.scan, bin)?;
        }
        if let Err(e) = open.writer.write_all(&open.buf) {
            return Err(self.fail(&mut guard, e.to_string()));
        }

        for bin in &bins {
            open.index.push(IndexEntry {
                cell_id: bin.cell_id,
                scan: scan.scan,
                offset: open.written,
            });
            open.written += self.record_len as u64;
        }
        Ok(())
    }
}

impl SpatialBinCollector for SpillCollector {
    fn as_consumer(&self) -> &dyn SpatialBinConsumer {
        self
    }

    fn consuming_completed(&self) -> Result<()> {
        self.check_usable()?;
        let mut guard = self.open.lock();
        let Some(open) = guard.take() else {
            return Ok(());
        };

        let file = match open.writer.into_inner() {
            Ok(file) => file,
            Err(e) => return Err(self.fail(&mut guard, format!("flush: {}", e.error()))),
        };

        let mut index = open.index;
        index.sort_unstable_by_key(|e| (e.cell_id, e.scan, e.offset));
        let mut cells = 0;
        let mut last = None;
        for entry in &index {
            if last != Some(entry.cell_id) {
                cells += 1;
                last = Some(entry.cell_id);
            }
        }

        let mmap = if open.written == 0 {
            None
        } else {
            let map = unsafe { MmapOptions::new().map(file.as_file()) }
                .map_err(|e| BinningError::spill_io(format!("failed to map spill file: {}", e)))?;
            Some(map)
        };

        tracing::debug!(
            path = %self.path.display(),
            records = index.len(),
            cells,
            bytes = open.written,
            "Sealed spill collector"
        );

        let _ = self.sealed.set(SealedSpill {
            mmap,
            _file: file,
            index,
            cells,
        });
        Ok(())
    }

    fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn cell_count(&self) -> Result<usize> {
        Ok(self.sealed_spill()?.cells)
    }

    fn collected_bins_in(&self, cells: Range<i64>) -> Result<CollectedBins<'_>> {
        self.check_usable()?;
        let sealed = self.sealed_spill()?;
        let pos = sealed.index.partition_point(|e| e.cell_id < cells.start);
        let end = sealed.index.partition_point(|e| e.cell_id < cells.end);
        Ok(Box::new(SpillGroups {
            collector: self,
            sealed,
            pos,
            end,
        }))
    }
}

struct SpillGroups<'a> {
    collector: &'a SpillCollector,
    sealed: &'a SealedSpill,
    pos: usize,
    end: usize,
}

impl SpillGroups<'_> {
    fn next_group(&mut self, data: &[u8]) -> Result<CellGroup> {
        let cell_id = self.sealed.index[self.pos].cell_id;
        let mut bins: Vec<(u32, SpatialBin)> = Vec::new();
        while self.pos < self.end && self.sealed.index[self.pos].cell_id == cell_id {
            let entry = self.sealed.index[self.pos];
            self.pos += 1;
            let bin = self.collector.decode(data, &entry)?;
            insert_by_scan(&self.collector.ctx, &mut bins, entry.scan, bin);
        }
        Ok(CellGroup { cell_id, bins })
    }
}

impl Iterator for SpillGroups<'_> {
    type Item = Result<CellGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let sealed = self.sealed;
        let data: &[u8] = sealed.mmap.as_deref().unwrap_or(&[]);
        let group = self.next_group(data);
        if group.is_err() {
            self.pos = self.end;
        }
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompositingType;
    use crate::test_support::{min_max_bin, min_max_context};

    #[test]
    fn test_spill_roundtrip_merges_same_scan() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = min_max_context(CompositingType::Binning);
        let collector = SpillCollector::new(ctx.clone(), Some(dir.path())).unwrap();
        assert!(collector.path().starts_with(dir.path()));

        let s0 = ScanContext { scan: 0 };
        let s1 = ScanContext { scan: 1 };
        collector
            .consume_spatial_bins(&s1, vec![min_max_bin(&ctx, 40, &[2.0]), min_max_bin(&ctx, 7, &[0.5])])
            .unwrap();
        collector
            .consume_spatial_bins(&s0, vec![min_max_bin(&ctx, 40, &[9.0])])
            .unwrap();
        collector
            .consume_spatial_bins(&s1, vec![min_max_bin(&ctx, 40, &[-1.0, 4.0])])
            .unwrap();
        collector.consuming_completed().unwrap();
        assert_eq!(collector.cell_count().unwrap(), 2);

        for _ in 0..2 {
            let groups: Vec<CellGroup> = collector.collected_bins().unwrap().map(|g| g.unwrap()).collect();
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[0].cell_id, 7);
            let forty = &groups[1];
            assert_eq!(forty.bins.len(), 2);
            assert_eq!(forty.bins[0].1.features, vec![9.0, 9.0]);
            assert_eq!(forty.bins[1].0, 1);
            assert_eq!(forty.bins[1].1.num_obs, 3);
            assert_eq!(forty.bins[1].1.features, vec![-1.0, 4.0]);
        }
    }

    #[test]
    fn test_empty_spill_seals() {
        let ctx = min_max_context(CompositingType::Binning);
        let collector = SpillCollector::new(ctx, None).unwrap();
        collector.consuming_completed().unwrap();
        assert_eq!(collector.collected_bins().unwrap().count(), 0);
    }

    #[test]
    fn test_spill_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = min_max_context(CompositingType::Binning);
        let collector = SpillCollector::new(ctx.clone(), Some(dir.path())).unwrap();
        collector
            .consume_spatial_bins(&ScanContext { scan: 0 }, vec![min_max_bin(&ctx, 1, &[1.0])])
            .unwrap();
        let path = collector.path().to_path_buf();
        assert!(path.exists());
        drop(collector);
        assert!(!path.exists());
    }

    #[test]
    fn test_wrong_feature_count_rejected() {
        let ctx = min_max_context(CompositingType::Binning);
        let collector = SpillCollector::new(ctx, None).unwrap();
        let bad = SpatialBin::with_features(3, 1, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            collector.consume_spatial_bins(&ScanContext { scan: 0 }, vec![bad]),
            Err(BinningError::InvalidState(_))
        ));
    }

    #[test]
    fn test_failed_append_disables_collector() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = min_max_context(CompositingType::Binning);
        let collector = SpillCollector::new(ctx.clone(), Some(dir.path())).unwrap();
        let scan = ScanContext { scan: 0 };
        collector
            .consume_spatial_bins(&scan, vec![min_max_bin(&ctx, 1, &[1.0])])
            .unwrap();

        let err = collector.fail(&mut collector.open.lock(), "No space left on device".into());
        assert!(matches!(err, BinningError::SpillIo(_)));

        assert!(matches!(
            collector.consume_spatial_bins(&scan, vec![min_max_bin(&ctx, 2, &[2.0])]),
            Err(BinningError::SpillIo(_))
        ));
        assert!(matches!(collector.consuming_completed(), Err(BinningError::SpillIo(_))));
        assert!(!collector.is_sealed());
        assert!(collector.collected_bins().is_err());
    }
}
