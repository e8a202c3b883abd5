use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::layout::{AttrValue, Dim, DTYPE_F32, DTYPE_F64, DTYPE_I32, DTYPE_I64, FORMAT_VERSION, MAGIC};
use crate::context::BinningContext;
use crate::error::{BinningError, Result};
use crate::source::TemporalBinSource;

/// Bin-index variables, in file order.
const BIN_INDEX_VARS: [(&str, u8); 8] = [
    ("row_num", DTYPE_I32),
    ("vsize", DTYPE_F64),
    ("hsize", DTYPE_F64),
    ("start_num", DTYPE_I64),
    ("max", DTYPE_I32),
    ("begin", DTYPE_I64),
    ("extent", DTYPE_I32),
    ("begin_delta", DTYPE_I64),
];

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    /// Rows of the bin list.
    pub bins_written: usize,
    /// Grid rows holding at least one bin.
    pub rows_with_data: usize,
    pub bytes: usize,
}

/// Sizes of one encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    pub bins_written: usize,
    pub rows_with_data: usize,
    pub bytes: usize,
}

fn io_error(what: impl std::fmt::Display, e: io::Error) -> BinningError {
    BinningError::serialization(format!("{}: {}", what, e))
}

/// One bin-list column spooled to an anonymous temp file as fixed-width
/// big-endian values, in cell id order.
struct SpoolColumn {
    name: String,
    dtype: u8,
    width: u64,
    file: BufWriter<File>,
}

impl SpoolColumn {
    fn new(dir: &Path, name: impl Into<String>, dtype: u8, width: u64) -> Result<Self> {
        let file = tempfile::tempfile_in(dir)
            .map_err(|e| io_error(format_args!("failed to create column spool in {}", dir.display()), e))?;
        Ok(Self {
            name: name.into(),
            dtype,
            width,
            file: BufWriter::new(file),
        })
    }

    fn put(&mut self, value: &[u8]) -> Result<()> {
        self.file
            .write_all(value)
            .map_err(|e| io_error(format_args!("failed to spool column '{}'", self.name), e))
    }
}

/// Forwards writes while keeping a running CRC32 and byte count.
struct ChecksumWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
    len: usize,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            len: 0,
        }
    }

    /// Append the CRC trailer and hand back the sink.
    fn finish(mut self) -> io::Result<(W, usize)> {
        let crc = self.hasher.finalize();
        self.inner.write_all(&crc.to_be_bytes())?;
        self.inner.flush()?;
        Ok((self.inner, self.len + 4))
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.len += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Serializes temporal bins into the row/list layout.
///
/// Bins are streamed: the bin list is spooled column by column to temp
/// files while per-row counts are tallied, so memory stays bounded by the
/// number of grid rows.
pub struct BinWriter<'a> {
    ctx: &'a BinningContext,
    attributes: Vec<(String, AttrValue)>,
}

impl<'a> BinWriter<'a> {
    pub fn new(ctx: &'a BinningContext, title: &str) -> Self {
        let total_bins = ctx.grid().total_bins();
        let mut writer = Self {
            ctx,
            attributes: Vec::new(),
        };
        writer.set_attribute("title", title);
        writer.set_attribute("super_sampling", ctx.super_sampling());
        writer.set_attribute("num_rows", ctx.grid().num_rows() as i32);
        match i32::try_from(total_bins) {
            Ok(n) => writer.set_attribute("total_bins", n),
            Err(_) => writer.set_attribute("total_bins", total_bins as f64),
        }
        writer.set_attribute("compositing_type", ctx.compositing_type().as_str());
        writer
    }

    /// Add or replace a global attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn set_time_coverage(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.set_attribute(
            "time_coverage_start",
            start.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        self.set_attribute("time_coverage_end", end.to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    /// Encode `source` into `out`, spooling bin-list columns in `spool_dir`.
    ///
    /// Bins must arrive in strictly ascending cell id order; bins without
    /// observations are left out.
    pub fn write_to<W: Write>(
        &self,
        source: &mut dyn TemporalBinSource,
        out: W,
        spool_dir: &Path,
    ) -> Result<(W, EncodeStats)> {
        let (columns, counts) = self.spool(source, spool_dir)?;
        let bins_written = counts.iter().sum::<u64>() as usize;
        let rows_with_data = counts.iter().filter(|&&c| c > 0).count();

        let mut head = self.encode_header(bins_written, &columns)?;
        self.encode_bin_index(&counts, &mut head);

        let mut out = ChecksumWriter::new(out);
        out.write_all(&head)
            .map_err(|e| io_error("failed to write header", e))?;
        self.copy_columns(columns, &counts, &mut out)?;
        let (out, bytes) = out
            .finish()
            .map_err(|e| io_error("failed to write checksum", e))?;

        Ok((
            out,
            EncodeStats {
                bins_written,
                rows_with_data,
                bytes,
            },
        ))
    }

    /// Encode `source` into memory.
    pub fn to_bytes(&self, source: &mut dyn TemporalBinSource) -> Result<Bytes> {
        let (data, _) = self.write_to(source, Vec::new(), &std::env::temp_dir())?;
        Ok(Bytes::from(data))
    }

    /// Write the bins of `source` to `path`.
    ///
    /// The file is assembled in a temporary file next to `path` and renamed
    /// into place only once complete.
    pub fn write(&self, source: &mut dyn TemporalBinSource, path: &Path) -> Result<WriteSummary> {
        let start = Instant::now();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| io_error(format_args!("failed to create temporary file in {}", dir.display()), e))?;
        debug!(tmp = %tmp.path().display(), "Writing binned file");

        let (sink, stats) = self.write_to(source, BufWriter::new(tmp.as_file_mut()), dir)?;
        drop(sink);
        tmp.as_file()
            .sync_all()
            .map_err(|e| io_error(format_args!("failed to write {}", tmp.path().display()), e))?;
        tmp.persist(path).map_err(|e| {
            BinningError::serialization(format!("failed to move output to {}: {}", path.display(), e.error))
        })?;

        info!(
            path = %path.display(),
            bins = stats.bins_written,
            rows_with_data = stats.rows_with_data,
            bytes = stats.bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Wrote binned file"
        );

        Ok(WriteSummary {
            path: path.to_path_buf(),
            bins_written: stats.bins_written,
            rows_with_data: stats.rows_with_data,
            bytes: stats.bytes,
        })
    }

    fn spool(&self, source: &mut dyn TemporalBinSource, dir: &Path) -> Result<(Vec<SpoolColumn>, Vec<u64>)> {
        let num_parts = source.open()?;
        let spooled = self.spool_parts(source, num_parts, dir);
        source.close()?;
        spooled
    }

    fn spool_parts(
        &self,
        source: &dyn TemporalBinSource,
        num_parts: usize,
        dir: &Path,
    ) -> Result<(Vec<SpoolColumn>, Vec<u64>)> {
        let grid = self.ctx.grid();
        let feature_names = self.ctx.bin_manager().result_feature_names();

        let mut columns = vec![
            SpoolColumn::new(dir, "bin_num", DTYPE_I64, 8)?,
            SpoolColumn::new(dir, "nobs", DTYPE_I32, 4)?,
            SpoolColumn::new(dir, "nscenes", DTYPE_I32, 4)?,
        ];
        for name in feature_names {
            columns.push(SpoolColumn::new(dir, name.clone(), DTYPE_F32, 4)?);
        }
        let mut counts = vec![0u64; grid.num_rows()];
        let mut last: Option<i64> = None;

        for part in 0..num_parts {
            for bin in source.get_part(part as i32)? {
                let bin = bin?;
                if let Some(prev) = last.filter(|l| bin.cell_id <= *l) {
                    return Err(BinningError::serialization(format!(
                        "bin {} arrived after bin {}; bins must be strictly ascending",
                        bin.cell_id, prev
                    )));
                }
                if !grid.contains(bin.cell_id) {
                    return Err(BinningError::serialization(format!(
                        "bin {} is outside the {}-row grid",
                        bin.cell_id,
                        grid.num_rows()
                    )));
                }
                last = Some(bin.cell_id);
                if bin.is_empty() {
                    continue;
                }
                if bin.features.len() != feature_names.len() {
                    return Err(BinningError::serialization(format!(
                        "bin {} has {} features, expected {}",
                        bin.cell_id,
                        bin.features.len(),
                        feature_names.len()
                    )));
                }

                counts[grid.row_of(bin.cell_id)] += 1;
                columns[0].put(&grid.output_number_of(bin.cell_id).to_be_bytes())?;
                columns[1].put(&bin.num_obs.to_be_bytes())?;
                columns[2].put(&bin.num_passes.to_be_bytes())?;
                for (column, value) in columns[3..].iter_mut().zip(&bin.features) {
                    column.put(&value.to_be_bytes())?;
                }
            }
        }
        Ok((columns, counts))
    }

    fn encode_header(&self, bin_list_len: usize, columns: &[SpoolColumn]) -> Result<BytesMut> {
        let bin_list_len = u32::try_from(bin_list_len)
            .map_err(|_| BinningError::serialization(format!("{} bins exceed the format limit", bin_list_len)))?;

        let mut buf = BytesMut::new();
        buf.put_slice(MAGIC);
        buf.put_u32(FORMAT_VERSION);

        buf.put_u32(self.attributes.len() as u32);
        for (name, value) in &self.attributes {
            put_name(&mut buf, name)?;
            buf.put_u8(value.kind());
            match value {
                AttrValue::Text(s) => {
                    buf.put_u32(s.len() as u32);
                    buf.put_slice(s.as_bytes());
                }
                AttrValue::Int(v) => buf.put_i32(*v),
                AttrValue::Double(v) => buf.put_f64(*v),
            }
        }

        buf.put_u32(self.ctx.grid().num_rows() as u32);
        buf.put_u32(bin_list_len);

        buf.put_u32((BIN_INDEX_VARS.len() + columns.len()) as u32);
        for (name, dtype) in BIN_INDEX_VARS {
            put_name(&mut buf, name)?;
            buf.put_u8(Dim::BinIndex.tag());
            buf.put_u8(dtype);
        }
        for column in columns {
            put_name(&mut buf, &column.name)?;
            buf.put_u8(Dim::BinList.tag());
            buf.put_u8(column.dtype);
        }
        Ok(buf)
    }

    /// Bin-index columns, south-first, derived from per-row bin counts.
    fn encode_bin_index(&self, counts: &[u64], buf: &mut BytesMut) {
        let grid = self.ctx.grid();
        let rows: Vec<usize> = (0..grid.num_rows()).map(|o| grid.row_at_output(o)).collect();

        let mut begin = Vec::with_capacity(rows.len());
        let mut offset = 0i64;
        for &row in &rows {
            if counts[row] == 0 {
                begin.push(-1);
            } else {
                begin.push(offset);
                offset += counts[row] as i64;
            }
        }

        for out_row in 0..rows.len() {
            buf.put_i32(out_row as i32);
        }
        for &row in &rows {
            buf.put_f64(grid.bounds_of(row).0);
        }
        for &row in &rows {
            buf.put_f64(grid.bounds_of(row).1);
        }
        for &row in &rows {
            buf.put_i64(grid.output_start(row));
        }
        for &row in &rows {
            buf.put_i32(grid.column_count(row) as i32);
        }
        for &b in &begin {
            buf.put_i64(b);
        }
        for &row in &rows {
            buf.put_i32(counts[row] as i32);
        }
        for (&b, &row) in begin.iter().zip(&rows) {
            buf.put_i64(if b < 0 { -1 } else { b - grid.output_start(row) });
        }
    }

    /// Copy spooled columns into `out`, reordering row blocks south-first.
    fn copy_columns<W: Write>(&self, columns: Vec<SpoolColumn>, counts: &[u64], out: &mut W) -> Result<()> {
        let grid = self.ctx.grid();

        // Index of the first spooled bin of each row.
        let mut first = Vec::with_capacity(counts.len());
        let mut acc = 0u64;
        for &c in counts {
            first.push(acc);
            acc += c;
        }

        for column in columns {
            let name = column.name;
            let width = column.width;
            let mut file = column
                .file
                .into_inner()
                .map_err(|e| io_error(format_args!("failed to flush column '{}'", name), e.into_error()))?;

            for out_row in 0..grid.num_rows() {
                let row = grid.row_at_output(out_row);
                if counts[row] == 0 {
                    continue;
                }
                let len = counts[row] * width;
                file.seek(SeekFrom::Start(first[row] * width))
                    .map_err(|e| io_error(format_args!("failed to read column '{}'", name), e))?;
                let mut block = (&mut file).take(len);
                let copied = io::copy(&mut block, out)
                    .map_err(|e| io_error(format_args!("failed to copy column '{}'", name), e))?;
                if copied != len {
                    return Err(BinningError::serialization(format!(
                        "column '{}' spool truncated: {} of {} bytes",
                        name, copied, len
                    )));
                }
            }
        }
        Ok(())
    }
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<()> {
    let len = u16::try_from(name.len())
        .map_err(|_| BinningError::serialization(format!("name too long: {} bytes", name.len())))?;
    buf.put_u16(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}
