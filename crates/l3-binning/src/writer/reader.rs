use std::path::Path;

use bytes::Buf;

use super::layout::{
    AttrValue, Column, Dim, Variable, DTYPE_F32, DTYPE_F64, DTYPE_I32, DTYPE_I64, FORMAT_VERSION, MAGIC,
};
use crate::error::{BinningError, Result};

/// A parsed binned file.
#[derive(Debug, Clone)]
pub struct BinFileReader {
    attributes: Vec<(String, AttrValue)>,
    bin_index_len: usize,
    bin_list_len: usize,
    variables: Vec<Variable>,
}

fn truncated(what: &str) -> BinningError {
    BinningError::serialization(format!("file truncated while reading {}", what))
}

fn need(buf: &[u8], n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(truncated(what));
    }
    Ok(())
}

fn get_name(buf: &mut &[u8]) -> Result<String> {
    need(buf, 2, "name length")?;
    let len = buf.get_u16() as usize;
    get_text(buf, len)
}

fn get_text(buf: &mut &[u8], len: usize) -> Result<String> {
    need(buf, len, "text")?;
    let text = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| BinningError::serialization(format!("invalid UTF-8: {}", e)))?;
    buf.advance(len);
    Ok(text)
}

impl BinFileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| BinningError::serialization(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_bytes(&data)
    }

    /// Parse and CRC-check an in-memory file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + 4 || &data[..MAGIC.len()] != MAGIC {
            return Err(BinningError::serialization("not a binned file (bad magic)"));
        }
        let (body, mut trailer) = data.split_at(data.len() - 4);
        let stored = trailer.get_u32();
        let actual = crc32fast::hash(body);
        if stored != actual {
            return Err(BinningError::serialization(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, actual
            )));
        }

        let mut buf = &body[MAGIC.len()..];
        need(buf, 8, "header")?;
        let version = buf.get_u32();
        if version != FORMAT_VERSION {
            return Err(BinningError::serialization(format!(
                "unsupported format version {}",
                version
            )));
        }

        let n_attrs = buf.get_u32() as usize;
        let mut attributes = Vec::with_capacity(n_attrs.min(256));
        for _ in 0..n_attrs {
            let name = get_name(&mut buf)?;
            need(buf, 1, "attribute kind")?;
            let value = match buf.get_u8() {
                1 => {
                    need(buf, 4, "attribute length")?;
                    let len = buf.get_u32() as usize;
                    AttrValue::Text(get_text(&mut buf, len)?)
                }
                2 => {
                    need(buf, 4, "attribute value")?;
                    AttrValue::Int(buf.get_i32())
                }
                3 => {
                    need(buf, 8, "attribute value")?;
                    AttrValue::Double(buf.get_f64())
                }
                other => {
                    return Err(BinningError::serialization(format!(
                        "attribute '{}' has unknown kind {}",
                        name, other
                    )))
                }
            };
            attributes.push((name, value));
        }

        need(buf, 12, "dimensions")?;
        let bin_index_len = buf.get_u32() as usize;
        let bin_list_len = buf.get_u32() as usize;
        let n_vars = buf.get_u32() as usize;

        let mut declared = Vec::with_capacity(n_vars.min(1024));
        for _ in 0..n_vars {
            let name = get_name(&mut buf)?;
            need(buf, 2, "variable header")?;
            let dim = Dim::from_tag(buf.get_u8()).ok_or_else(|| {
                BinningError::serialization(format!("variable '{}' has unknown dimension", name))
            })?;
            let dtype = buf.get_u8();
            declared.push((name, dim, dtype));
        }

        let mut variables = Vec::with_capacity(declared.len());
        for (name, dim, dtype) in declared {
            let len = match dim {
                Dim::BinIndex => bin_index_len,
                Dim::BinList => bin_list_len,
            };
            let data = match dtype {
                DTYPE_I32 => {
                    need(buf, len.saturating_mul(4), &name)?;
                    Column::I32((0..len).map(|_| buf.get_i32()).collect())
                }
                DTYPE_I64 => {
                    need(buf, len.saturating_mul(8), &name)?;
                    Column::I64((0..len).map(|_| buf.get_i64()).collect())
                }
                DTYPE_F32 => {
                    need(buf, len.saturating_mul(4), &name)?;
                    Column::F32((0..len).map(|_| buf.get_f32()).collect())
                }
                DTYPE_F64 => {
                    need(buf, len.saturating_mul(8), &name)?;
                    Column::F64((0..len).map(|_| buf.get_f64()).collect())
                }
                other => {
                    return Err(BinningError::serialization(format!(
                        "variable '{}' has unknown type {}",
                        name, other
                    )))
                }
            };
            variables.push(Variable::new(name, dim, data));
        }

        if buf.has_remaining() {
            return Err(BinningError::serialization(format!(
                "{} unexpected trailing bytes",
                buf.remaining()
            )));
        }

        Ok(Self {
            attributes,
            bin_index_len,
            bin_list_len,
            variables,
        })
    }

    pub fn attributes(&self) -> &[(String, AttrValue)] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn dim_len(&self, dim: Dim) -> usize {
        match dim {
            Dim::BinIndex => self.bin_index_len,
            Dim::BinList => self.bin_list_len,
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Column> {
        self.variables.iter().find(|v| v.name == name).map(|v| &v.data)
    }

    /// Names of the per-bin feature columns.
    pub fn feature_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|v| v.dim == Dim::BinList && !matches!(v.name.as_str(), "bin_num" | "nobs" | "nscenes"))
            .map(|v| v.name.as_str())
            .collect()
    }

    fn column<'a, T>(&'a self, name: &str, get: impl Fn(&'a Column) -> Option<&'a [T]>) -> Result<&'a [T]> {
        self.variable(name)
            .and_then(get)
            .ok_or_else(|| BinningError::serialization(format!("missing or mistyped variable '{}'", name)))
    }

    pub fn bin_nums(&self) -> Result<&[i64]> {
        self.column("bin_num", Column::as_i64)
    }

    pub fn nobs(&self) -> Result<&[i32]> {
        self.column("nobs", Column::as_i32)
    }

    pub fn nscenes(&self) -> Result<&[i32]> {
        self.column("nscenes", Column::as_i32)
    }

    pub fn feature(&self, name: &str) -> Result<&[f32]> {
        self.column(name, Column::as_f32)
    }
}
