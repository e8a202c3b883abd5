//! Binary layout of a binned file.
//!
//! All integers and floats are big-endian.
//!
//! ```text
//! magic          8 bytes  "L3BIN\0\0\0"
//! version        u32
//! n_attrs        u32
//!   name         u16 length + UTF-8
//!   kind         u8 (1 text, 2 i32, 3 f64)
//!   value        text: u32 length + UTF-8
//! dim bin_index  u32
//! dim bin_list   u32
//! n_vars         u32
//!   name         u16 length + UTF-8
//!   dim          u8 (0 bin_index, 1 bin_list)
//!   dtype        u8 (1 i32, 2 i64, 3 f32, 4 f64)
//! data           each variable in declared order, dim-length values
//! crc32          u32 over every preceding byte
//! ```

use std::fmt;

pub const MAGIC: &[u8; 8] = b"L3BIN\0\0\0";
pub const FORMAT_VERSION: u32 = 1;

/// Element type tags of a variable.
pub(crate) const DTYPE_I32: u8 = 1;
pub(crate) const DTYPE_I64: u8 = 2;
pub(crate) const DTYPE_F32: u8 = 3;
pub(crate) const DTYPE_F64: u8 = 4;

/// Global attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Int(i32),
    Double(f64),
}

impl AttrValue {
    pub(crate) fn kind(&self) -> u8 {
        match self {
            Self::Text(_) => 1,
            Self::Int(_) => 2,
            Self::Double(_) => 3,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Int(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// The two dimensions of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// One entry per grid row, south first.
    BinIndex,
    /// One entry per written bin, ascending bin number.
    BinList,
}

impl Dim {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::BinIndex => 0,
            Self::BinList => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::BinIndex),
            1 => Some(Self::BinList),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::BinIndex => "bin_index",
            Self::BinList => "bin_list",
        }
    }
}

/// Column storage of one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Self::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Self::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// A named column on one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dim: Dim,
    pub data: Column,
}

impl Variable {
    pub fn new(name: impl Into<String>, dim: Dim, data: Column) -> Self {
        Self {
            name: name.into(),
            dim,
            data,
        }
    }
}
