//! Binned file output: a bin-index table with one row per grid row and a
//! bin-list table with one row per written bin.

mod bin_writer;
pub mod layout;
mod reader;

pub use bin_writer::{BinWriter, EncodeStats, WriteSummary};
pub use layout::{AttrValue, Column, Dim, Variable};
pub use reader::BinFileReader;
