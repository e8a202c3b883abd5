//! Everything a binning run shares between its stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};
use crate::grid::GridIndex;
use crate::manager::BinManager;
use crate::variable::VariableContext;

/// How spatial bins of one cell are combined over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositingType {
    /// Every spatial bin contributes to the temporal bin.
    #[default]
    Binning,
    /// Only the most recent spatial bin of a cell is kept.
    Mosaicking,
}

impl CompositingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binning => "BINNING",
            Self::Mosaicking => "MOSAICKING",
        }
    }
}

impl fmt::Display for CompositingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompositingType {
    type Err = BinningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binning" => Ok(Self::Binning),
            "mosaicking" => Ok(Self::Mosaicking),
            other => Err(BinningError::configuration(format!(
                "unknown compositing type '{}'",
                other
            ))),
        }
    }
}

/// Grid, variables, bin manager and scan options of one run.
#[derive(Debug)]
pub struct BinningContext {
    grid: GridIndex,
    variables: VariableContext,
    bin_manager: BinManager,
    compositing_type: CompositingType,
    super_sampling: i32,
}

impl BinningContext {
    pub fn new(
        grid: GridIndex,
        variables: VariableContext,
        bin_manager: BinManager,
        compositing_type: CompositingType,
        super_sampling: i32,
    ) -> Result<Self> {
        if super_sampling < 1 {
            return Err(BinningError::configuration(format!(
                "super_sampling must be at least 1, got {}",
                super_sampling
            )));
        }
        Ok(Self {
            grid,
            variables,
            bin_manager,
            compositing_type,
            super_sampling,
        })
    }

    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub fn variables(&self) -> &VariableContext {
        &self.variables
    }

    pub fn bin_manager(&self) -> &BinManager {
        &self.bin_manager
    }

    pub fn compositing_type(&self) -> CompositingType {
        self.compositing_type
    }

    pub fn super_sampling(&self) -> i32 {
        self.super_sampling
    }
}
