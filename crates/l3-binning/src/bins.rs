//! Spatial and temporal bins.

/// Per-scan aggregate of the samples that fell into one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBin {
    pub cell_id: i64,
    pub num_obs: i32,
    pub num_passes: i32,
    pub features: Vec<f32>,
}

impl SpatialBin {
    /// An empty bin for one scan pass.
    pub fn new(cell_id: i64, num_features: usize) -> Self {
        Self {
            cell_id,
            num_obs: 0,
            num_passes: 1,
            features: vec![0.0; num_features],
        }
    }

    /// Build a bin from already-known values.
    pub fn with_features(cell_id: i64, num_obs: i32, features: Vec<f32>) -> Self {
        Self {
            cell_id,
            num_obs,
            num_passes: 1,
            features,
        }
    }
}

/// Composite of all spatial bins of one cell.
///
/// `features` holds the output vector of the bin manager, or the result
/// vector once a post-processor has run.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalBin {
    pub cell_id: i64,
    pub num_obs: i32,
    pub num_passes: i32,
    pub features: Vec<f32>,
}

impl TemporalBin {
    pub fn with_features(cell_id: i64, num_obs: i32, num_passes: i32, features: Vec<f32>) -> Self {
        Self {
            cell_id,
            num_obs,
            num_passes,
            features,
        }
    }

    /// A bin with no contributing observation is not written.
    pub fn is_empty(&self) -> bool {
        self.num_obs == 0
    }
}

/// All spatial bins collected for one cell, ordered by scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGroup {
    pub cell_id: i64,
    /// `(scan index, bin)` pairs, ascending scan index, one bin per scan.
    pub bins: Vec<(u32, SpatialBin)>,
}

impl CellGroup {
    /// The bin of the most recent scan.
    pub fn latest(&self) -> Option<&SpatialBin> {
        self.bins.last().map(|(_, b)| b)
    }
}
