//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::aggregator::AggregatorConfig;
use crate::bins::SpatialBin;
use crate::context::{BinningContext, CompositingType};
use crate::grid::GridIndex;
use crate::manager::BinManager;
use crate::variable::{VariableConfig, VariableContext};

/// 216-row grid, one variable `x`, a single min/max aggregator.
pub fn min_max_context(compositing_type: CompositingType) -> Arc<BinningContext> {
    let variables = VariableContext::new(&[VariableConfig::raw("x")], None, &[]).unwrap();
    let manager = BinManager::from_config(
        &[AggregatorConfig::MinMax {
            var_name: "x".into(),
            fill_value: None,
        }],
        None,
        &variables,
    )
    .unwrap();
    Arc::new(
        BinningContext::new(
            GridIndex::new(216).unwrap(),
            variables,
            manager,
            compositing_type,
            1,
        )
        .unwrap(),
    )
}

/// Completed min/max spatial bin built from samples.
pub fn min_max_bin(ctx: &BinningContext, cell_id: i64, samples: &[f32]) -> SpatialBin {
    let manager = ctx.bin_manager();
    let mut bin = manager.create_spatial_bin(cell_id);
    for s in samples {
        manager.aggregate_spatial_bin(&[*s], &mut bin);
    }
    manager.complete_spatial_bin(&mut bin);
    bin
}
