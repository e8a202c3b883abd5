//! Aggregators reduce variable samples into bin feature vectors.
//!
//! Every aggregator owns a slice of the spatial, temporal and output
//! vectors of a bin and follows the same life cycle:
//!
//! ```text
//! spatial:  init_spatial ─► aggregate_spatial (per sample) ─► complete_spatial
//!                                   │
//!                 merge_spatial (same scan, other tile)
//! temporal: init_temporal ─► aggregate_temporal (per spatial bin) ─► complete_temporal
//! output:   compute_output
//! ```
//!
//! The set of aggregators is closed: [`AggregatorConfig`] lists them and
//! binds each to variables of the [`VariableContext`] by name.

mod avg;
mod count;
mod min_max;
mod on_max_set;

pub use avg::AvgAggregator;
pub use count::CountAggregator;
pub use min_max::MinMaxAggregator;
pub use on_max_set::OnMaxSetAggregator;

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};
use crate::variable::VariableContext;

/// The four-phase reduction contract.
pub trait Aggregator: Send + Sync + std::fmt::Debug {
    /// Short type name, e.g. `"AVG"`.
    fn name(&self) -> &'static str;

    fn spatial_feature_names(&self) -> &[String];

    fn temporal_feature_names(&self) -> &[String];

    fn output_feature_names(&self) -> &[String];

    /// Written for every output feature of a cell without valid data.
    fn output_fill_value(&self) -> f32;

    fn spatial_len(&self) -> usize {
        self.spatial_feature_names().len()
    }

    fn temporal_len(&self) -> usize {
        self.temporal_feature_names().len()
    }

    fn output_len(&self) -> usize {
        self.output_feature_names().len()
    }

    fn init_spatial(&self, vector: &mut [f32]);

    /// Whether a sample with these pixel values contributes to this
    /// aggregator. Samples no aggregator accepts are not counted.
    fn accepts(&self, values: &[f32]) -> bool;

    /// Add one sample; `values` is the pixel value vector of the context.
    fn aggregate_spatial(&self, vector: &mut [f32], values: &[f32]);

    fn complete_spatial(&self, num_obs: i32, vector: &mut [f32]);

    /// Merge a completed spatial vector from another tile of the same scan
    /// into `target`, which is also completed.
    fn merge_spatial(&self, num_obs: i32, target: &mut [f32], other_num_obs: i32, other: &[f32]);

    fn init_temporal(&self, vector: &mut [f32]);

    fn aggregate_temporal(&self, spatial: &[f32], num_spatial_obs: i32, temporal: &mut [f32]);

    fn complete_temporal(&self, num_temporal_obs: i32, temporal: &mut [f32]);

    fn compute_output(&self, temporal: &[f32], output: &mut [f32]);
}

/// Configuration of one aggregator, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregatorConfig {
    /// Weighted mean and standard deviation.
    Avg {
        var_name: String,
        /// Temporal weight of a spatial bin is `count ^ weight_coeff`.
        #[serde(default)]
        weight_coeff: f64,
        /// Also output the number of samples.
        #[serde(default)]
        output_counts: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill_value: Option<f32>,
    },
    /// Minimum and maximum.
    MinMax {
        var_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill_value: Option<f32>,
    },
    /// Maximum of one variable plus the other variables observed with it.
    OnMaxSet {
        on_max_var_name: String,
        #[serde(default)]
        set_var_names: Vec<String>,
    },
    /// Number of valid samples.
    Count { var_name: String },
}

impl AggregatorConfig {
    /// Variables this aggregator reads.
    pub fn var_names(&self) -> Vec<String> {
        match self {
            Self::Avg { var_name, .. } | Self::MinMax { var_name, .. } | Self::Count { var_name } => {
                vec![var_name.clone()]
            }
            Self::OnMaxSet {
                on_max_var_name,
                set_var_names,
            } => std::iter::once(on_max_var_name.clone())
                .chain(set_var_names.iter().cloned())
                .collect(),
        }
    }

    /// Bind to a variable context.
    pub fn create(&self, ctx: &VariableContext) -> Result<Box<dyn Aggregator>> {
        let index = |name: &str| {
            ctx.index_of(name).ok_or_else(|| {
                BinningError::configuration(format!("aggregator references unknown variable '{}'", name))
            })
        };

        Ok(match self {
            Self::Avg {
                var_name,
                weight_coeff,
                output_counts,
                fill_value,
            } => Box::new(AvgAggregator::new(
                var_name,
                index(var_name)?,
                *weight_coeff,
                *output_counts,
                fill_value.unwrap_or(f32::NAN),
            )),
            Self::MinMax {
                var_name,
                fill_value,
            } => Box::new(MinMaxAggregator::new(
                var_name,
                index(var_name)?,
                fill_value.unwrap_or(f32::NAN),
            )),
            Self::OnMaxSet {
                on_max_var_name,
                set_var_names,
            } => {
                let set = set_var_names
                    .iter()
                    .map(|n| Ok((n.clone(), index(n)?)))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(OnMaxSetAggregator::new(
                    on_max_var_name,
                    index(on_max_var_name)?,
                    set,
                ))
            }
            Self::Count { var_name } => Box::new(CountAggregator::new(var_name, index(var_name)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableConfig;

    #[test]
    fn test_config_yaml_tags() {
        let yaml = r#"
- type: avg
  var_name: chl
  weight_coeff: 0.5
- type: min_max
  var_name: sst
- type: on_max_set
  on_max_var_name: ndvi
  set_var_names: [red, nir]
- type: count
  var_name: chl
"#;
        let configs: Vec<AggregatorConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(configs.len(), 4);
        assert!(matches!(
            &configs[0],
            AggregatorConfig::Avg { weight_coeff, output_counts: false, .. } if *weight_coeff == 0.5
        ));
        assert_eq!(configs[2].var_names(), vec!["ndvi", "red", "nir"]);
    }

    #[test]
    fn test_create_unknown_variable() {
        let ctx = VariableContext::new(&[VariableConfig::raw("chl")], None, &[]).unwrap();
        let config = AggregatorConfig::MinMax {
            var_name: "sst".into(),
            fill_value: None,
        };
        assert!(matches!(
            config.create(&ctx),
            Err(BinningError::Configuration(_))
        ));
    }
}
