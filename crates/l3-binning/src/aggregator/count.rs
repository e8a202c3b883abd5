use super::Aggregator;

/// Number of valid (non-NaN) samples of a variable.
#[derive(Debug, Clone)]
pub struct CountAggregator {
    var_index: usize,
    names: Vec<String>,
}

impl CountAggregator {
    pub fn new(var_name: &str, var_index: usize) -> Self {
        Self {
            var_index,
            names: vec![format!("{}_count", var_name)],
        }
    }
}

impl Aggregator for CountAggregator {
    fn name(&self) -> &'static str {
        "COUNT"
    }

    fn spatial_feature_names(&self) -> &[String] {
        &self.names
    }

    fn temporal_feature_names(&self) -> &[String] {
        &self.names
    }

    fn output_feature_names(&self) -> &[String] {
        &self.names
    }

    fn output_fill_value(&self) -> f32 {
        0.0
    }

    fn init_spatial(&self, vector: &mut [f32]) {
        vector[0] = 0.0;
    }

    fn accepts(&self, values: &[f32]) -> bool {
        !values[self.var_index].is_nan()
    }

    fn aggregate_spatial(&self, vector: &mut [f32], values: &[f32]) {
        if !values[self.var_index].is_nan() {
            vector[0] += 1.0;
        }
    }

    fn complete_spatial(&self, _num_obs: i32, _vector: &mut [f32]) {}

    fn merge_spatial(&self, _num_obs: i32, target: &mut [f32], _other_num_obs: i32, other: &[f32]) {
        target[0] += other[0];
    }

    fn init_temporal(&self, vector: &mut [f32]) {
        vector[0] = 0.0;
    }

    fn aggregate_temporal(&self, spatial: &[f32], _num_spatial_obs: i32, temporal: &mut [f32]) {
        temporal[0] += spatial[0];
    }

    fn complete_temporal(&self, _num_temporal_obs: i32, _temporal: &mut [f32]) {}

    fn compute_output(&self, temporal: &[f32], output: &mut [f32]) {
        output[0] = temporal[0];
    }
}
