use super::Aggregator;

/// Minimum and maximum of one variable.
///
/// All three vectors are `[min, max]`. An empty vector holds
/// `[+inf, -inf]`; NaN samples are ignored.
#[derive(Debug, Clone)]
pub struct MinMaxAggregator {
    var_index: usize,
    fill_value: f32,
    names: Vec<String>,
}

impl MinMaxAggregator {
    pub fn new(var_name: &str, var_index: usize, fill_value: f32) -> Self {
        Self {
            var_index,
            fill_value,
            names: vec![format!("{}_min", var_name), format!("{}_max", var_name)],
        }
    }

    fn fold(target: &mut [f32], min: f32, max: f32) {
        if min < target[0] {
            target[0] = min;
        }
        if max > target[1] {
            target[1] = max;
        }
    }
}

impl Aggregator for MinMaxAggregator {
    fn name(&self) -> &'static str {
        "MIN_MAX"
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
        self.fill_value
    }

    fn init_spatial(&self, vector: &mut [f32]) {
        vector[0] = f32::INFINITY;
        vector[1] = f32::NEG_INFINITY;
    }

    fn accepts(&self, values: &[f32]) -> bool {
        !values[self.var_index].is_nan()
    }

    fn aggregate_spatial(&self, vector: &mut [f32], values: &[f32]) {
        let v = values[self.var_index];
        if !v.is_nan() {
            Self::fold(vector, v, v);
        }
    }

    fn complete_spatial(&self, _num_obs: i32, _vector: &mut [f32]) {}

    fn merge_spatial(&self, _num_obs: i32, target: &mut [f32], _other_num_obs: i32, other: &[f32]) {
        Self::fold(target, other[0], other[1]);
    }

    fn init_temporal(&self, vector: &mut [f32]) {
        self.init_spatial(vector);
    }

    fn aggregate_temporal(&self, spatial: &[f32], _num_spatial_obs: i32, temporal: &mut [f32]) {
        Self::fold(temporal, spatial[0], spatial[1]);
    }

    fn complete_temporal(&self, _num_temporal_obs: i32, _temporal: &mut [f32]) {}

    fn compute_output(&self, temporal: &[f32], output: &mut [f32]) {
        if temporal[0] <= temporal[1] {
            output[0] = temporal[0];
            output[1] = temporal[1];
        } else {
            output.fill(self.fill_value);
        }
    }
}
