use super::Aggregator;

/// Weighted mean and standard deviation of one variable.
///
/// Spatial vector (after completion): `[mean, mean_sq, count]`.
/// Temporal vector: `[sum_x, sum_xx, sum_w, count]`, completed in place to
/// `[mean, sigma, sum_w, count]`. Each spatial bin enters the temporal sum
/// with weight `count ^ weight_coeff`.
#[derive(Debug, Clone)]
pub struct AvgAggregator {
    var_index: usize,
    weight_coeff: f64,
    output_counts: bool,
    fill_value: f32,
    spatial_names: Vec<String>,
    temporal_names: Vec<String>,
    output_names: Vec<String>,
}

impl AvgAggregator {
    pub fn new(
        var_name: &str,
        var_index: usize,
        weight_coeff: f64,
        output_counts: bool,
        fill_value: f32,
    ) -> Self {
        let mut output_names = vec![format!("{}_mean", var_name), format!("{}_sigma", var_name)];
        if output_counts {
            output_names.push(format!("{}_counts", var_name));
        }
        Self {
            var_index,
            weight_coeff,
            output_counts,
            fill_value,
            spatial_names: vec![
                format!("{}_sum", var_name),
                format!("{}_sum_sq", var_name),
                format!("{}_counts", var_name),
            ],
            temporal_names: vec![
                format!("{}_sum", var_name),
                format!("{}_sum_sq", var_name),
                format!("{}_weights", var_name),
                format!("{}_counts", var_name),
            ],
            output_names,
        }
    }
}

impl Aggregator for AvgAggregator {
    fn name(&self) -> &'static str {
        "AVG"
    }

    fn spatial_feature_names(&self) -> &[String] {
        &self.spatial_names
    }

    fn temporal_feature_names(&self) -> &[String] {
        &self.temporal_names
    }

    fn output_feature_names(&self) -> &[String] {
        &self.output_names
    }

    fn output_fill_value(&self) -> f32 {
        self.fill_value
    }

    fn init_spatial(&self, vector: &mut [f32]) {
        vector.fill(0.0);
    }

    fn accepts(&self, values: &[f32]) -> bool {
        !values[self.var_index].is_nan()
    }

    fn aggregate_spatial(&self, vector: &mut [f32], values: &[f32]) {
        let v = values[self.var_index];
        if v.is_nan() {
            return;
        }
        vector[0] += v;
        vector[1] += v * v;
        vector[2] += 1.0;
    }

    fn complete_spatial(&self, _num_obs: i32, vector: &mut [f32]) {
        let count = vector[2];
        if count > 0.0 {
            vector[0] /= count;
            vector[1] /= count;
        }
    }

    fn merge_spatial(&self, _num_obs: i32, target: &mut [f32], _other_num_obs: i32, other: &[f32]) {
        let (c1, c2) = (target[2], other[2]);
        let c = c1 + c2;
        if c2 <= 0.0 {
            return;
        }
        target[0] = (target[0] * c1 + other[0] * c2) / c;
        target[1] = (target[1] * c1 + other[1] * c2) / c;
        target[2] = c;
    }

    fn init_temporal(&self, vector: &mut [f32]) {
        vector.fill(0.0);
    }

    fn aggregate_temporal(&self, spatial: &[f32], _num_spatial_obs: i32, temporal: &mut [f32]) {
        let count = spatial[2];
        if count <= 0.0 {
            return;
        }
        let w = (count as f64).powf(self.weight_coeff) as f32;
        temporal[0] += spatial[0] * w;
        temporal[1] += spatial[1] * w;
        temporal[2] += w;
        temporal[3] += count;
    }

    fn complete_temporal(&self, _num_temporal_obs: i32, temporal: &mut [f32]) {
        let w = temporal[2];
        if w > 0.0 {
            let mean = temporal[0] / w;
            let variance = (temporal[1] / w - mean * mean).max(0.0);
            temporal[0] = mean;
            temporal[1] = variance.sqrt();
        } else {
            temporal[0] = f32::NAN;
            temporal[1] = f32::NAN;
        }
    }

    fn compute_output(&self, temporal: &[f32], output: &mut [f32]) {
        if temporal[3] > 0.0 {
            output[0] = temporal[0];
            output[1] = temporal[1];
            if self.output_counts {
                output[2] = temporal[3];
            }
        } else {
            output.fill(self.fill_value);
        }
    }
}
