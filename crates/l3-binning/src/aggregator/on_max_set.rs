use super::Aggregator;

/// Keeps the maximum of one variable together with the values of other
/// variables observed in the same sample.
///
/// All vectors are `[max, set_0, set_1, ...]`.
#[derive(Debug, Clone)]
pub struct OnMaxSetAggregator {
    on_max_index: usize,
    set_indices: Vec<usize>,
    names: Vec<String>,
}

impl OnMaxSetAggregator {
    pub fn new(on_max_var_name: &str, on_max_index: usize, set: Vec<(String, usize)>) -> Self {
        let mut names = vec![format!("{}_max", on_max_var_name)];
        names.extend(set.iter().map(|(n, _)| n.clone()));
        Self {
            on_max_index,
            set_indices: set.into_iter().map(|(_, i)| i).collect(),
            names,
        }
    }

    fn reset(vector: &mut [f32]) {
        vector[0] = f32::NEG_INFINITY;
        vector[1..].fill(f32::NAN);
    }

    fn take_if_greater(target: &mut [f32], other: &[f32]) {
        if other[0] > target[0] {
            target.copy_from_slice(other);
        }
    }
}

impl Aggregator for OnMaxSetAggregator {
    fn name(&self) -> &'static str {
        "ON_MAX_SET"
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
        f32::NAN
    }

    fn init_spatial(&self, vector: &mut [f32]) {
        Self::reset(vector);
    }

    fn accepts(&self, values: &[f32]) -> bool {
        !values[self.on_max_index].is_nan()
    }

    fn aggregate_spatial(&self, vector: &mut [f32], values: &[f32]) {
        let v = values[self.on_max_index];
        if v > vector[0] {
            vector[0] = v;
            for (slot, &index) in vector[1..].iter_mut().zip(&self.set_indices) {
                *slot = values[index];
            }
        }
    }

    fn complete_spatial(&self, _num_obs: i32, _vector: &mut [f32]) {}

    fn merge_spatial(&self, _num_obs: i32, target: &mut [f32], _other_num_obs: i32, other: &[f32]) {
        Self::take_if_greater(target, other);
    }

    fn init_temporal(&self, vector: &mut [f32]) {
        Self::reset(vector);
    }

    fn aggregate_temporal(&self, spatial: &[f32], _num_spatial_obs: i32, temporal: &mut [f32]) {
        Self::take_if_greater(temporal, spatial);
    }

    fn complete_temporal(&self, _num_temporal_obs: i32, _temporal: &mut [f32]) {}

    fn compute_output(&self, temporal: &[f32], output: &mut [f32]) {
        if temporal[0].is_finite() {
            output.copy_from_slice(temporal);
        } else {
            output.fill(self.output_fill_value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_set_at_maximum() {
        let agg = OnMaxSetAggregator::new("ndvi", 0, vec![("red".into(), 1), ("nir".into(), 2)]);
        assert_eq!(agg.output_feature_names(), &["ndvi_max", "red", "nir"]);

        let mut s = vec![0.0; 3];
        agg.init_spatial(&mut s);
        agg.aggregate_spatial(&mut s, &[0.2, 10.0, 20.0]);
        agg.aggregate_spatial(&mut s, &[0.7, 11.0, 21.0]);
        agg.aggregate_spatial(&mut s, &[f32::NAN, 12.0, 22.0]);
        agg.aggregate_spatial(&mut s, &[0.5, 13.0, 23.0]);
        assert_eq!(s, vec![0.7, 11.0, 21.0]);

        let mut t = vec![0.0; 3];
        agg.init_temporal(&mut t);
        agg.aggregate_temporal(&s, 4, &mut t);
        agg.aggregate_temporal(&[0.6, 1.0, 2.0], 1, &mut t);
        let mut out = vec![0.0; 3];
        agg.compute_output(&t, &mut out);
        assert_eq!(out, vec![0.7, 11.0, 21.0]);
    }

    #[test]
    fn test_empty_outputs_fill() {
        let agg = OnMaxSetAggregator::new("x", 0, vec![]);
        let mut t = vec![0.0];
        agg.init_temporal(&mut t);
        let mut out = vec![0.0];
        agg.compute_output(&t, &mut out);
        assert!(out[0].is_nan());
    }
}
