//! The bin manager runs an ordered list of aggregators over bin vectors.

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::bins::{SpatialBin, TemporalBin};
use crate::error::{BinningError, Result};
use crate::postprocess::{PostProcessor, PostProcessorConfig};
use crate::variable::VariableContext;

/// Offsets of each aggregator's slice within a concatenated vector.
#[derive(Debug, Clone)]
struct Layout {
    offsets: Vec<usize>,
    len: usize,
}

impl Layout {
    fn new(lens: impl Iterator<Item = usize>) -> Self {
        let mut offsets = Vec::new();
        let mut len = 0;
        for l in lens {
            offsets.push(len);
            len += l;
        }
        Self { offsets, len }
    }

    fn range(&self, i: usize, len: usize) -> std::ops::Range<usize> {
        self.offsets[i]..self.offsets[i] + len
    }
}

/// Ordered aggregators plus an optional post-processor.
#[derive(Debug)]
pub struct BinManager {
    aggregators: Vec<Box<dyn Aggregator>>,
    spatial: Layout,
    temporal: Layout,
    output: Layout,
    output_names: Vec<String>,
    post_processor: Option<Box<dyn PostProcessor>>,
}

impl BinManager {
    /// Compose aggregators; the post-processor binds to their output names.
    pub fn new(
        aggregators: Vec<Box<dyn Aggregator>>,
        post_processor: Option<&PostProcessorConfig>,
    ) -> Result<Self> {
        if aggregators.is_empty() {
            return Err(BinningError::configuration("at least one aggregator is required"));
        }

        let spatial = Layout::new(aggregators.iter().map(|a| a.spatial_len()));
        let temporal = Layout::new(aggregators.iter().map(|a| a.temporal_len()));
        let output = Layout::new(aggregators.iter().map(|a| a.output_len()));
        let output_names: Vec<String> = aggregators
            .iter()
            .flat_map(|a| a.output_feature_names().iter().cloned())
            .collect();

        let post_processor = post_processor
            .map(|config| config.create(&output_names))
            .transpose()?;

        Ok(Self {
            aggregators,
            spatial,
            temporal,
            output,
            output_names,
            post_processor,
        })
    }

    /// Build aggregators from configuration against a variable context.
    pub fn from_config(
        configs: &[AggregatorConfig],
        post_processor: Option<&PostProcessorConfig>,
        ctx: &VariableContext,
    ) -> Result<Self> {
        let aggregators = configs
            .iter()
            .map(|c| c.create(ctx))
            .collect::<Result<Vec<_>>>()?;
        Self::new(aggregators, post_processor)
    }

    pub fn aggregator(&self, index: usize) -> &dyn Aggregator {
        self.aggregators[index].as_ref()
    }

    pub fn spatial_feature_count(&self) -> usize {
        self.spatial.len
    }

    pub fn temporal_feature_count(&self) -> usize {
        self.temporal.len
    }

    pub fn output_feature_count(&self) -> usize {
        self.output.len
    }

    pub fn spatial_feature_names(&self) -> Vec<String> {
        self.aggregators
            .iter()
            .flat_map(|a| a.spatial_feature_names().iter().cloned())
            .collect()
    }

    /// Concatenated aggregator output names, in aggregator order.
    pub fn output_feature_names(&self) -> &[String] {
        &self.output_names
    }

    /// Names of the features that end up in a written bin.
    pub fn result_feature_names(&self) -> &[String] {
        match &self.post_processor {
            Some(pp) => pp.result_feature_names(),
            None => &self.output_names,
        }
    }

    pub fn has_post_processor(&self) -> bool {
        self.post_processor.is_some()
    }

    // ---------------------------------------------------------------------
    // Spatial phase
    // ---------------------------------------------------------------------

    pub fn create_spatial_bin(&self, cell_id: i64) -> SpatialBin {
        let mut bin = SpatialBin::new(cell_id, self.spatial.len);
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.init_spatial(&mut bin.features[self.spatial.range(i, agg.spatial_len())]);
        }
        bin
    }

    /// Whether any aggregator takes a sample with these values.
    pub fn accepts_sample(&self, values: &[f32]) -> bool {
        self.aggregators.iter().any(|agg| agg.accepts(values))
    }

    /// Add one sample to a bin. A sample no aggregator accepts leaves the
    /// bin untouched and returns `false`.
    pub fn aggregate_spatial_bin(&self, values: &[f32], bin: &mut SpatialBin) -> bool {
        if !self.accepts_sample(values) {
            return false;
        }
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.aggregate_spatial(
                &mut bin.features[self.spatial.range(i, agg.spatial_len())],
                values,
            );
        }
        bin.num_obs += 1;
        true
    }

    pub fn complete_spatial_bin(&self, bin: &mut SpatialBin) {
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.complete_spatial(
                bin.num_obs,
                &mut bin.features[self.spatial.range(i, agg.spatial_len())],
            );
        }
    }

    /// Merge a completed bin of the same cell and scan into `target`.
    pub fn merge_spatial_bins(&self, target: &mut SpatialBin, other: &SpatialBin) {
        for (i, agg) in self.aggregators.iter().enumerate() {
            let range = self.spatial.range(i, agg.spatial_len());
            agg.merge_spatial(
                target.num_obs,
                &mut target.features[range.clone()],
                other.num_obs,
                &other.features[range],
            );
        }
        target.num_obs += other.num_obs;
        target.num_passes = target.num_passes.max(other.num_passes);
    }

    // ---------------------------------------------------------------------
    // Temporal phase
    // ---------------------------------------------------------------------

    /// A fresh temporal accumulation vector.
    pub fn create_temporal_vector(&self) -> Vec<f32> {
        let mut vector = vec![0.0; self.temporal.len];
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.init_temporal(&mut vector[self.temporal.range(i, agg.temporal_len())]);
        }
        vector
    }

    pub fn aggregate_temporal(&self, spatial: &SpatialBin, temporal: &mut [f32]) {
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.aggregate_temporal(
                &spatial.features[self.spatial.range(i, agg.spatial_len())],
                spatial.num_obs,
                &mut temporal[self.temporal.range(i, agg.temporal_len())],
            );
        }
    }

    pub fn complete_temporal(&self, num_obs: i32, temporal: &mut [f32]) {
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.complete_temporal(num_obs, &mut temporal[self.temporal.range(i, agg.temporal_len())]);
        }
    }

    /// Output vector of every aggregator's fill value.
    pub fn fill_output(&self) -> Vec<f32> {
        let mut output = vec![0.0; self.output.len];
        for (i, agg) in self.aggregators.iter().enumerate() {
            output[self.output.range(i, agg.output_len())].fill(agg.output_fill_value());
        }
        output
    }

    pub fn compute_output(&self, temporal: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; self.output.len];
        for (i, agg) in self.aggregators.iter().enumerate() {
            agg.compute_output(
                &temporal[self.temporal.range(i, agg.temporal_len())],
                &mut output[self.output.range(i, agg.output_len())],
            );
        }
        output
    }

    /// Complete a temporal accumulation into a bin holding the final
    /// features. Cells without observations get fill values and skip
    /// completion.
    pub fn finish_temporal_bin(
        &self,
        cell_id: i64,
        num_obs: i32,
        num_passes: i32,
        mut temporal: Vec<f32>,
    ) -> TemporalBin {
        let output = if num_obs == 0 {
            self.fill_output()
        } else {
            self.complete_temporal(num_obs, &mut temporal);
            self.compute_output(&temporal)
        };
        let features = match &self.post_processor {
            Some(pp) => {
                let mut result = vec![0.0; pp.result_feature_names().len()];
                pp.process(&output, &mut result);
                result
            }
            None => output,
        };
        TemporalBin::with_features(cell_id, num_obs, num_passes, features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AvgAggregator, MinMaxAggregator};

    fn manager(pp: Option<&PostProcessorConfig>) -> BinManager {
        BinManager::new(
            vec![
                Box::new(AvgAggregator::new("a", 0, 0.0, false, f32::NAN)),
                Box::new(MinMaxAggregator::new("b", 1, f32::NAN)),
            ],
            pp,
        )
        .unwrap()
    }

    #[test]
    fn test_feature_name_concatenation() {
        let m = manager(None);
        assert_eq!(m.output_feature_names(), &["a_mean", "a_sigma", "b_min", "b_max"]);
        assert_eq!(m.result_feature_names(), m.output_feature_names());
        assert!(!m.has_post_processor());
        assert_eq!(m.spatial_feature_count(), 5);
        assert_eq!(m.temporal_feature_count(), 6);
        assert_eq!(m.output_feature_count(), 4);
    }

    #[test]
    fn test_post_processor_names() {
        let pp = PostProcessorConfig::Selection {
            var_names: vec!["b_max".into()],
        };
        let m = manager(Some(&pp));
        assert!(m.has_post_processor());
        assert_eq!(m.result_feature_names(), &["b_max"]);
        assert_eq!(m.output_feature_names().len(), 4);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            BinManager::new(vec![], None),
            Err(BinningError::Configuration(_))
        ));
    }

    #[test]
    fn test_spatial_then_temporal() {
        let m = manager(None);
        let mut bin = m.create_spatial_bin(7);
        m.aggregate_spatial_bin(&[1.0, 5.0], &mut bin);
        m.aggregate_spatial_bin(&[3.0, 2.0], &mut bin);
        m.complete_spatial_bin(&mut bin);
        assert_eq!(bin.num_obs, 2);

        let mut t = m.create_temporal_vector();
        m.aggregate_temporal(&bin, &mut t);
        let out = m.finish_temporal_bin(7, bin.num_obs, 1, t);
        assert_eq!(out.features, vec![2.0, 1.0, 2.0, 5.0]);
        assert_eq!(out.num_obs, 2);
    }

    #[test]
    fn test_sample_without_aggregated_values_not_counted() {
        let m = manager(None);
        let mut bin = m.create_spatial_bin(7);
        assert!(!m.aggregate_spatial_bin(&[f32::NAN, f32::NAN], &mut bin));
        assert_eq!(bin.num_obs, 0);

        // One aggregator taking the sample is enough.
        assert!(m.aggregate_spatial_bin(&[f32::NAN, 4.0], &mut bin));
        m.complete_spatial_bin(&mut bin);
        assert_eq!(bin.num_obs, 1);
        assert_eq!(&bin.features[3..], &[4.0, 4.0]);
    }

    #[test]
    fn test_no_observations_writes_fill() {
        let m = manager(None);
        let t = m.create_temporal_vector();
        let out = m.finish_temporal_bin(3, 0, 0, t);
        assert!(out.features.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_merge_spatial_bins_sums_obs() {
        let m = manager(None);
        let mut a = m.create_spatial_bin(1);
        m.aggregate_spatial_bin(&[2.0, 1.0], &mut a);
        m.complete_spatial_bin(&mut a);
        let mut b = m.create_spatial_bin(1);
        m.aggregate_spatial_bin(&[4.0, 9.0], &mut b);
        m.complete_spatial_bin(&mut b);
        m.merge_spatial_bins(&mut a, &b);
        assert_eq!(a.num_obs, 2);
        assert_eq!(a.num_passes, 1);
        assert_eq!(a.features[0], 3.0);
        assert_eq!(&a.features[3..], &[1.0, 9.0]);
    }
}
