//! Integration tests for accumulation, compositing and collectors.

use std::sync::Arc;

use l3_binning::{
    AggregatorConfig, BinFileReader, BinManager, BinWriter, BinningConfig, BinningContext, CellGroup,
    CollectorBinSource, CompositingType, GridIndex, MemoryCollector, PostProcessorConfig, ScanContext,
    SpatialBin, SpatialBinCollector, SpatialBinConsumer, SpillCollector, TemporalBin, TemporalBinSource, TemporalBinner,
    VariableConfig, VariableContext, ALL_PARTS,
};
use rayon::prelude::*;
use test_utils::{assert_approx_eq, fixtures::configs, temp_test_dir};

fn min_max_context(compositing_type: CompositingType) -> Arc<BinningContext> {
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
        BinningContext::new(GridIndex::new(216).unwrap(), variables, manager, compositing_type, 1).unwrap(),
    )
}

fn spatial_bin(ctx: &BinningContext, cell_id: i64, samples: &[f32]) -> SpatialBin {
    let manager = ctx.bin_manager();
    let mut bin = manager.create_spatial_bin(cell_id);
    for s in samples {
        manager.aggregate_spatial_bin(&[*s], &mut bin);
    }
    manager.complete_spatial_bin(&mut bin);
    bin
}

fn collect_all(collector: &dyn SpatialBinCollector) -> Vec<CellGroup> {
    collector
        .collected_bins()
        .unwrap()
        .map(|g| g.unwrap())
        .collect()
}

fn temporal_bins(source: &dyn TemporalBinSource, part: i32) -> Vec<TemporalBin> {
    source.get_part(part).unwrap().map(|b| b.unwrap()).collect()
}

// =============================================================================
// ACCUMULATION
// =============================================================================

#[test]
fn test_two_min_max_bins_written_and_read_back() {
    let ctx = min_max_context(CompositingType::Binning);
    let collector = MemoryCollector::new(ctx.clone());
    collector
        .consume_spatial_bins(
            &ScanContext { scan: 0 },
            vec![spatial_bin(&ctx, 12346, &[0.398, 0.89]), spatial_bin(&ctx, 12345, &[0.14])],
        )
        .unwrap();
    collector.consuming_completed().unwrap();

    let dir = temp_test_dir();
    let path = dir.path().join("l3.bin");
    let mut source = CollectorBinSource::new(&collector, TemporalBinner::new(ctx.clone()), 1);
    let summary = BinWriter::new(&ctx, "accumulation").write(&mut source, &path).unwrap();
    assert_eq!(summary.bins_written, 2);

    let reader = BinFileReader::open(&path).unwrap();
    assert_eq!(reader.bin_nums().unwrap(), &[46774, 46775]);
    assert_eq!(reader.nobs().unwrap(), &[1, 2]);
    assert_eq!(reader.nscenes().unwrap(), &[1, 1]);
    assert_eq!(reader.feature("x_min").unwrap(), &[0.14, 0.398]);
    assert_eq!(reader.feature("x_max").unwrap(), &[0.14, 0.89]);
}

#[test]
fn test_nan_samples_do_not_contribute() {
    let ctx = min_max_context(CompositingType::Binning);
    let bin = spatial_bin(&ctx, 7, &[f32::NAN, 2.0, 5.0]);
    assert_eq!(bin.features, vec![2.0, 5.0]);
    assert_eq!(bin.num_obs, 2);
}

#[test]
fn test_bin_manager_feature_names() {
    let variables = VariableContext::new(&[VariableConfig::raw("chl"), VariableConfig::raw("sst")], None, &[])
        .unwrap();
    let aggregators = [
        AggregatorConfig::Avg {
            var_name: "chl".into(),
            weight_coeff: 0.0,
            output_counts: true,
            fill_value: None,
        },
        AggregatorConfig::MinMax {
            var_name: "sst".into(),
            fill_value: None,
        },
    ];

    let manager = BinManager::from_config(&aggregators, None, &variables).unwrap();
    assert_eq!(
        manager.output_feature_names(),
        &["chl_mean", "chl_sigma", "chl_counts", "sst_min", "sst_max"]
    );
    assert_eq!(manager.result_feature_names(), manager.output_feature_names());

    let selection = PostProcessorConfig::Selection {
        var_names: vec!["chl".into(), "chl=chl_mean".into(), "sst_max".into()],
    };
    assert!(BinManager::from_config(&aggregators, Some(&selection), &variables).is_err());

    let selection = PostProcessorConfig::Selection {
        var_names: vec!["chl=chl_mean".into(), "sst_max".into()],
    };
    let manager = BinManager::from_config(&aggregators, Some(&selection), &variables).unwrap();
    assert!(manager.has_post_processor());
    assert_eq!(manager.result_feature_names(), &["chl", "sst_max"]);
}

// =============================================================================
// COMPOSITING
// =============================================================================

fn two_scan_collector(ctx: &Arc<BinningContext>) -> MemoryCollector {
    let collector = MemoryCollector::new(ctx.clone());
    collector
        .consume_spatial_bins(&ScanContext { scan: 1 }, vec![spatial_bin(ctx, 500, &[0.6, 0.7])])
        .unwrap();
    collector
        .consume_spatial_bins(&ScanContext { scan: 0 }, vec![spatial_bin(ctx, 500, &[0.1, 0.9, 0.3])])
        .unwrap();
    collector.consuming_completed().unwrap();
    collector
}

#[test]
fn test_mosaicking_takes_later_bin() {
    let ctx = min_max_context(CompositingType::Mosaicking);
    let collector = two_scan_collector(&ctx);
    let mut source = CollectorBinSource::new(&collector, TemporalBinner::new(ctx.clone()), 1);
    source.open().unwrap();
    let bins = temporal_bins(&source, ALL_PARTS);
    assert_eq!(bins.len(), 1);
    assert_eq!(bins[0].features, vec![0.6, 0.7]);
    assert_eq!(bins[0].num_obs, 2);
    assert_eq!(bins[0].num_passes, 1);
}

#[test]
fn test_binning_combines_scans() {
    let ctx = min_max_context(CompositingType::Binning);
    let collector = two_scan_collector(&ctx);
    let mut source = CollectorBinSource::new(&collector, TemporalBinner::new(ctx.clone()), 1);
    source.open().unwrap();
    let bins = temporal_bins(&source, ALL_PARTS);
    assert_eq!(bins[0].features, vec![0.1, 0.9]);
    assert_eq!(bins[0].num_obs, 5);
    assert_eq!(bins[0].num_passes, 2);
}

// =============================================================================
// COLLECTORS
// =============================================================================

fn scan_batches(ctx: &BinningContext) -> Vec<(u32, Vec<SpatialBin>)> {
    (0..40u32)
        .map(|batch| {
            let scan = batch % 3;
            let bins = (0..50i64)
                .map(|k| {
                    let cell = (k * 97 + batch as i64 * 13) % 2000;
                    spatial_bin(ctx, cell, &[batch as f32, (k % 7) as f32])
                })
                .collect();
            (scan, bins)
        })
        .collect()
}

fn fill_concurrently(collector: &dyn SpatialBinCollector, batches: Vec<(u32, Vec<SpatialBin>)>) {
    batches.into_par_iter().for_each(|(scan, bins)| {
        collector.consume_spatial_bins(&ScanContext { scan }, bins).unwrap();
    });
    collector.consuming_completed().unwrap();
}

#[test]
fn test_memory_and_spill_collectors_agree() {
    let ctx = min_max_context(CompositingType::Binning);
    let dir = temp_test_dir();

    let memory = MemoryCollector::new(ctx.clone());
    let spill = SpillCollector::new(ctx.clone(), Some(dir.path())).unwrap();
    fill_concurrently(&memory, scan_batches(&ctx));
    fill_concurrently(&spill, scan_batches(&ctx));

    let from_memory = collect_all(&memory);
    let from_spill = collect_all(&spill);
    assert_eq!(from_memory.len(), memory.cell_count().unwrap());
    assert_eq!(from_memory, from_spill);

    for pair in from_memory.windows(2) {
        assert!(pair[0].cell_id < pair[1].cell_id);
    }
    for group in &from_memory {
        let scans: Vec<u32> = group.bins.iter().map(|(s, _)| *s).collect();
        assert!(scans.windows(2).all(|w| w[0] < w[1]), "one bin per scan, ascending");
    }
}

#[test]
fn test_merged_bins_keep_every_observation() {
    let ctx = min_max_context(CompositingType::Binning);
    let collector = MemoryCollector::new(ctx.clone());
    let batches = scan_batches(&ctx);
    let expected: i32 = batches
        .iter()
        .flat_map(|(_, bins)| bins.iter().map(|b| b.num_obs))
        .sum();
    fill_concurrently(&collector, batches);

    let total: i32 = collect_all(&collector)
        .iter()
        .flat_map(|g| g.bins.iter().map(|(_, b)| b.num_obs))
        .sum();
    assert_eq!(total, expected);
}

#[test]
fn test_spill_file_removed_on_drop() {
    let ctx = min_max_context(CompositingType::Binning);
    let dir = temp_test_dir();
    let spill = SpillCollector::new(ctx.clone(), Some(dir.path())).unwrap();
    let path = spill.path().to_path_buf();
    fill_concurrently(&spill, scan_batches(&ctx));
    assert!(path.exists());
    drop(spill);
    assert!(!path.exists());
}

#[test]
fn test_parts_cover_all_bins() {
    let ctx = min_max_context(CompositingType::Binning);
    let collector = MemoryCollector::new(ctx.clone());
    fill_concurrently(&collector, scan_batches(&ctx));

    let mut source = CollectorBinSource::new(&collector, TemporalBinner::new(ctx.clone()), 4);
    let parts = source.open().unwrap();
    assert_eq!(parts, 4);

    let all = temporal_bins(&source, ALL_PARTS);
    let joined: Vec<TemporalBin> = (0..parts as i32).flat_map(|p| temporal_bins(&source, p)).collect();
    assert_eq!(all, joined);
    assert_eq!(all.len(), collector.cell_count().unwrap());

    // Restartable.
    assert_eq!(temporal_bins(&source, ALL_PARTS), all);
    assert!(source.get_part(4).is_err());
    source.close().unwrap();
    assert!(source.get_part(ALL_PARTS).is_err());
}

#[test]
fn test_unsealed_source_rejected() {
    let ctx = min_max_context(CompositingType::Binning);
    let collector = MemoryCollector::new(ctx.clone());
    let mut source = CollectorBinSource::new(&collector, TemporalBinner::new(ctx), 1);
    assert!(source.open().is_err());
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn test_full_config_round_trips() {
    let config = BinningConfig::from_yaml_str(configs::FULL_YAML).unwrap();
    config.validate().unwrap();
    let yaml = config.to_yaml_string().unwrap();
    assert_eq!(BinningConfig::from_yaml_str(&yaml).unwrap(), config);

    let ctx = config.build_context().unwrap();
    assert_eq!(ctx.super_sampling(), 3);
    assert_eq!(ctx.bin_manager().result_feature_names(), &["log_chl_mean", "sst_max"]);
    assert_approx_eq!(ctx.grid().lat_span(), 1.0 / 12.0, 1e-12);
}

#[test]
fn test_yaml_and_json_agree() {
    let yaml = BinningConfig::from_yaml_str(configs::MIN_MAX_YAML).unwrap();
    let json = BinningConfig::from_json_str(configs::MIN_MAX_JSON).unwrap();
    assert_eq!(yaml.num_rows, json.num_rows);
    assert_eq!(yaml.aggregators, json.aggregators);
    assert_eq!(yaml.variables, json.variables);
}
