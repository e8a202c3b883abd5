//! Benchmarks for the binning crate - grid lookup, product scans and output encoding.
//!
//! Run with: cargo bench --package l3-binning -- grid
//! Or: cargo bench --package l3-binning --bench binning_benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use l3_binning::{
    AffineGeoCoding, AggregatorConfig, BinManager, BinWriter, BinningContext, CompositingType, GridIndex,
    MemoryCollector, NullProgress, Product, RasterProduct, ScanContext, SpatialBinCollector, SpatialProductBinner,
    TemporalBin, VariableConfig, VariableContext, VecTemporalBinSource,
};
use test_utils::{create_chlorophyll_field, fixtures::swath};

fn avg_context(num_rows: i32, super_sampling: i32) -> Arc<BinningContext> {
    let variables = VariableContext::new(&[VariableConfig::raw("chl")], Some("chl > 0"), &[]).unwrap();
    let manager = BinManager::from_config(
        &[AggregatorConfig::Avg {
            var_name: "chl".into(),
            weight_coeff: 0.5,
            output_counts: false,
            fill_value: None,
        }],
        None,
        &variables,
    )
    .unwrap();
    Arc::new(
        BinningContext::new(
            GridIndex::new(num_rows).unwrap(),
            variables,
            manager,
            CompositingType::Binning,
            super_sampling,
        )
        .unwrap(),
    )
}

fn dense_product() -> RasterProduct {
    let spec = swath::DENSE_1000;
    RasterProduct::new("dense", spec.width, spec.height)
        .with_geo_coding(AffineGeoCoding::new(spec.lon0, spec.lat0, spec.dlon, spec.dlat))
        .with_band("chl", create_chlorophyll_field(spec.width, spec.height))
        .unwrap()
}

// =============================================================================
// GRID LOOKUP BENCHMARKS
// =============================================================================

fn bench_grid_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_lookup");

    for num_rows in [216, 2160, 4320] {
        let grid = GridIndex::new(num_rows).unwrap();
        let points: Vec<(f64, f64)> = (0..10_000)
            .map(|i| {
                let f = i as f64 / 10_000.0;
                (-89.9 + 179.8 * f, -180.0 + 360.0 * ((f * 7.0) % 1.0))
            })
            .collect();

        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(BenchmarkId::new("cell_id", num_rows), &points, |b, points| {
            b.iter(|| {
                points
                    .iter()
                    .map(|(lat, lon)| grid.cell_id(*lat, *lon))
                    .fold(0i64, |acc, id| acc ^ id)
            });
        });
        group.bench_with_input(BenchmarkId::new("output_number", num_rows), &points, |b, points| {
            b.iter(|| {
                points
                    .iter()
                    .map(|(lat, lon)| grid.output_number_of(grid.cell_id(*lat, *lon)))
                    .fold(0i64, |acc, id| acc ^ id)
            });
        });
    }

    group.finish();
}

// =============================================================================
// PRODUCT SCAN BENCHMARKS
// =============================================================================

fn bench_product_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("product_scan");
    group.sample_size(10);

    let product = dense_product();
    let pixels = (product.width() * product.height()) as u64;

    for (threads, super_sampling) in [(1, 1), (4, 1), (4, 3)] {
        let ctx = avg_context(2160, super_sampling);
        let binner = SpatialProductBinner::new(ctx.clone(), threads, 256).unwrap();

        group.throughput(Throughput::Elements(pixels));
        group.bench_function(
            BenchmarkId::new(format!("threads_{}", threads), format!("ss_{}", super_sampling)),
            |b| {
                b.iter(|| {
                    let collector = MemoryCollector::new(ctx.clone());
                    binner
                        .process_product(black_box(&product), &collector, ScanContext { scan: 0 }, &NullProgress)
                        .unwrap();
                    collector.consuming_completed().unwrap();
                    collector.cell_count().unwrap()
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// OUTPUT ENCODING BENCHMARKS
// =============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let ctx = avg_context(2160, 1);

    for count in [10_000i64, 100_000] {
        let bins: Vec<TemporalBin> = (0..count)
            .map(|i| TemporalBin::with_features(i * 37, 4, 1, vec![0.5, 0.1]))
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("bins", count), &bins, |b, bins| {
            b.iter(|| {
                let mut source = VecTemporalBinSource::new(bins.clone());
                BinWriter::new(&ctx, "bench").to_bytes(&mut source).unwrap().len()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid_lookup, bench_product_scan, bench_encode);
criterion_main!(benches);
