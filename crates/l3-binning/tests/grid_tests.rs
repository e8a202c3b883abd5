//! Integration tests for the equal-area grid.

use l3_binning::GridIndex;
use test_utils::assert_approx_eq;

// =============================================================================
// GRID PROPERTIES
// =============================================================================

#[test]
fn test_row_counts_sum_to_total_bins() {
    for num_rows in [1, 2, 18, 216, 2160] {
        let grid = GridIndex::new(num_rows).unwrap();
        let sum: i64 = (0..grid.num_rows()).map(|r| grid.column_count(r) as i64).sum();
        assert_eq!(sum, grid.total_bins(), "num_rows = {}", num_rows);
    }
}

#[test]
fn test_column_counts_non_increasing_away_from_equator() {
    let grid = GridIndex::new(180).unwrap();
    let half = grid.num_rows() / 2;
    for row in 1..half {
        assert!(grid.column_count(row) >= grid.column_count(row - 1));
    }
    for row in half..grid.num_rows() - 1 {
        assert!(grid.column_count(row) >= grid.column_count(row + 1));
    }
}

#[test]
fn test_lat_span_constant() {
    let grid = GridIndex::new(2160).unwrap();
    assert_approx_eq!(grid.lat_span(), 180.0 / 2160.0, 1e-12);
    for row in [0, 500, 1079, 2159] {
        let (lat_span, _) = grid.bounds_of(row);
        assert_approx_eq!(lat_span, grid.lat_span(), 1e-12);
    }
}

#[test]
fn test_output_numbers_partition_south_first() {
    let grid = GridIndex::new(72).unwrap();
    let n = grid.num_rows();

    // Southernmost row starts at 1, each following row starts right after
    // the previous one ends.
    assert_eq!(grid.output_start(n - 1), 1);
    for output_row in 1..n {
        let row = grid.row_at_output(output_row);
        let below = grid.row_at_output(output_row - 1);
        assert_eq!(
            grid.output_start(row),
            grid.output_start(below) + grid.column_count(below) as i64
        );
    }
    let north = 0;
    assert_eq!(
        grid.output_start(north) + grid.column_count(north) as i64 - 1,
        grid.total_bins()
    );

    let mut seen = vec![false; grid.total_bins() as usize + 1];
    for cell in 0..grid.total_bins() {
        let out = grid.output_number_of(cell) as usize;
        assert!(!seen[out], "output number {} assigned twice", out);
        seen[out] = true;
    }
    assert!(seen[1..].iter().all(|s| *s));
}

#[test]
fn test_cell_ids_ascending_north_first() {
    let grid = GridIndex::new(36).unwrap();
    let north = grid.cell_id(85.0, 0.0);
    let south = grid.cell_id(-85.0, 0.0);
    assert!(north < south);
    assert!(grid.output_number_of(north) > grid.output_number_of(south));
}

// =============================================================================
// 216-ROW SCENARIO
// =============================================================================

#[test]
fn test_216_row_grid() {
    let grid = GridIndex::new(216).unwrap();
    assert_eq!(grid.total_bins(), 59408);

    // Rows adjacent to the equator.
    assert_eq!(grid.column_count(107), 432);
    assert_eq!(grid.column_count(108), 432);

    // Polar rows.
    assert_eq!(grid.column_count(0), 3);
    assert_eq!(grid.column_count(215), 3);

    assert_approx_eq!(grid.lat_span(), 0.8333333, 1e-6);
    let (_, polar_lon_span) = grid.bounds_of(0);
    assert_approx_eq!(polar_lon_span, 120.0, 1e-12);
    let (_, equator_lon_span) = grid.bounds_of(107);
    assert_approx_eq!(equator_lon_span, 360.0 / 432.0, 1e-12);
}

#[test]
fn test_216_row_output_numbers() {
    let grid = GridIndex::new(216).unwrap();
    assert_eq!(grid.row_of(12345), 65);
    assert_eq!(grid.output_row(65), 150);
    assert_eq!(grid.output_number_of(12345), 46774);
    assert_eq!(grid.output_number_of(12346), 46775);
    assert_eq!(grid.cell_id_of_output(46774), Some(12345));
}

#[test]
fn test_location_lookup_matches_cell_centre() {
    let grid = GridIndex::new(216).unwrap();
    let (lat, lon) = grid.center_of(12345);
    assert_eq!(grid.cell_id(lat, lon), 12345);

    let (lat_span, lon_span) = grid.bounds_of(65);
    assert_eq!(grid.cell_id(lat + 0.49 * lat_span, lon - 0.49 * lon_span), 12345);
    assert_eq!(grid.cell_id(lat, lon + 0.51 * lon_span), 12346);
}
