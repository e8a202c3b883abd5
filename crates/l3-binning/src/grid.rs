//! The sinusoidal equal-area grid (ISIN / SeaWiFS binning scheme).
//!
//! The globe is cut into `num_rows` latitude bands of `180 / num_rows`
//! degrees. Each band holds `round(2 * num_rows * cos(lat))` cells, so cells
//! have nearly equal area. Two numbering schemes exist and are kept apart:
//!
//! - **cell id**: 0-based, rows counted from the north pole, used for all
//!   accumulation and collection.
//! - **output bin number**: 1-based, rows counted from the south pole, used
//!   only in written files.
//!
//! All row/column/number facts come from [`GridIndex`]; nothing else in the
//! crate recomputes them.

use crate::error::{BinningError, Result};

/// Row/column geometry and numbering of the equal-area grid.
#[derive(Debug, Clone)]
pub struct GridIndex {
    num_rows: usize,
    /// Center latitude of each row (north first).
    center_lat: Vec<f64>,
    /// Number of cells in each row.
    columns: Vec<usize>,
    /// Cell id of the first cell in each row.
    base_cell: Vec<i64>,
    /// Output bin number (1-based) of the first cell in each row.
    output_start: Vec<i64>,
    total_bins: i64,
}

impl GridIndex {
    /// Build a grid with `num_rows` latitude bands.
    pub fn new(num_rows: i32) -> Result<Self> {
        if num_rows <= 0 {
            return Err(BinningError::configuration(format!(
                "num_rows must be > 0, got {}",
                num_rows
            )));
        }
        let n = num_rows as usize;

        let mut center_lat = Vec::with_capacity(n);
        let mut columns = Vec::with_capacity(n);
        let mut base_cell = Vec::with_capacity(n);

        let mut next = 0i64;
        for row in 0..n {
            let lat = 90.0 - (row as f64 + 0.5) * 180.0 / n as f64;
            let cols = ((2.0 * n as f64 * lat.to_radians().cos()) + 0.5) as usize;
            let cols = cols.max(1);
            center_lat.push(lat);
            columns.push(cols);
            base_cell.push(next);
            next += cols as i64;
        }
        let total_bins = next;

        // Output numbering walks the rows from the south.
        let mut output_start = vec![0i64; n];
        let mut next_out = 1i64;
        for row in (0..n).rev() {
            output_start[row] = next_out;
            next_out += columns[row] as i64;
        }

        Ok(Self {
            num_rows: n,
            center_lat,
            columns,
            base_cell,
            output_start,
            total_bins,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Total number of cells in the grid.
    pub fn total_bins(&self) -> i64 {
        self.total_bins
    }

    /// Latitude extent of every row in degrees.
    pub fn lat_span(&self) -> f64 {
        180.0 / self.num_rows as f64
    }

    /// Row containing the latitude; values beyond the poles clamp to the
    /// polar rows.
    pub fn row_of_lat(&self, lat: f64) -> usize {
        let r = ((90.0 - lat) * self.num_rows as f64 / 180.0).floor();
        if r.is_nan() || r < 0.0 {
            0
        } else {
            (r as usize).min(self.num_rows - 1)
        }
    }

    /// Column within `row` containing the longitude (wrapped to [-180, 180)).
    pub fn col_of_lon(&self, row: usize, lon: f64) -> usize {
        let cols = self.columns[row];
        let lon = (lon + 180.0).rem_euclid(360.0);
        let c = (lon * cols as f64 / 360.0).floor();
        if c.is_nan() || c < 0.0 {
            0
        } else {
            (c as usize).min(cols - 1)
        }
    }

    /// Cell id containing a geographic position.
    pub fn cell_id(&self, lat: f64, lon: f64) -> i64 {
        let row = self.row_of_lat(lat);
        self.base_cell[row] + self.col_of_lon(row, lon) as i64
    }

    /// Cell id of a (row, column) pair.
    pub fn cell_id_of(&self, row: usize, col: usize) -> i64 {
        self.base_cell[row] + col as i64
    }

    /// Row of a cell id. Ids outside the grid clamp to the first/last row.
    pub fn row_of(&self, cell_id: i64) -> usize {
        match self.base_cell.binary_search(&cell_id) {
            Ok(row) => row,
            Err(0) => 0,
            Err(insert) => insert - 1,
        }
    }

    /// Column of a cell id within its row.
    pub fn col_of(&self, cell_id: i64) -> usize {
        let row = self.row_of(cell_id);
        (cell_id - self.base_cell[row]).max(0) as usize
    }

    /// Whether the id names a cell of this grid.
    pub fn contains(&self, cell_id: i64) -> bool {
        cell_id >= 0 && cell_id < self.total_bins
    }

    /// Number of cells in a row.
    pub fn column_count(&self, row: usize) -> usize {
        self.columns[row]
    }

    /// `(lat_span, lon_span)` of the cells in a row.
    pub fn bounds_of(&self, row: usize) -> (f64, f64) {
        (self.lat_span(), 360.0 / self.columns[row] as f64)
    }

    /// Center latitude of a row.
    pub fn center_lat(&self, row: usize) -> f64 {
        self.center_lat[row]
    }

    /// Center `(lat, lon)` of a cell.
    pub fn center_of(&self, cell_id: i64) -> (f64, f64) {
        let row = self.row_of(cell_id);
        let col = self.col_of(cell_id);
        let lon = -180.0 + (col as f64 + 0.5) * 360.0 / self.columns[row] as f64;
        (self.center_lat[row], lon)
    }

    /// Position of a row in output order (0 = southernmost).
    pub fn output_row(&self, row: usize) -> usize {
        self.num_rows - 1 - row
    }

    /// Grid row at a given output-order position.
    pub fn row_at_output(&self, output_row: usize) -> usize {
        self.num_rows - 1 - output_row
    }

    /// Output bin number of the first cell in a row.
    pub fn output_start(&self, row: usize) -> i64 {
        self.output_start[row]
    }

    /// Output bin number of a cell: south-pole-first, 1-based.
    pub fn output_number_of(&self, cell_id: i64) -> i64 {
        let row = self.row_of(cell_id);
        self.output_start[row] + (cell_id - self.base_cell[row])
    }

    /// Inverse of [`output_number_of`](Self::output_number_of).
    pub fn cell_id_of_output(&self, bin_num: i64) -> Option<i64> {
        if bin_num < 1 || bin_num > self.total_bins {
            return None;
        }
        // output_start decreases with row, so search from the south.
        let out_row = (0..self.num_rows)
            .map(|o| self.row_at_output(o))
            .take_while(|&row| self.output_start[row] <= bin_num)
            .last()?;
        Some(self.base_cell[out_row] + (bin_num - self.output_start[out_row]))
    }

    /// Cell ids covering a latitude band, as an inclusive-exclusive range of
    /// rows `[first_row, end_row)`.
    pub fn cell_range_of_rows(&self, first_row: usize, end_row: usize) -> (i64, i64) {
        let start = self.base_cell[first_row.min(self.num_rows - 1)];
        let end = if end_row >= self.num_rows {
            self.total_bins
        } else {
            self.base_cell[end_row]
        };
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_rows() {
        assert!(matches!(
            GridIndex::new(0),
            Err(BinningError::Configuration(_))
        ));
        assert!(GridIndex::new(-4).is_err());
    }

    #[test]
    fn test_row_and_column_of_known_cells() {
        let grid = GridIndex::new(216).unwrap();
        assert_eq!(grid.row_of(12345), 65);
        assert_eq!(grid.col_of(12345), 31);
        assert_eq!(grid.cell_id_of(65, 31), 12345);
        assert_eq!(grid.row_of(0), 0);
        assert_eq!(grid.row_of(grid.total_bins() - 1), 215);
    }

    #[test]
    fn test_cell_id_clamps_and_wraps() {
        let grid = GridIndex::new(18).unwrap();
        assert_eq!(grid.row_of_lat(95.0), 0);
        assert_eq!(grid.row_of_lat(-91.0), 17);
        assert_eq!(grid.cell_id(0.5, 10.0), grid.cell_id(0.5, 370.0));
        assert_eq!(grid.cell_id(0.5, -190.0), grid.cell_id(0.5, 170.0));
        // 180°E wraps to -180°.
        assert_eq!(grid.cell_id(0.5, 180.0), grid.cell_id(0.5, -180.0));
    }

    #[test]
    fn test_center_round_trips_to_same_cell() {
        let grid = GridIndex::new(90).unwrap();
        for cell in [0, 17, 500, 4000, grid.total_bins() - 1] {
            let (lat, lon) = grid.center_of(cell);
            assert_eq!(grid.cell_id(lat, lon), cell);
        }
    }

    #[test]
    fn test_output_number_inverse() {
        let grid = GridIndex::new(36).unwrap();
        for cell in 0..grid.total_bins() {
            let n = grid.output_number_of(cell);
            assert_eq!(grid.cell_id_of_output(n), Some(cell));
        }
        assert_eq!(grid.cell_id_of_output(0), None);
        assert_eq!(grid.cell_id_of_output(grid.total_bins() + 1), None);
    }
}
