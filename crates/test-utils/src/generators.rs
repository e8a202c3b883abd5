//! Synthetic swath data for binning tests.
//!
//! Every generator returns row-major data with row 0 first, matching the
//! band layout of an in-memory raster product.

/// Creates a field with predictable values.
///
/// Each pixel value is `col * 1000 + row`, so a binned value can be traced
/// back to the pixel it came from.
///
/// # Example
///
/// ```
/// use test_utils::create_test_field;
///
/// let field = create_test_field(10, 5);
/// assert_eq!(field.len(), 50);
/// assert_eq!(field[1], 1000.0);
/// assert_eq!(field[10], 1.0);
/// ```
pub fn create_test_field(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a chlorophyll-like field in mg/m^3.
///
/// Values follow a smooth pattern between roughly 0.01 and 10, which keeps
/// log-space averages well conditioned.
pub fn create_chlorophyll_field(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = col as f32 / width.max(1) as f32;
            let y = row as f32 / height.max(1) as f32;
            let phase = (x * std::f32::consts::TAU).sin() * (y * std::f32::consts::PI).cos();
            data.push(10f32.powf(phase * 1.5 - 0.5));
        }
    }
    data
}

/// Creates a field where every pixel has the same value.
pub fn create_constant_field(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a field with NaN at every `nan_every`-th pixel and a constant
/// value elsewhere.
///
/// # Panics
///
/// Panics if `nan_every` is zero.
pub fn create_field_with_nans(width: usize, height: usize, value: f32, nan_every: usize) -> Vec<f32> {
    assert!(nan_every > 0, "nan_every must be positive");
    (0..width * height)
        .map(|i| if i % nan_every == 0 { f32::NAN } else { value })
        .collect()
}

/// Pixel-centre latitudes and longitudes of a regular lat/lon swath.
///
/// Pixel `(col, row)` is centred on `(lat0 + (row + 0.5) * dlat,
/// lon0 + (col + 0.5) * dlon)`. Longitudes are wrapped to `[-180, 180)`.
pub fn create_lat_lon_arrays(
    width: usize,
    height: usize,
    lon0: f64,
    lat0: f64,
    dlon: f64,
    dlat: f64,
) -> (Vec<f32>, Vec<f32>) {
    let mut lats = Vec::with_capacity(width * height);
    let mut lons = Vec::with_capacity(width * height);
    for row in 0..height {
        let lat = lat0 + (row as f64 + 0.5) * dlat;
        for col in 0..width {
            let lon = (lon0 + (col as f64 + 0.5) * dlon + 180.0).rem_euclid(360.0) - 180.0;
            lats.push(lat as f32);
            lons.push(lon as f32);
        }
    }
    (lats, lons)
}

/// Encodes values as little-endian `f32`, the raw band format of the
/// `l3bin` manifest.
pub fn to_f32_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
