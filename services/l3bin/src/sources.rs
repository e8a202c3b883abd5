//! Source products described by a JSON manifest.
//!
//! ```json
//! {
//!   "products": [{
//!     "name": "A2020153.L2",
//!     "width": 1354, "height": 2030,
//!     "start_time": "2020-06-01T12:05:00Z",
//!     "end_time": "2020-06-01T12:10:00Z",
//!     "geo_coding": {"type": "pixel", "lat": "lat.f32", "lon": "lon.f32"},
//!     "bands": {"chl": "chl.f32", "sst": "sst.f32"}
//!   }]
//! }
//! ```
//!
//! Band and geo-location files hold raw little-endian `f32` values in
//! row-major order. Relative paths are resolved against the manifest's
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bytes::{Buf, Bytes};
use l3_binning::{AffineGeoCoding, PixelGeoCoding, RasterProduct};
use l3_common::parse_utc;
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level manifest document.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub products: Vec<ProductEntry>,
}

/// Geo-location of one product.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeoCodingEntry {
    /// Regular lat/lon raster; `(lon0, lat0)` is the outer corner of the
    /// first pixel.
    Affine {
        lon0: f64,
        lat0: f64,
        dlon: f64,
        dlat: f64,
    },
    /// Per-pixel latitude and longitude files.
    Pixel { lat: PathBuf, lon: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductEntry {
    pub name: String,
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Products without geo-coding are kept so the run can report them as
    /// excluded.
    #[serde(default)]
    pub geo_coding: Option<GeoCodingEntry>,
    pub bands: BTreeMap<String, PathBuf>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

/// Load every product of the manifest at `path` into memory.
pub fn load_products(path: &Path) -> Result<Vec<RasterProduct>> {
    let manifest = Manifest::from_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let products = manifest
        .products
        .iter()
        .map(|entry| load_product(entry, base))
        .collect::<Result<Vec<_>>>()?;
    info!(manifest = %path.display(), products = products.len(), "Loaded source products");
    Ok(products)
}

fn load_product(entry: &ProductEntry, base: &Path) -> Result<RasterProduct> {
    let pixels = entry.width * entry.height;
    if pixels == 0 {
        bail!("Product '{}' has an empty raster", entry.name);
    }

    let mut product = RasterProduct::new(&entry.name, entry.width, entry.height);

    if let Some(start) = &entry.start_time {
        let start = parse_utc(start).with_context(|| format!("Product '{}': bad start_time", entry.name))?;
        let end = match &entry.end_time {
            Some(end) => parse_utc(end).with_context(|| format!("Product '{}': bad end_time", entry.name))?,
            None => start,
        };
        product = product.with_time(start, end);
    }

    match &entry.geo_coding {
        Some(GeoCodingEntry::Affine {
            lon0,
            lat0,
            dlon,
            dlat,
        }) => {
            product = product.with_geo_coding(AffineGeoCoding::new(*lon0, *lat0, *dlon, *dlat));
        }
        Some(GeoCodingEntry::Pixel { lat, lon }) => {
            let lats = read_f32_file(&base.join(lat), pixels)?;
            let lons = read_f32_file(&base.join(lon), pixels)?;
            let gc = PixelGeoCoding::new(entry.width, entry.height, lats, lons)
                .map_err(|e| anyhow!("Product '{}': {}", entry.name, e))?;
            product = product.with_geo_coding(gc);
        }
        None => {}
    }

    for (band, file) in &entry.bands {
        let data = read_f32_file(&base.join(file), pixels)?;
        product = product
            .with_band(band.as_str(), data)
            .map_err(|e| anyhow!("Product '{}': {}", entry.name, e))?;
    }

    debug!(
        product = %entry.name,
        width = entry.width,
        height = entry.height,
        bands = entry.bands.len(),
        "Loaded product"
    );
    Ok(product)
}

/// Read `expected` little-endian `f32` values.
pub fn read_f32_file(path: &Path, expected: usize) -> Result<Vec<f32>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if raw.len() != expected * 4 {
        bail!(
            "{} holds {} bytes, expected {} f32 values",
            path.display(),
            raw.len(),
            expected
        );
    }
    let mut buf = Bytes::from(raw);
    let mut values = Vec::with_capacity(expected);
    while buf.has_remaining() {
        values.push(buf.get_f32_le());
    }
    Ok(values)
}
