//! Source products: tiled raster access plus pixel geo-location.
//!
//! Reading satellite file formats is outside this crate. Callers implement
//! [`Product`] for their reader, or load data into a [`RasterProduct`].

use chrono::{DateTime, Duration, Utc};
use l3_common::BoundingBox;

use crate::error::{BinningError, Result};

/// A rectangular block of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Split a `width` x `height` raster into tiles of at most `tile_size`
    /// pixels per side, row-major.
    pub fn tiles(width: usize, height: usize, tile_size: usize) -> Vec<TileRect> {
        let tile_size = tile_size.max(1);
        let mut tiles = Vec::new();
        for y in (0..height).step_by(tile_size) {
            for x in (0..width).step_by(tile_size) {
                tiles.push(TileRect::new(
                    x,
                    y,
                    tile_size.min(width - x),
                    tile_size.min(height - y),
                ));
            }
        }
        tiles
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.0
    }
}

/// Maps image coordinates to geographic positions.
///
/// Image coordinates are continuous: pixel `(i, j)` covers
/// `[i, i + 1) x [j, j + 1)` and its center is `(i + 0.5, j + 0.5)`.
pub trait GeoCoding: Send + Sync + std::fmt::Debug {
    fn pixel_to_geo(&self, x: f64, y: f64) -> Option<GeoPos>;
}

/// Regular latitude/longitude raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineGeoCoding {
    /// Longitude of the left edge of column 0.
    pub lon0: f64,
    /// Latitude of the top edge of row 0.
    pub lat0: f64,
    /// Degrees of longitude per pixel.
    pub dlon: f64,
    /// Degrees of latitude per pixel (negative for north-up rasters).
    pub dlat: f64,
}

impl AffineGeoCoding {
    pub fn new(lon0: f64, lat0: f64, dlon: f64, dlat: f64) -> Self {
        Self {
            lon0,
            lat0,
            dlon,
            dlat,
        }
    }
}

impl GeoCoding for AffineGeoCoding {
    fn pixel_to_geo(&self, x: f64, y: f64) -> Option<GeoPos> {
        let pos = GeoPos::new(self.lat0 + y * self.dlat, self.lon0 + x * self.dlon);
        pos.is_valid().then_some(pos)
    }
}

/// Per-pixel latitude/longitude arrays (swath products), bilinearly
/// interpolated between pixel centers.
#[derive(Debug, Clone)]
pub struct PixelGeoCoding {
    width: usize,
    height: usize,
    lats: Vec<f32>,
    lons: Vec<f32>,
}

impl PixelGeoCoding {
    pub fn new(width: usize, height: usize, lats: Vec<f32>, lons: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BinningError::product("geo-coding raster is empty"));
        }
        if lats.len() != width * height || lons.len() != width * height {
            return Err(BinningError::product(format!(
                "geo-coding arrays have {} / {} values, expected {}",
                lats.len(),
                lons.len(),
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            lats,
            lons,
        })
    }

    fn at(&self, i: usize, j: usize) -> (f64, f64) {
        let k = j * self.width + i;
        (self.lats[k] as f64, self.lons[k] as f64)
    }
}

impl GeoCoding for PixelGeoCoding {
    fn pixel_to_geo(&self, x: f64, y: f64) -> Option<GeoPos> {
        let fx = (x - 0.5).clamp(0.0, (self.width - 1) as f64);
        let fy = (y - 0.5).clamp(0.0, (self.height - 1) as f64);
        let i0 = fx.floor() as usize;
        let j0 = fy.floor() as usize;
        let i1 = (i0 + 1).min(self.width - 1);
        let j1 = (j0 + 1).min(self.height - 1);
        let wx = fx - i0 as f64;
        let wy = fy - j0 as f64;

        let corners = [self.at(i0, j0), self.at(i1, j0), self.at(i0, j1), self.at(i1, j1)];
        let weights = [
            (1.0 - wx) * (1.0 - wy),
            wx * (1.0 - wy),
            (1.0 - wx) * wy,
            wx * wy,
        ];

        // Unwrap longitudes around the first corner so the antimeridian
        // does not average to zero.
        let ref_lon = corners[0].1;
        let mut lat = 0.0;
        let mut lon = 0.0;
        for ((c_lat, c_lon), w) in corners.iter().zip(weights) {
            let mut l = *c_lon;
            if l - ref_lon > 180.0 {
                l -= 360.0;
            } else if ref_lon - l > 180.0 {
                l += 360.0;
            }
            lat += c_lat * w;
            lon += l * w;
        }
        if lon >= 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }

        let pos = GeoPos::new(lat, lon);
        pos.is_valid().then_some(pos)
    }
}

/// A raster source for binning.
pub trait Product: Send + Sync {
    fn name(&self) -> &str;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Time of the first scan line.
    fn start_time(&self) -> Option<DateTime<Utc>>;

    /// Time of the last scan line.
    fn end_time(&self) -> Option<DateTime<Utc>>;

    /// `None` when the product cannot be geo-located.
    fn geo_coding(&self) -> Option<&dyn GeoCoding>;

    fn band_names(&self) -> Vec<String>;

    /// Read one band over a tile, row-major.
    fn read_band(&self, name: &str, rect: TileRect) -> Result<Vec<f32>>;

    /// Geographic extent, sampled along the raster border.
    fn footprint(&self) -> Option<BoundingBox> {
        let gc = self.geo_coding()?;
        let (w, h) = (self.width() as f64, self.height() as f64);
        const STEPS: usize = 32;
        let mut points = Vec::with_capacity(4 * (STEPS + 1));
        for k in 0..=STEPS {
            let f = k as f64 / STEPS as f64;
            points.push((f * w, 0.0));
            points.push((f * w, h));
            points.push((0.0, f * h));
            points.push((w, f * h));
        }
        BoundingBox::from_points(
            points
                .into_iter()
                .filter_map(|(x, y)| gc.pixel_to_geo(x, y))
                .map(|p| (p.lon, p.lat)),
        )
    }

    /// Observation time of a scan line, linear between start and end.
    fn line_time(&self, y: usize) -> Option<DateTime<Utc>> {
        let start = self.start_time()?;
        let end = self.end_time().unwrap_or(start);
        let lines = self.height().saturating_sub(1).max(1) as f64;
        let span_ms = (end - start).num_milliseconds() as f64;
        let offset = (span_ms * y.min(self.height().saturating_sub(1)) as f64 / lines).round();
        Some(start + Duration::milliseconds(offset as i64))
    }
}

/// A product held fully in memory.
#[derive(Debug)]
pub struct RasterProduct {
    name: String,
    width: usize,
    height: usize,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    geo_coding: Option<Box<dyn GeoCoding>>,
    bands: Vec<(String, Vec<f32>)>,
}

impl RasterProduct {
    pub fn new(name: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            start_time: None,
            end_time: None,
            geo_coding: None,
            bands: Vec::new(),
        }
    }

    pub fn with_time(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_geo_coding(mut self, geo_coding: impl GeoCoding + 'static) -> Self {
        self.geo_coding = Some(Box::new(geo_coding));
        self
    }

    /// Add a band; its length must match the raster size.
    pub fn with_band(mut self, name: impl Into<String>, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        if data.len() != self.width * self.height {
            return Err(BinningError::product(format!(
                "band '{}' has {} values, expected {}x{}",
                name,
                data.len(),
                self.width,
                self.height
            )));
        }
        self.bands.retain(|(n, _)| n != &name);
        self.bands.push((name, data));
        Ok(self)
    }
}

impl Product for RasterProduct {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn geo_coding(&self) -> Option<&dyn GeoCoding> {
        self.geo_coding.as_deref()
    }

    fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|(n, _)| n.clone()).collect()
    }

    fn read_band(&self, name: &str, rect: TileRect) -> Result<Vec<f32>> {
        let (_, data) = self
            .bands
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| {
                BinningError::product(format!("product '{}' has no band '{}'", self.name, name))
            })?;
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return Err(BinningError::product(format!(
                "tile {:?} outside {}x{} raster",
                rect, self.width, self.height
            )));
        }
        let mut out = Vec::with_capacity(rect.len());
        for row in rect.y..rect.y + rect.height {
            let start = row * self.width + rect.x;
            out.extend_from_slice(&data[start..start + rect.width]);
        }
        Ok(out)
    }
}
