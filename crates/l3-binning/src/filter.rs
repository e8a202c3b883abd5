//! Decide which source products take part in a run.

use std::fmt;
use std::sync::Arc;

use l3_common::{BoundingBox, DataPeriod, Membership};

use crate::product::Product;

/// Accepts or rejects a source product before it is scanned.
pub trait SourceProductFilter: Send + Sync + fmt::Debug {
    fn accept(&self, product: &dyn Product) -> bool;

    /// Short label used when logging rejections.
    fn name(&self) -> &'static str;
}

/// Rejects products that cannot be geo-located.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoCodingFilter;

impl SourceProductFilter for GeoCodingFilter {
    fn accept(&self, product: &dyn Product) -> bool {
        product.geo_coding().is_some()
    }

    fn name(&self) -> &'static str {
        "geo-coding"
    }
}

/// Rejects products whose footprint misses the region.
#[derive(Debug, Clone, Copy)]
pub struct RegionFilter {
    region: BoundingBox,
}

impl RegionFilter {
    pub fn new(region: BoundingBox) -> Self {
        Self { region }
    }
}

impl SourceProductFilter for RegionFilter {
    fn accept(&self, product: &dyn Product) -> bool {
        product
            .footprint()
            .is_some_and(|fp| fp.intersects(&self.region))
    }

    fn name(&self) -> &'static str {
        "region"
    }
}

/// Accepts products whose time span overlaps the period.
#[derive(Debug, Clone)]
pub struct TimeFilter {
    period: Arc<dyn DataPeriod>,
}

impl TimeFilter {
    pub fn new(period: Arc<dyn DataPeriod>) -> Self {
        Self { period }
    }
}

impl SourceProductFilter for TimeFilter {
    fn accept(&self, product: &dyn Product) -> bool {
        let Some(start) = product.start_time() else {
            return false;
        };
        let end = product.end_time().unwrap_or(start);
        start < self.period.end_time() && end >= self.period.start_time()
    }

    fn name(&self) -> &'static str {
        "time"
    }
}

/// Spatial data-day check: the first and last scan lines are placed in
/// local solar time at the longitude of their center pixel. A product is
/// rejected when both fall before, or both after, the period.
#[derive(Debug, Clone)]
pub struct SpatialDataDayFilter {
    period: Arc<dyn DataPeriod>,
}

impl SpatialDataDayFilter {
    pub fn new(period: Arc<dyn DataPeriod>) -> Self {
        Self { period }
    }

    fn line_membership(&self, product: &dyn Product, y: usize) -> Option<Membership> {
        let time = product.line_time(y)?;
        let pos = product
            .geo_coding()?
            .pixel_to_geo(product.width() as f64 / 2.0, y as f64 + 0.5)?;
        Some(self.period.membership(pos.lon, time))
    }
}

impl SourceProductFilter for SpatialDataDayFilter {
    fn accept(&self, product: &dyn Product) -> bool {
        if product.height() == 0 {
            return false;
        }
        let first = self.line_membership(product, 0);
        let last = self.line_membership(product, product.height() - 1);
        match (first, last) {
            (Some(Membership::Previous), Some(Membership::Previous)) => false,
            (Some(Membership::Subsequent), Some(Membership::Subsequent)) => false,
            (Some(_), Some(_)) => true,
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "spatial-data-day"
    }
}

/// All filters must accept.
#[derive(Debug, Default)]
pub struct ChainedFilter {
    filters: Vec<Box<dyn SourceProductFilter>>,
}

impl ChainedFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl SourceProductFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Name of the first filter that rejects `product`.
    pub fn rejected_by(&self, product: &dyn Product) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|f| !f.accept(product))
            .map(|f| f.name())
    }
}

impl SourceProductFilter for ChainedFilter {
    fn accept(&self, product: &dyn Product) -> bool {
        self.rejected_by(product).is_none()
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{AffineGeoCoding, RasterProduct};
    use chrono::{DateTime, TimeZone, Utc};
    use l3_common::{SpatialDataPeriod, UtcDataPeriod};

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 6, d, h, 0, 0).unwrap()
    }

    /// 10x10 degree product with its left edge at `lon0`.
    fn product(lon0: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> RasterProduct {
        RasterProduct::new("p", 10, 10)
            .with_time(start, end)
            .with_geo_coding(AffineGeoCoding::new(lon0, 10.0, 1.0, -1.0))
    }

    #[test]
    fn test_geo_coding_filter() {
        assert!(!GeoCodingFilter.accept(&RasterProduct::new("bare", 2, 2)));
        assert!(GeoCodingFilter.accept(&product(0.0, at(3, 0), at(3, 1))));
    }

    #[test]
    fn test_region_filter() {
        let p = product(0.0, at(3, 0), at(3, 1));
        assert!(RegionFilter::new(BoundingBox::new(5.0, 5.0, 20.0, 20.0)).accept(&p));
        assert!(!RegionFilter::new(BoundingBox::new(50.0, 5.0, 60.0, 20.0)).accept(&p));
    }

    #[test]
    fn test_time_filter() {
        let filter = TimeFilter::new(Arc::new(UtcDataPeriod::days(at(3, 0), 1.0)));
        assert!(filter.accept(&product(0.0, at(2, 23), at(3, 1))));
        assert!(filter.accept(&product(0.0, at(3, 12), at(3, 13))));
        assert!(!filter.accept(&product(0.0, at(4, 0), at(4, 1))));
        assert!(!filter.accept(&product(0.0, at(2, 1), at(2, 2))));
        assert!(!filter.accept(&RasterProduct::new("untimed", 2, 2)));
    }

    #[test]
    fn test_spatial_data_day_filter() {
        // Day starts at 10:00 local solar time.
        let period = Arc::new(SpatialDataPeriod::days(at(3, 0), 1.0, 10.0));
        let filter = SpatialDataDayFilter::new(period);

        // Center lon 5: +20 min local. 12:00-13:00 UTC is inside.
        assert!(filter.accept(&product(0.0, at(3, 12), at(3, 13))));
        // 05:00-06:00 UTC is before 10:00 local on day 3.
        assert!(!filter.accept(&product(0.0, at(3, 5), at(3, 6))));
        // At lon 175 local time is 11h40 ahead: 23:00 UTC on day 3 is
        // 10:40 local on day 4, after the period.
        assert!(!filter.accept(&product(170.0, at(3, 23), at(3, 23))));
        // Straddling the start is kept.
        assert!(filter.accept(&product(0.0, at(3, 9), at(3, 11))));
    }

    #[test]
    fn test_chained_filter_reports_first_rejection() {
        let chain = ChainedFilter::new()
            .with(GeoCodingFilter)
            .with(RegionFilter::new(BoundingBox::new(50.0, 0.0, 60.0, 10.0)));
        assert_eq!(chain.len(), 2);
        let p = product(0.0, at(3, 0), at(3, 1));
        assert_eq!(chain.rejected_by(&p), Some("region"));
        assert!(!chain.accept(&p));
        assert_eq!(chain.rejected_by(&RasterProduct::new("bare", 2, 2)), Some("geo-coding"));
    }
}
