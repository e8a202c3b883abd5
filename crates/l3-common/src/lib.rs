//! Common types shared across the Level-3 binning workspace.

pub mod bbox;
pub mod period;
pub mod time;

pub use bbox::BoundingBox;
pub use period::{DataPeriod, Membership, SpatialDataPeriod, UtcDataPeriod};
pub use time::{parse_utc, TimeParseError, TimeRange};
