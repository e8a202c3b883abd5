//! Data periods decide whether an observation belongs to the processing
//! window.
//!
//! Two flavours exist:
//! - [`UtcDataPeriod`]: a plain UTC interval, longitude is ignored.
//! - [`SpatialDataPeriod`]: the "spatial data-day". The window is shifted
//!   into local solar time (15° of longitude per hour) and starts at
//!   `min_data_hour` local time, so that a swath crossing the day boundary
//!   is cut where the sun is lowest instead of at the UTC date line.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Position of an observation time relative to a data period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    /// Before the period starts.
    Previous,
    /// Inside the period.
    Current,
    /// At or after the period end.
    Subsequent,
}

/// A processing window over observation times.
pub trait DataPeriod: Send + Sync + std::fmt::Debug {
    /// Start of the period (UTC).
    fn start_time(&self) -> DateTime<Utc>;

    /// Exclusive end of the period (UTC).
    fn end_time(&self) -> DateTime<Utc>;

    /// Membership of an observation taken at `time` and longitude `lon`.
    fn membership(&self, lon: f64, time: DateTime<Utc>) -> Membership;
}

fn classify(t: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> Membership {
    if t < start {
        Membership::Previous
    } else if t >= end {
        Membership::Subsequent
    } else {
        Membership::Current
    }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

/// A UTC interval `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcDataPeriod {
    start: DateTime<Utc>,
    duration: Duration,
}

impl UtcDataPeriod {
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// Period of whole days.
    pub fn days(start: DateTime<Utc>, days: f64) -> Self {
        Self::new(start, hours(days * 24.0))
    }
}

impl DataPeriod for UtcDataPeriod {
    fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    fn membership(&self, _lon: f64, time: DateTime<Utc>) -> Membership {
        classify(time, self.start_time(), self.end_time())
    }
}

/// A period evaluated in local solar time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialDataPeriod {
    start: DateTime<Utc>,
    duration: Duration,
    min_data_hour: f64,
}

impl SpatialDataPeriod {
    pub fn new(start: DateTime<Utc>, duration: Duration, min_data_hour: f64) -> Self {
        Self {
            start,
            duration,
            min_data_hour,
        }
    }

    /// Period of whole days starting at `min_data_hour` local time.
    pub fn days(start: DateTime<Utc>, days: f64, min_data_hour: f64) -> Self {
        Self::new(start, hours(days * 24.0), min_data_hour)
    }

    /// Local solar time of a UTC instant at the given longitude.
    pub fn local_solar_time(time: DateTime<Utc>, lon: f64) -> DateTime<Utc> {
        time + hours(lon / 15.0)
    }
}

impl DataPeriod for SpatialDataPeriod {
    fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    fn membership(&self, lon: f64, time: DateTime<Utc>) -> Membership {
        let local = Self::local_solar_time(time, lon);
        let offset = hours(self.min_data_hour);
        classify(local, self.start + offset, self.end_time() + offset)
    }
}
