//! Common test fixtures for binning tests.

/// Bounding boxes as `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// North Atlantic, far from every test swath.
    pub const NORTH_ATLANTIC: (f64, f64, f64, f64) = (-60.0, 20.0, -10.0, 60.0);
}

/// Swath shapes used across tests.
pub mod swath {
    /// A regular lat/lon swath.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SwathSpec {
        pub width: usize,
        pub height: usize,
        /// Longitude of the left edge.
        pub lon0: f64,
        /// Latitude of the top edge.
        pub lat0: f64,
        pub dlon: f64,
        /// Negative for north-up swaths.
        pub dlat: f64,
    }

    impl SwathSpec {
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// `(min_lon, min_lat, max_lon, max_lat)` of the swath edges.
        pub fn bbox(&self) -> (f64, f64, f64, f64) {
            let lon1 = self.lon0 + self.width as f64 * self.dlon;
            let lat1 = self.lat0 + self.height as f64 * self.dlat;
            (
                self.lon0.min(lon1),
                self.lat0.min(lat1),
                self.lon0.max(lon1),
                self.lat0.max(lat1),
            )
        }
    }

    /// 10x10 pixels of 1 degree, north-west corner at (10N, 0E).
    pub const SIMPLE_10X10: SwathSpec = SwathSpec {
        width: 10,
        height: 10,
        lon0: 0.0,
        lat0: 10.0,
        dlon: 1.0,
        dlat: -1.0,
    };

    /// 1000x1000 pixels of 0.01 degree, used by benchmarks.
    pub const DENSE_1000: SwathSpec = SwathSpec {
        width: 1000,
        height: 1000,
        lon0: -5.0,
        lat0: 5.0,
        dlon: 0.01,
        dlat: -0.01,
    };
}

/// Common timestamps.
pub mod time {
    /// Reference start time for synthetic products.
    pub const REFERENCE_TIME: &str = "2020-06-01T00:00:00Z";

    /// Start of the following day.
    pub const NEXT_DAY: &str = "2020-06-02T00:00:00Z";
}

/// Binning request documents.
pub mod configs {
    /// Min/max of one variable `x` on a 216-row grid.
    pub const MIN_MAX_YAML: &str = r#"
num_rows: 216
variables:
  - name: x
aggregators:
  - type: min_max
    var_name: x
"#;

    /// Every key, with an average of a derived variable and a mask.
    pub const FULL_YAML: &str = r#"
num_rows: 2160
mask_expr: "chl > 0 && !nan(sst)"
compositing_type: binning
super_sampling: 3
variables:
  - name: chl
  - name: sst
  - name: log_chl
    expr: "log(chl)"
aggregators:
  - type: avg
    var_name: log_chl
    weight_coeff: 0.5
    output_counts: true
  - type: min_max
    var_name: sst
    fill_value: -999.0
post_processor:
  type: selection
  var_names: ["log_chl_mean", "sst_max"]
region:
  min_x: -60.0
  min_y: 20.0
  max_x: -10.0
  max_y: 60.0
time_filter:
  type: time_range
  start: "2020-06-01T00:00:00Z"
  period_days: 1.0
collector:
  type: spill
tile_size: 256
parallelism: 4
num_parts: 2
output:
  path: /tmp/l3_chl.bin
  title: North Atlantic chlorophyll
"#;

    /// Same as [`MIN_MAX_YAML`] in JSON.
    pub const MIN_MAX_JSON: &str = r#"{
  "num_rows": 216,
  "variables": [{"name": "x"}],
  "aggregators": [{"type": "min_max", "var_name": "x"}]
}"#;
}
