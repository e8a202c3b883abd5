//! Binning request configuration.
//!
//! A request is read from YAML or JSON. Every key except `aggregators` has
//! a default, and a few operational keys can be overridden from the
//! environment:
//!
//! | variable | key |
//! |---|---|
//! | `L3BIN_NUM_ROWS` | `num_rows` |
//! | `L3BIN_SUPER_SAMPLING` | `super_sampling` |
//! | `L3BIN_PARALLELISM` | `parallelism` |
//! | `L3BIN_TILE_SIZE` | `tile_size` |
//! | `L3BIN_SPILL_DIR` | `collector` (switches to a spill collector) |
//! | `L3BIN_OUTPUT` | `output.path` |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use l3_common::{parse_utc, BoundingBox, DataPeriod, SpatialDataPeriod, UtcDataPeriod};
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorConfig;
use crate::collector::CollectorConfig;
use crate::context::{BinningContext, CompositingType};
use crate::error::{BinningError, Result};
use crate::filter::{ChainedFilter, GeoCodingFilter, SpatialDataDayFilter, TimeFilter};
use crate::grid::GridIndex;
use crate::manager::BinManager;
use crate::postprocess::PostProcessorConfig;
use crate::variable::{VariableConfig, VariableContext};

/// Time window of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeFilterConfig {
    /// Every product is used.
    #[default]
    None,
    /// Products overlapping `[start, start + period_days)` UTC.
    TimeRange { start: String, period_days: f64 },
    /// Products whose first or last line falls in the local-solar-time
    /// data day starting at `min_data_hour`.
    SpatialDataDay {
        start: String,
        period_days: f64,
        min_data_hour: f64,
    },
}

impl TimeFilterConfig {
    /// The data period, or `None` when no time filtering applies.
    pub fn data_period(&self) -> Result<Option<Arc<dyn DataPeriod>>> {
        let parse = |s: &str| {
            parse_utc(s).map_err(|e| BinningError::configuration(format!("invalid time filter start: {}", e)))
        };
        let check_days = |days: f64| {
            if days > 0.0 && days.is_finite() {
                Ok(days)
            } else {
                Err(BinningError::configuration(format!(
                    "period_days must be positive, got {}",
                    days
                )))
            }
        };
        Ok(match self {
            Self::None => None,
            Self::TimeRange { start, period_days } => {
                let period: Arc<dyn DataPeriod> =
                    Arc::new(UtcDataPeriod::days(parse(start.as_str())?, check_days(*period_days)?));
                Some(period)
            }
            Self::SpatialDataDay {
                start,
                period_days,
                min_data_hour,
            } => {
                let period: Arc<dyn DataPeriod> = Arc::new(SpatialDataPeriod::days(
                    parse(start.as_str())?,
                    check_days(*period_days)?,
                    *min_data_hour,
                ));
                Some(period)
            }
        })
    }
}

/// Where and how the result is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("l3_binned.bin"),
            title: "Level-3 Binned Data".to_string(),
        }
    }
}

fn default_num_rows() -> i32 {
    2160
}

fn default_super_sampling() -> i32 {
    1
}

fn default_tile_size() -> usize {
    512
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_num_parts() -> usize {
    1
}

/// A complete binning request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Rows of the global grid.
    #[serde(default = "default_num_rows")]
    pub num_rows: i32,

    /// Pixels where this evaluates to false or NaN are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_expr: Option<String>,

    #[serde(default)]
    pub compositing_type: CompositingType,

    /// Sub-samples per pixel side.
    #[serde(default = "default_super_sampling")]
    pub super_sampling: i32,

    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    pub aggregators: Vec<AggregatorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processor: Option<PostProcessorConfig>,

    /// Restrict binning to this box; defaults to the first product's
    /// footprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,

    #[serde(default)]
    pub time_filter: TimeFilterConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    /// Tile edge length in pixels.
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,

    /// Worker threads for product scans.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Parts the temporal bin source is split into.
    #[serde(default = "default_num_parts")]
    pub num_parts: usize,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            num_rows: default_num_rows(),
            mask_expr: None,
            compositing_type: CompositingType::default(),
            super_sampling: default_super_sampling(),
            variables: Vec::new(),
            aggregators: Vec::new(),
            post_processor: None,
            region: None,
            time_filter: TimeFilterConfig::default(),
            collector: CollectorConfig::default(),
            tile_size: default_tile_size(),
            parallelism: default_parallelism(),
            num_parts: default_num_parts(),
            output: OutputConfig::default(),
        }
    }
}

impl BinningConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a file; `.json` files are JSON, anything else YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BinningError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `L3BIN_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("L3BIN_NUM_ROWS") {
            if let Ok(n) = val.parse() {
                self.num_rows = n;
            }
        }

        if let Some(val) = lookup("L3BIN_SUPER_SAMPLING") {
            if let Ok(n) = val.parse() {
                self.super_sampling = n;
            }
        }

        if let Some(val) = lookup("L3BIN_PARALLELISM") {
            if let Ok(n) = val.parse() {
                self.parallelism = n;
            }
        }

        if let Some(val) = lookup("L3BIN_TILE_SIZE") {
            if let Ok(n) = val.parse() {
                self.tile_size = n;
            }
        }

        if let Some(val) = lookup("L3BIN_SPILL_DIR") {
            self.collector = CollectorConfig::Spill {
                directory: Some(PathBuf::from(val)),
            };
        }

        if let Some(val) = lookup("L3BIN_OUTPUT") {
            self.output.path = PathBuf::from(val);
        }
    }

    /// Check every setting, including variable bindings and expressions.
    pub fn validate(&self) -> Result<()> {
        if self.num_rows <= 0 {
            return Err(BinningError::configuration(format!(
                "num_rows must be positive, got {}",
                self.num_rows
            )));
        }
        if self.aggregators.is_empty() {
            return Err(BinningError::configuration("at least one aggregator is required"));
        }
        if self.super_sampling < 1 {
            return Err(BinningError::configuration(format!(
                "super_sampling must be at least 1, got {}",
                self.super_sampling
            )));
        }
        if self.tile_size == 0 {
            return Err(BinningError::configuration("tile_size must be positive"));
        }
        if self.parallelism == 0 {
            return Err(BinningError::configuration("parallelism must be positive"));
        }
        if self.num_parts == 0 {
            return Err(BinningError::configuration("num_parts must be positive"));
        }
        if let Some(region) = &self.region {
            if region.min_x > region.max_x || region.min_y > region.max_y {
                return Err(BinningError::configuration(format!("region {} is inverted", region)));
            }
        }
        self.time_filter.data_period()?;
        self.build_context().map(|_| ())
    }

    /// Build the shared context: grid, variables and bin manager.
    pub fn build_context(&self) -> Result<BinningContext> {
        let grid = GridIndex::new(self.num_rows)?;
        let required: Vec<String> = self
            .aggregators
            .iter()
            .flat_map(AggregatorConfig::var_names)
            .collect();
        let variables = VariableContext::new(&self.variables, self.mask_expr.as_deref(), &required)?;
        let manager = BinManager::from_config(&self.aggregators, self.post_processor.as_ref(), &variables)?;
        BinningContext::new(
            grid,
            variables,
            manager,
            self.compositing_type,
            self.super_sampling,
        )
    }

    /// Filters applied to every source product.
    pub fn product_filter(&self) -> Result<ChainedFilter> {
        let mut filter = ChainedFilter::new().with(GeoCodingFilter);
        if let Some(period) = self.time_filter.data_period()? {
            filter = match self.time_filter {
                TimeFilterConfig::SpatialDataDay { .. } => filter.with(SpatialDataDayFilter::new(period)),
                _ => filter.with(TimeFilter::new(period)),
            };
        }
        Ok(filter)
    }
}
