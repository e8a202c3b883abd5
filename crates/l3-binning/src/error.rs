//! Error types for binning.

use thiserror::Error;

/// Errors that can occur while configuring, running or writing a binning job.
#[derive(Error, Debug)]
pub enum BinningError {
    /// Invalid configuration, detected before any scan starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mask or derived-variable expression failed to parse or bind.
    #[error("expression error in '{expr}': {message}")]
    Expression { expr: String, message: String },

    /// A product cannot map pixels to geographic coordinates.
    #[error("product '{product}' has no usable geo-coding: {reason}")]
    GeoCoding { product: String, reason: String },

    /// Raster access failed.
    #[error("failed to read product data: {0}")]
    Product(String),

    /// Disk failure while spilling or sealing collected bins.
    #[error("spill I/O error: {0}")]
    SpillIo(String),

    /// The output file could not be written or read.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation was called in the wrong lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The run was cancelled through the progress monitor.
    #[error("binning cancelled")]
    Cancelled,

    /// A tile worker panicked.
    #[error("tile worker failed: {0}")]
    Worker(String),
}

impl BinningError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an Expression error.
    pub fn expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Create a GeoCoding error.
    pub fn geo_coding(product: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GeoCoding {
            product: product.into(),
            reason: reason.into(),
        }
    }

    /// Create a Product error.
    pub fn product(msg: impl Into<String>) -> Self {
        Self::Product(msg.into())
    }

    /// Create a SpillIo error.
    pub fn spill_io(msg: impl Into<String>) -> Self {
        Self::SpillIo(msg.into())
    }

    /// Create a Serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an InvalidState error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

impl From<serde_json::Error> for BinningError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_yaml::Error> for BinningError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for binning operations.
pub type Result<T> = std::result::Result<T, BinningError>;
