//! Error types for Marketflow

use thiserror::Error;

pub const INVALID_SOURCE: &str = "source value is invalid, must be (Source1, Source2, Source3, All)";
pub const INVALID_PAIR: &str =
    "pair value is invalid, must be (BTCUSDT, DOGEUSDT, TONUSDT, SOLUSDT, ETHUSDT)";
pub const INVALID_PERIOD: &str = "period value is invalid, must be (1s, 3s, 5s, 10s, 30s, 1m, 3m, 5m)";
pub const INVALID_MODE: &str = "mode value is invalid, must be (test or live)";
pub const INVALID_METRIC: &str =
    "metric value is invalid, must be (highest, lowest, average, latest)";
pub const ALL_NOT_SUPPORTED: &str = "\"All\" is not supported for this period-based query";

/// Service-wide error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketflowError {
    /// Bad source, pair, period, metric or mode token
    #[error("{0}")]
    Validation(String),

    /// No data, including the zero-price sentinel
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("source {source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MarketflowError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        MarketflowError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        MarketflowError::Conflict(msg.into())
    }

    pub fn source_unavailable(source: impl Into<String>, message: impl Into<String>) -> Self {
        MarketflowError::SourceUnavailable {
            source_name: source.into(),
            message: message.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        MarketflowError::Persistence(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        MarketflowError::Decode(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MarketflowError::Internal(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, MarketflowError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MarketflowError::NotFound(_))
    }
}

/// Result type alias for Marketflow operations
pub type MarketflowResult<T> = Result<T, MarketflowError>;
