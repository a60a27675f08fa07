//! Feed errors

use marketflow_core::MarketflowError;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{source_name}: failed to connect to {address}: {error}")]
    Connect {
        source_name: String,
        address: String,
        error: std::io::Error,
    },

    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("unhealthy sources: {0}")]
    Unhealthy(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("{0} was already started")]
    AlreadyStarted(String),

    #[error("no source could be started")]
    NoSources,

    #[error("invalid feed endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("malformed record: {0}")]
    Decode(String),
}

impl From<FeedError> for MarketflowError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Connect { ref source_name, .. } => {
                MarketflowError::source_unavailable(source_name.clone(), err.to_string())
            }
            FeedError::Unavailable(source) => {
                MarketflowError::source_unavailable(source, "connection lost")
            }
            FeedError::Unhealthy(sources) => {
                MarketflowError::source_unavailable(sources, "unhealthy")
            }
            FeedError::NoSources => {
                MarketflowError::source_unavailable("all", "no source could be started")
            }
            FeedError::Decode(msg) => MarketflowError::decode(msg),
            other => MarketflowError::internal(other.to_string()),
        }
    }
}
