//! The set of feeds backing one data mode

use std::sync::Arc;

use tracing::{info, warn};

use marketflow_core::{Mode, Source};

use crate::connection::{FeedHandle, SourceConnection};
use crate::error::FeedError;
use crate::synthetic::{SyntheticConfig, SyntheticFeed};
use crate::tcp::{FeedEndpoint, TcpFeed, TcpFeedConfig};

/// Active feeds for a mode
pub struct SourceSet {
    mode: Mode,
    connections: Vec<Arc<dyn SourceConnection>>,
}

impl SourceSet {
    pub fn new(mode: Mode, connections: Vec<Arc<dyn SourceConnection>>) -> Self {
        Self { mode, connections }
    }

    /// One TCP feed per endpoint
    pub fn live(endpoints: &[FeedEndpoint], config: &TcpFeedConfig) -> Self {
        let connections = endpoints
            .iter()
            .map(|endpoint| {
                Arc::new(TcpFeed::new(endpoint.clone(), config.clone())) as Arc<dyn SourceConnection>
            })
            .collect();
        Self::new(Mode::Live, connections)
    }

    /// One synthetic generator per feed identity
    pub fn synthetic(config: &SyntheticConfig) -> Self {
        let connections = Source::FEEDS
            .iter()
            .map(|source| {
                Arc::new(SyntheticFeed::new(source.as_str(), config.clone()))
                    as Arc<dyn SourceConnection>
            })
            .collect();
        Self::new(Mode::Test, connections)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Start every feed. Feeds that fail to start are skipped; fails only
    /// when none could be started.
    pub async fn start(&self) -> Result<Vec<FeedHandle>, FeedError> {
        let mut handles = Vec::with_capacity(self.connections.len());

        for connection in &self.connections {
            match connection.start().await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(
                    "[Sources] {} unavailable, continuing without it: {}",
                    connection.source_name(),
                    e
                ),
            }
        }

        if handles.is_empty() {
            return Err(FeedError::NoSources);
        }

        info!(
            "[Sources] Started {}/{} {} feeds",
            handles.len(),
            self.connections.len(),
            self.mode
        );
        Ok(handles)
    }

    /// Healthy only if every feed reports alive
    pub fn check_health(&self) -> Result<(), FeedError> {
        let unhealthy: Vec<&str> = self
            .connections
            .iter()
            .filter(|connection| connection.check_health().is_err())
            .map(|connection| connection.source_name())
            .collect();

        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err(FeedError::Unhealthy(unhealthy.join(" ")))
        }
    }

    pub fn close(&self) {
        for connection in &self.connections {
            connection.close();
        }
    }
}
