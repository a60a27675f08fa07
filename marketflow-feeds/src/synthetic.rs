//! Synthetic price generator
//!
//! Stands in for a live feed in test mode. Every interval it emits one raw
//! JSON record per pair, priced randomly around the pair's base price, so the
//! generated data takes the same decode and aggregation path as live data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use marketflow_core::Pair;

use crate::connection::{FeedHandle, Liveness, SourceConnection};
use crate::decoder::RawRecord;
use crate::error::FeedError;

/// Configuration for the synthetic generator
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub interval: Duration,
    /// Maximum relative deviation from the base price (0.15 = ±15%)
    pub fluctuation: f64,
    pub channel_capacity: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            fluctuation: 0.15,
            channel_capacity: 64,
        }
    }
}

/// Generated feed for one source identity
pub struct SyntheticFeed {
    source: String,
    config: SyntheticConfig,
    liveness: Arc<Liveness>,
    shutdown: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
}

impl SyntheticFeed {
    pub fn new(source: impl Into<String>, config: SyntheticConfig) -> Self {
        Self {
            source: source.into(),
            config,
            liveness: Arc::new(Liveness::new()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

/// One round of records, one per pair
pub fn generate_records(fluctuation: f64, timestamp: i64) -> Vec<RawRecord> {
    let mut rng = rand::rng();
    Pair::ALL
        .iter()
        .map(|pair| {
            let jitter = (rng.random::<f64>() - 0.5) * 2.0 * fluctuation;
            RawRecord {
                symbol: pair.as_str().to_string(),
                price: pair.base_price() * (1.0 + jitter),
                timestamp,
            }
        })
        .collect()
}

#[async_trait]
impl SourceConnection for SyntheticFeed {
    fn source_name(&self) -> &str {
        &self.source
    }

    async fn start(&self) -> Result<FeedHandle, FeedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FeedError::Closed(self.source.clone()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FeedError::AlreadyStarted(self.source.clone()));
        }

        let (line_tx, line_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let source = self.source.clone();
        let config = self.config.clone();
        let liveness = Arc::clone(&self.liveness);
        let shutdown = self.shutdown.clone();

        liveness.mark_alive();
        info!("[Feed {}] Synthetic generator started", source);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);

            'generate: loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let records = generate_records(config.fluctuation, Utc::now().timestamp_millis());
                for record in records {
                    let line = match serde_json::to_string(&record) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("[Feed {}] Failed to encode record: {}", source, e);
                            continue;
                        }
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'generate,
                        sent = line_tx.send(line) => {
                            if sent.is_err() {
                                break 'generate;
                            }
                            liveness.record_read();
                        }
                    }
                }
            }

            liveness.mark_dead();
            info!("[Feed {}] Synthetic generator stopped", source);
        });

        Ok(FeedHandle {
            source: self.source.clone(),
            lines: line_rx,
            task,
        })
    }

    fn check_health(&self) -> Result<(), FeedError> {
        if self.liveness.is_alive() {
            Ok(())
        } else {
            Err(FeedError::Unavailable(self.source.clone()))
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.liveness.mark_dead();
    }
}
