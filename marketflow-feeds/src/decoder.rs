//! Decoding worker pool
//!
//! A fixed number of workers share one feed's raw-line receiver. Each worker
//! owns a clone of the tick sender and the pool keeps none, so the output
//! channel closes only after every worker has returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use marketflow_core::Tick;

use crate::error::FeedError;

/// Workers per source
pub const DEFAULT_DECODE_WORKERS: usize = 5;

/// Wire format of one upstream record. The source identity is attached by
/// the connection, not carried in the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "pair")]
    pub symbol: String,
    pub price: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Decode one raw line into a tick tagged with `source`
pub fn decode_line(source: &str, line: &str) -> Result<Tick, FeedError> {
    let record: RawRecord =
        serde_json::from_str(line.trim()).map_err(|e| FeedError::Decode(e.to_string()))?;

    if !record.price.is_finite() {
        return Err(FeedError::Decode(format!(
            "non-finite price for {}",
            record.symbol
        )));
    }

    let tick = Tick::new(source, record.symbol, record.price, record.timestamp);
    if !tick.is_valid() {
        return Err(FeedError::Decode("missing source or pair".to_string()));
    }

    Ok(tick)
}

/// Counters shared by the workers of one pool
#[derive(Debug, Default)]
pub struct DecodeStats {
    decoded: AtomicU64,
    dropped: AtomicU64,
}

impl DecodeStats {
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Decoding workers for one source
#[derive(Debug)]
pub struct DecoderPool {
    source: String,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DecodeStats>,
}

impl DecoderPool {
    /// Spawn `workers` decoders reading from `lines`
    pub fn spawn(
        source: impl Into<String>,
        lines: mpsc::Receiver<String>,
        workers: usize,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Tick>) {
        let source = source.into();
        let (tick_tx, tick_rx) = mpsc::channel(capacity.max(1));
        let lines = Arc::new(Mutex::new(lines));
        let stats = Arc::new(DecodeStats::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    source.clone(),
                    Arc::clone(&lines),
                    tick_tx.clone(),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        (
            Self {
                source,
                workers,
                stats,
            },
            tick_rx,
        )
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stats(&self) -> Arc<DecodeStats> {
        Arc::clone(&self.stats)
    }

    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        self.workers
    }

    /// Wait for every worker to finish
    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
        info!(
            "[Decoder {}] Finished: {} decoded, {} dropped",
            self.source,
            self.stats.decoded(),
            self.stats.dropped()
        );
    }
}

async fn run_worker(
    id: usize,
    source: String,
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    ticks: mpsc::Sender<Tick>,
    stats: Arc<DecodeStats>,
) {
    loop {
        let line = {
            let mut rx = lines.lock().await;
            rx.recv().await
        };
        let Some(line) = line else {
            break;
        };

        match decode_line(&source, &line) {
            Ok(tick) => {
                stats.decoded.fetch_add(1, Ordering::Relaxed);
                if ticks.send(tick).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("[Decoder {}] Worker {} dropped record: {}", source, id, e);
            }
        }
    }
}
