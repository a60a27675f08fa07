//! Per-batch statistics
//!
//! Each batch becomes one [`Snapshot`] holding min, max and average price
//! per `source pair` and `All pair` key.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use marketflow_core::{market_key, AggregateRecord, Snapshot, Tick, ALL_SOURCES};

/// Running statistics for one key
#[derive(Debug, Clone)]
struct PriceAccumulator {
    source: String,
    pair: String,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl PriceAccumulator {
    fn new(source: &str, pair: &str) -> Self {
        Self {
            source: source.to_string(),
            pair: pair.to_string(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    fn record(&mut self, price: f64) {
        self.min = self.min.min(price);
        self.max = self.max.max(price);
        self.sum += price;
        self.count += 1;
    }

    fn finish(self, timestamp: DateTime<Utc>) -> AggregateRecord {
        AggregateRecord {
            pair: self.pair,
            source: self.source,
            timestamp,
            avg_price: self.sum / self.count as f64,
            min_price: self.min,
            max_price: self.max,
        }
    }
}

/// Compute one snapshot from a batch, stamped with `timestamp`
pub fn aggregate_batch(batch: &[Tick], timestamp: DateTime<Utc>) -> Snapshot {
    let mut accumulators: HashMap<String, PriceAccumulator> = HashMap::new();

    for tick in batch.iter().filter(|tick| tick.is_valid()) {
        for source in [tick.source.as_str(), ALL_SOURCES] {
            accumulators
                .entry(market_key(source, &tick.pair))
                .or_insert_with(|| PriceAccumulator::new(source, &tick.pair))
                .record(tick.price);
        }
    }

    accumulators
        .into_values()
        .map(|acc| acc.finish(timestamp))
        .collect()
}

/// Aggregation stage
pub struct AggregationEngine;

impl AggregationEngine {
    /// Aggregate every batch into a snapshot. The raw batch is forwarded on
    /// an unbounded channel so a slow latest-value writer never stalls
    /// aggregation.
    pub fn spawn(
        mut batches: mpsc::Receiver<Vec<Tick>>,
        capacity: usize,
    ) -> (
        mpsc::Receiver<Snapshot>,
        mpsc::UnboundedReceiver<Vec<Tick>>,
        JoinHandle<()>,
    ) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(capacity.max(1));
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                let snapshot = aggregate_batch(&batch, Utc::now());
                debug!(
                    "[Aggregation] {} ticks -> {} keys",
                    batch.len(),
                    snapshot.len()
                );

                // Latest-value tracking may have stopped; aggregation carries on
                let _ = raw_tx.send(batch);

                if snapshot.is_empty() {
                    continue;
                }
                if snapshot_tx.send(snapshot).await.is_err() {
                    debug!("[Aggregation] Snapshot receiver closed, stopping");
                    break;
                }
            }
        });

        (snapshot_rx, raw_rx, task)
    }
}
