//! Ingestion pipeline
//!
//! Wires running feeds through decoding, fan-in, batching and aggregation:
//!
//! ```text
//! feed lines -> DecoderPool (per source) -> fan_in -> Batcher -> AggregationEngine
//!                                                                  |-> snapshots
//!                                                                  '-> raw batches
//! ```
//!
//! Every stage exits when its input closes or its output receiver is gone,
//! so closing the feeds drains the whole pipeline.

pub mod aggregation;
pub mod batcher;
pub mod merger;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use marketflow_core::{Snapshot, Tick};
use marketflow_feeds::{DecodeStats, DecoderPool, FeedHandle, DEFAULT_DECODE_WORKERS};

pub use aggregation::{aggregate_batch, AggregationEngine};
pub use batcher::{Batcher, BATCH_WINDOW};
pub use merger::{fan_in, MERGE_CAPACITY};

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub decode_workers: usize,
    pub merge_capacity: usize,
    pub batch_window: Duration,
    /// Capacity of the decoder, batch and snapshot channels
    pub stage_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decode_workers: DEFAULT_DECODE_WORKERS,
            merge_capacity: MERGE_CAPACITY,
            batch_window: BATCH_WINDOW,
            stage_capacity: 16,
        }
    }
}

/// A running pipeline generation
pub struct Pipeline {
    pub snapshots: mpsc::Receiver<Snapshot>,
    pub raw_batches: mpsc::UnboundedReceiver<Vec<Tick>>,
    pub tasks: Vec<JoinHandle<()>>,
    pub decode_stats: Vec<(String, Arc<DecodeStats>)>,
}

impl Pipeline {
    /// Spawn every stage for the given feeds
    pub fn spawn(feeds: Vec<FeedHandle>, config: &PipelineConfig) -> Self {
        let mut tasks = Vec::new();
        let mut decode_stats = Vec::with_capacity(feeds.len());
        let mut tick_streams = Vec::with_capacity(feeds.len());

        for feed in feeds {
            tasks.push(feed.task);
            let (pool, ticks) = DecoderPool::spawn(
                feed.source.clone(),
                feed.lines,
                config.decode_workers,
                config.stage_capacity,
            );
            decode_stats.push((feed.source.clone(), pool.stats()));
            tasks.extend(pool.into_tasks());
            tick_streams.push((feed.source, ticks));
        }

        let (merged, merge_task) = fan_in(tick_streams, config.merge_capacity);
        tasks.push(merge_task);

        let (batches, batch_tasks) =
            Batcher::spawn(merged, config.batch_window, config.stage_capacity);
        tasks.extend(batch_tasks);

        let (snapshots, raw_batches, aggregation_task) =
            AggregationEngine::spawn(batches, config.stage_capacity);
        tasks.push(aggregation_task);

        Self {
            snapshots,
            raw_batches,
            tasks,
            decode_stats,
        }
    }
}
