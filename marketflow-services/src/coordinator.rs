//! Ingestion Coordinator
//!
//! Owns the buffer of snapshots and the active source set, both behind one
//! lock. Per pipeline generation it runs a snapshot collector and a latest
//! price writer; a coordinator-wide timer flushes the buffer to the store and
//! cache every minute. Mode switches tear the current generation down
//! completely before the next one is wired up.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use marketflow_core::{
    merge_snapshots, AggregateRecord, HealthEntry, LatestTable, MarketflowError,
    MarketflowResult, Mode, Pair, Snapshot, Source, Tick,
};
use marketflow_feeds::{DecodeStats, FeedEndpoint, SourceSet, SyntheticConfig, TcpFeedConfig};

use crate::cache::Cache;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::store::Store;

/// Keys a full latest table holds: every `source pair` plus every `All pair`
pub const EXPECTED_LATEST_KEYS: usize = (Source::FEEDS.len() + 1) * Pair::ALL.len();

/// Configuration for the IngestionCoordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub flush_interval: Duration,
    /// Slack added to query windows to absorb batch/tick skew
    pub query_grace: Duration,
    pub pipeline: PipelineConfig,
    pub live_endpoints: Vec<FeedEndpoint>,
    pub tcp: TcpFeedConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            query_grace: Duration::from_secs(10),
            pipeline: PipelineConfig::default(),
            live_endpoints: Source::FEEDS
                .iter()
                .zip(40101..)
                .map(|(source, port)| {
                    FeedEndpoint::new(source.as_str(), format!("127.0.0.1:{}", port))
                })
                .collect(),
            tcp: TcpFeedConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// State guarded by the coordinator lock
#[derive(Default)]
struct CoordinatorState {
    buffer: Vec<Snapshot>,
    mode: Option<Mode>,
    sources: Option<Arc<SourceSet>>,
}

/// Tasks belonging to one wiring of the pipeline
struct Generation {
    mode: Mode,
    pipeline_tasks: Vec<JoinHandle<()>>,
    duty_tasks: Vec<JoinHandle<()>>,
    decode_stats: Vec<(String, Arc<DecodeStats>)>,
}

pub struct IngestionCoordinator {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    /// Current generation; holding this lock serializes mode switches
    generation: Mutex<Option<Generation>>,
    shutdown: CancellationToken,
    flush_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache,
            config,
            state: Mutex::new(CoordinatorState::default()),
            generation: Mutex::new(None),
            shutdown: CancellationToken::new(),
            flush_task: parking_lot::Mutex::new(None),
        })
    }

    /// Start the flush timer and the first pipeline generation
    pub async fn start(self: &Arc<Self>, mode: Mode) -> MarketflowResult<()> {
        self.start_flush_timer();
        self.switch_mode(mode).await
    }

    pub async fn active_mode(&self) -> Option<Mode> {
        self.state.lock().await.mode
    }

    pub async fn buffer_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Replace the active source set with the one for `mode`
    pub async fn switch_mode(self: &Arc<Self>, mode: Mode) -> MarketflowResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(MarketflowError::internal("ingestion has been stopped"));
        }

        let mut generation = self.generation.lock().await;

        if self.state.lock().await.mode == Some(mode) {
            return Err(MarketflowError::conflict(format!(
                "data mode is already switched to {}",
                mode
            )));
        }

        if let Some(previous) = generation.take() {
            info!("[Coordinator] Switching mode {} -> {}", previous.mode, mode);
            self.retire(previous).await;
        }

        // Persist what the previous generation buffered; the next one starts
        // from a fresh buffer
        self.flush().await;

        let sources = Arc::new(self.build_sources(mode));
        let feeds = match sources.start().await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("[Coordinator] Failed to start {} sources: {}", mode, e);
                let mut state = self.state.lock().await;
                state.mode = None;
                state.sources = None;
                return Err(e.into());
            }
        };

        {
            let mut state = self.state.lock().await;
            state.mode = Some(mode);
            state.sources = Some(sources);
        }

        let pipeline = Pipeline::spawn(feeds, &self.config.pipeline);
        *generation = Some(self.launch(mode, pipeline));

        info!("[Coordinator] Data mode switched to {}", mode);
        Ok(())
    }

    /// Cancel every coordinator task, close the sources and wait for
    /// everything to finish. Buffered snapshots are flushed before returning.
    pub async fn stop_listening(&self) {
        info!("[Coordinator] Stopping");
        self.shutdown.cancel();

        let mut generation = self.generation.lock().await;
        if let Some(sources) = self.state.lock().await.sources.take() {
            sources.close();
        }
        if let Some(current) = generation.take() {
            for task in current.pipeline_tasks.into_iter().chain(current.duty_tasks) {
                let _ = task.await;
            }
        }

        let flush_task = self.flush_task.lock().take();
        if let Some(task) = flush_task {
            let _ = task.await;
        }

        self.flush().await;
        self.state.lock().await.mode = None;
        info!("[Coordinator] Stopped");
    }

    /// Merge the whole buffer, write it to the store and cache, then replace
    /// the buffer. Returns the number of snapshots flushed.
    pub async fn flush(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return 0;
        }

        let merged = merge_snapshots(state.buffer.iter());
        if let Err(e) = self.store.save_aggregated(&merged).await {
            error!("[Coordinator] Failed to save aggregates to store: {}", e);
        }
        if let Err(e) = self.cache.save_aggregated(&merged).await {
            error!("[Coordinator] Failed to save aggregates to cache: {}", e);
        }

        let flushed = std::mem::take(&mut state.buffer).len();
        info!(
            "[Coordinator] Flushed {} snapshots ({} keys)",
            flushed,
            merged.len()
        );
        flushed
    }

    pub async fn append_snapshot(&self, snapshot: Snapshot) {
        self.state.lock().await.buffer.push(snapshot);
    }

    /// Write a latest table to the cache, falling back to the store only
    /// when the cache write fails. Failures are logged, never returned.
    pub async fn persist_latest(&self, latest: &LatestTable) {
        if let Err(cache_err) = self.cache.save_latest(latest).await {
            warn!(
                "[Coordinator] Cache write failed, saving latest prices to store: {}",
                cache_err
            );
            if let Err(store_err) = self.store.save_latest(latest).await {
                error!("[Coordinator] Failed to save latest prices: {}", store_err);
            }
        }
    }

    /// Buffered records for `key`, newest first.
    ///
    /// With a window only records stamped within `[now - window - grace,
    /// now]` are returned; without one the whole buffer is scanned.
    pub async fn buffered_records(
        &self,
        key: &str,
        window: Option<Duration>,
    ) -> Vec<AggregateRecord> {
        let now = Utc::now();
        let cutoff = window
            .and_then(|w| TimeDelta::from_std(w + self.config.query_grace).ok())
            .map(|span| now - span);

        let state = self.state.lock().await;
        state
            .buffer
            .iter()
            .rev()
            .filter_map(|snapshot| snapshot.get(key))
            .take_while(|record| cutoff.map_or(true, |cutoff| record.timestamp >= cutoff))
            .filter(|record| record.timestamp <= now)
            .cloned()
            .collect()
    }

    /// One entry per failing collaborator, or a single all-healthy entry
    pub async fn check_health(&self) -> Vec<HealthEntry> {
        let mut entries = Vec::new();

        let sources = self.state.lock().await.sources.clone();
        match sources {
            Some(sources) => {
                if let Err(e) = sources.check_health() {
                    entries.push(HealthEntry::unhealthy("source", e.to_string()));
                }
            }
            None => entries.push(HealthEntry::unhealthy("source", "no active source")),
        }

        if let Err(e) = self.store.check_health().await {
            warn!("[Coordinator] Store health check failed: {}", e);
            entries.push(HealthEntry::unhealthy("store", "unhealthy"));
        }
        if let Err(e) = self.cache.check_health().await {
            warn!("[Coordinator] Cache health check failed: {}", e);
            entries.push(HealthEntry::unhealthy("cache", "unhealthy"));
        }

        if entries.is_empty() {
            entries.push(HealthEntry::all_healthy());
        }
        entries
    }

    fn build_sources(&self, mode: Mode) -> SourceSet {
        match mode {
            Mode::Live => SourceSet::live(&self.config.live_endpoints, &self.config.tcp),
            Mode::Test => SourceSet::synthetic(&self.config.synthetic),
        }
    }

    fn start_flush_timer(self: &Arc<Self>) {
        let mut slot = self.flush_task.lock();
        if slot.is_some() {
            return;
        }

        let coordinator: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.flush_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(coordinator) = coordinator.upgrade() else {
                            break;
                        };
                        coordinator.flush().await;
                    }
                }
            }
        }));
    }

    /// Spawn the per-generation duties on top of a running pipeline
    fn launch(self: &Arc<Self>, mode: Mode, pipeline: Pipeline) -> Generation {
        let cancel = self.shutdown.child_token();
        let Pipeline {
            snapshots,
            raw_batches,
            tasks,
            decode_stats,
        } = pipeline;

        let collector = tokio::spawn(Arc::clone(self).collect_snapshots(snapshots, cancel.clone()));
        let writer = tokio::spawn(Arc::clone(self).write_latest(raw_batches, cancel.clone()));

        Generation {
            mode,
            pipeline_tasks: tasks,
            duty_tasks: vec![collector, writer],
            decode_stats,
        }
    }

    /// Close the generation's sources and join all of its tasks
    async fn retire(&self, previous: Generation) {
        let sources = self.state.lock().await.sources.take();
        if let Some(sources) = sources {
            sources.close();
        }

        // Stages drain on their own once the sources close, and the duties
        // run until their channels close, so the final snapshot still
        // reaches the buffer. Only shutdown cancels them.
        for task in previous
            .pipeline_tasks
            .into_iter()
            .chain(previous.duty_tasks)
        {
            let _ = task.await;
        }

        for (source, stats) in &previous.decode_stats {
            info!(
                "[Coordinator] {} generation {}: {} decoded, {} dropped",
                previous.mode,
                source,
                stats.decoded(),
                stats.dropped()
            );
        }
    }

    async fn collect_snapshots(
        self: Arc<Self>,
        mut snapshots: mpsc::Receiver<Snapshot>,
        cancel: CancellationToken,
    ) {
        loop {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            self.append_snapshot(snapshot).await;
        }
    }

    async fn write_latest(
        self: Arc<Self>,
        mut raw_batches: mpsc::UnboundedReceiver<Vec<Tick>>,
        cancel: CancellationToken,
    ) {
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = raw_batches.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let latest = LatestTable::from_batch(&batch, EXPECTED_LATEST_KEYS);
            if !latest.is_empty() {
                self.persist_latest(&latest).await;
            }
        }
    }
}
