//! Store and cache doubles that count calls and can be switched to fail

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use marketflow_core::{AggregateRecord, Extreme, LatestTable, Pair, Source, Tick};

use crate::cache::{Cache, CacheError, MemoryCache};
use crate::store::{SqliteStore, Store, StoreError};

pub(crate) struct RecordingStore {
    inner: SqliteStore,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteStore::new_in_memory().unwrap(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), StoreError> {
        self.enter()?;
        self.inner.save_aggregated(records).await
    }

    async fn save_latest(&self, latest: &LatestTable) -> Result<(), StoreError> {
        self.enter()?;
        self.inner.save_latest(latest).await
    }

    async fn latest_by_source(
        &self,
        source: Source,
        pair: Pair,
    ) -> Result<Option<Tick>, StoreError> {
        self.enter()?;
        self.inner.latest_by_source(source, pair).await
    }

    async fn latest_by_all(&self, pair: Pair) -> Result<Option<Tick>, StoreError> {
        self.enter()?;
        self.inner.latest_by_all(pair).await
    }

    async fn extreme(
        &self,
        op: Extreme,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError> {
        self.enter()?;
        self.inner.extreme(op, source, pair, period).await
    }

    async fn average(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Duration>,
    ) -> Result<Option<Tick>, StoreError> {
        self.enter()?;
        self.inner.average(source, pair, period).await
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        self.enter()?;
        self.inner.check_health().await
    }
}

pub(crate) struct RecordingCache {
    inner: MemoryCache,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingCache {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryCache::new(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("cache is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), CacheError> {
        self.enter()?;
        self.inner.save_aggregated(records).await
    }

    async fn save_latest(&self, latest: &LatestTable) -> Result<(), CacheError> {
        self.enter()?;
        self.inner.save_latest(latest).await
    }

    async fn get_latest(&self, source: Source, pair: Pair) -> Result<Tick, CacheError> {
        self.enter()?;
        self.inner.get_latest(source, pair).await
    }

    async fn check_health(&self) -> Result<(), CacheError> {
        self.enter()?;
        self.inner.check_health().await
    }
}
