//! Low-latency cache
//!
//! Key/value collaborator holding JSON values under string keys:
//! `latest <source> <pair>` for latest ticks and `<source> <pair>` for the
//! last flushed aggregate. Values are plain sets without expiry.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use marketflow_core::{market_key, AggregateRecord, LatestTable, MarketflowError, Pair, Source, Tick};

/// Key prefix for latest-price entries
const LATEST_PREFIX: &str = "latest";

/// Cache key of the latest price for `source pair`
pub fn latest_key(source: &str, pair: &str) -> String {
    format!("{} {}", LATEST_PREFIX, market_key(source, pair))
}

/// Low-latency key-value collaborator
#[async_trait]
pub trait Cache: Send + Sync {
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), CacheError>;

    async fn save_latest(&self, latest: &LatestTable) -> Result<(), CacheError>;

    /// Exact-key lookup; a miss is an error
    async fn get_latest(&self, source: Source, pair: Pair) -> Result<Tick, CacheError>;

    async fn check_health(&self) -> Result<(), CacheError>;
}

/// In-process cache backed by a concurrent map of JSON strings
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw JSON stored under `key`
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn save_aggregated(
        &self,
        records: &HashMap<String, AggregateRecord>,
    ) -> Result<(), CacheError> {
        for (key, record) in records {
            self.entries
                .insert(key.clone(), serde_json::to_string(record)?);
        }
        Ok(())
    }

    async fn save_latest(&self, latest: &LatestTable) -> Result<(), CacheError> {
        for (key, tick) in latest.iter() {
            self.entries.insert(
                format!("{} {}", LATEST_PREFIX, key),
                serde_json::to_string(tick)?,
            );
        }
        Ok(())
    }

    async fn get_latest(&self, source: Source, pair: Pair) -> Result<Tick, CacheError> {
        let key = latest_key(source.as_str(), pair.as_str());
        let raw = self.get_raw(&key).ok_or(CacheError::Miss(key))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn check_health(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache miss: {0}")]
    Miss(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl From<CacheError> for MarketflowError {
    fn from(err: CacheError) -> Self {
        MarketflowError::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_latest_round_trip_and_miss() {
        let cache = MemoryCache::new();
        let table = LatestTable::from_batch(&[Tick::new("Source2", "ETHUSDT", 3001.5, 7)], 20);
        cache.save_latest(&table).await.unwrap();

        assert!(cache.get_raw("latest Source2 ETHUSDT").is_some());
        let tick = cache.get_latest(Source::Source2, Pair::EthUsdt).await.unwrap();
        assert_eq!(tick.price, 3001.5);

        let all = cache.get_latest(Source::All, Pair::EthUsdt).await.unwrap();
        assert_eq!(all.source, "Source2");

        assert!(matches!(
            cache.get_latest(Source::Source1, Pair::EthUsdt).await,
            Err(CacheError::Miss(key)) if key == "latest Source1 ETHUSDT"
        ));
    }

    #[tokio::test]
    async fn test_aggregates_stored_under_market_key() {
        let cache = MemoryCache::new();
        let record = AggregateRecord {
            pair: "TONUSDT".to_string(),
            source: "All".to_string(),
            timestamp: Utc::now(),
            avg_price: 5.0,
            min_price: 4.5,
            max_price: 5.5,
        };
        let records = HashMap::from([(record.key(), record.clone())]);

        cache.save_aggregated(&records).await.unwrap();

        let raw = cache.get_raw("All TONUSDT").unwrap();
        let stored: AggregateRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, record);
    }
}
