//! Aggregate statistics per market key
//!
//! A [`Snapshot`] holds one [`AggregateRecord`] per `source pair` key for a
//! single batch window. Snapshots accumulate in the coordinator buffer and
//! are folded together with [`merge_snapshots`] at flush and query time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pseudo-source under which cross-source aggregates are keyed
pub const ALL_SOURCES: &str = "All";

/// Build the `"<source> <pair>"` key used by snapshots, the store and the cache
pub fn market_key(source: &str, pair: &str) -> String {
    format!("{} {}", source, pair)
}

/// Min/max/average statistics for one key over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub pair: String,
    /// Feed name, or `All`
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

impl AggregateRecord {
    pub fn key(&self) -> String {
        market_key(&self.source, &self.pair)
    }
}

/// Per-key aggregates produced from one batch window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: HashMap<String, AggregateRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: AggregateRecord) {
        self.records.insert(record.key(), record);
    }

    pub fn get(&self, key: &str) -> Option<&AggregateRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &AggregateRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AggregateRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = AggregateRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

/// Fold records of the same key into one
///
/// Min of mins, max of maxes, newest timestamp, and the unweighted mean of
/// the per-record averages.
pub fn merge_records<'a, I>(records: I) -> Option<AggregateRecord>
where
    I: IntoIterator<Item = &'a AggregateRecord>,
{
    let mut iter = records.into_iter();
    let first = iter.next()?;

    let mut merged = first.clone();
    let mut avg_sum = first.avg_price;
    let mut count = 1usize;

    for record in iter {
        merged.min_price = merged.min_price.min(record.min_price);
        merged.max_price = merged.max_price.max(record.max_price);
        if record.timestamp > merged.timestamp {
            merged.timestamp = record.timestamp;
        }
        avg_sum += record.avg_price;
        count += 1;
    }

    merged.avg_price = avg_sum / count as f64;
    Some(merged)
}

/// Merge a sequence of snapshots into one record per key
pub fn merge_snapshots<'a, I>(snapshots: I) -> HashMap<String, AggregateRecord>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    let mut grouped: HashMap<&str, Vec<&AggregateRecord>> = HashMap::new();
    for snapshot in snapshots {
        for (key, record) in &snapshot.records {
            grouped.entry(key.as_str()).or_default().push(record);
        }
    }

    grouped
        .into_iter()
        .filter_map(|(key, records)| {
            merge_records(records.into_iter()).map(|merged| (key.to_string(), merged))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_record(source: &str, min: f64, avg: f64, max: f64, age_secs: i64) -> AggregateRecord {
        AggregateRecord {
            pair: "BTCUSDT".to_string(),
            source: source.to_string(),
            timestamp: Utc::now() - Duration::seconds(age_secs),
            avg_price: avg,
            min_price: min,
            max_price: max,
        }
    }

    #[test]
    fn test_market_key() {
        assert_eq!(market_key("Source1", "BTCUSDT"), "Source1 BTCUSDT");
        assert_eq!(market_key(ALL_SOURCES, "ETHUSDT"), "All ETHUSDT");
    }

    #[test]
    fn test_merge_uses_unweighted_average() {
        // First window averaged three ticks to 10, second a single tick of 20.
        // A tick-weighted mean would be 12.5; merging keeps the plain mean.
        let first: Snapshot = [create_test_record("Source1", 8.0, 10.0, 12.0, 5)]
            .into_iter()
            .collect();
        let second: Snapshot = [create_test_record("Source1", 20.0, 20.0, 20.0, 1)]
            .into_iter()
            .collect();

        let merged = merge_snapshots([&first, &second]);
        let record = &merged["Source1 BTCUSDT"];

        assert_eq!(record.min_price, 8.0);
        assert_eq!(record.max_price, 20.0);
        assert_eq!(record.avg_price, 15.0);
        assert_eq!(record.timestamp, second.get("Source1 BTCUSDT").unwrap().timestamp);
    }

    #[test]
    fn test_merge_keeps_keys_separate() {
        let first: Snapshot = [
            create_test_record("Source1", 1.0, 2.0, 3.0, 2),
            create_test_record(ALL_SOURCES, 1.0, 2.0, 3.0, 2),
        ]
        .into_iter()
        .collect();
        let second: Snapshot = [create_test_record("Source2", 4.0, 5.0, 6.0, 1)]
            .into_iter()
            .collect();

        let merged = merge_snapshots([&first, &second]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["Source2 BTCUSDT"].avg_price, 5.0);
    }

    #[test]
    fn test_merge_records_empty() {
        assert!(merge_records(std::iter::empty()).is_none());
        assert!(merge_snapshots(std::iter::empty()).is_empty());
    }
}
