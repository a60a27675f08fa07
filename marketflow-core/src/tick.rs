//! Price ticks and the per-batch latest-value table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate::{market_key, ALL_SOURCES};

/// One price observation from a source at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub source: String,
    pub pair: String,
    pub price: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Tick {
    pub fn new(
        source: impl Into<String>,
        pair: impl Into<String>,
        price: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            source: source.into(),
            pair: pair.into(),
            price,
            timestamp,
        }
    }

    /// Ticks without a source or pair are discarded everywhere
    pub fn is_valid(&self) -> bool {
        !self.source.is_empty() && !self.pair.is_empty()
    }

    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }
}

/// Most recent tick per `source pair` and `All pair` key for one raw batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestTable {
    entries: HashMap<String, Tick>,
}

impl LatestTable {
    /// Scan `batch` from the newest tick backwards, keeping the first hit
    /// per key. Stops once `expected_keys` entries are filled.
    pub fn from_batch(batch: &[Tick], expected_keys: usize) -> Self {
        let mut entries = HashMap::with_capacity(expected_keys);

        for tick in batch.iter().rev() {
            if entries.len() >= expected_keys {
                break;
            }
            if !tick.is_valid() {
                continue;
            }
            entries
                .entry(market_key(&tick.source, &tick.pair))
                .or_insert_with(|| tick.clone());
            entries
                .entry(market_key(ALL_SOURCES, &tick.pair))
                .or_insert_with(|| tick.clone());
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Tick> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tick)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Tick)> for LatestTable {
    fn from_iter<I: IntoIterator<Item = (String, Tick)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
