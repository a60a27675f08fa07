//! Core types for Marketflow
//!
//! This crate defines the shared data structures used across the service:
//! ticks, aggregate records, snapshots, the enumerated market universe
//! and the error taxonomy.

pub mod aggregate;
pub mod error;
pub mod health;
pub mod market;
pub mod tick;

pub use aggregate::{
    market_key, merge_records, merge_snapshots, AggregateRecord, Snapshot, ALL_SOURCES,
};
pub use error::{MarketflowError, MarketflowResult};
pub use health::HealthEntry;
pub use market::{Extreme, Metric, Mode, Pair, Period, Source};
pub use tick::{LatestTable, Tick};
