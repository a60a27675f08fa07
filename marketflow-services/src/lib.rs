//! Ingestion and query services for Marketflow
//!
//! This crate wires feed output through the aggregation pipeline into the
//! coordinator's buffer, persists it through the store and cache
//! collaborators, and answers price queries over both.

pub mod cache;
pub mod coordinator;
pub mod pipeline;
pub mod query;
pub mod store;

#[cfg(test)]
mod test_support;

pub use cache::{latest_key, Cache, CacheError, MemoryCache};
pub use coordinator::{CoordinatorConfig, IngestionCoordinator, EXPECTED_LATEST_KEYS};
pub use pipeline::{Pipeline, PipelineConfig};
pub use query::QueryEngine;
pub use store::{SqliteStore, Store, StoreError};
