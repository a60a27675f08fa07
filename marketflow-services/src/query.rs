//! Query Engine
//!
//! Answers price queries cache-first for latest values, and by combining the
//! store's history with the coordinator's unflushed buffer for extremes and
//! averages. Every token is validated before the store or cache is touched.

use std::sync::Arc;

use tracing::debug;

use marketflow_core::error::ALL_NOT_SUPPORTED;
use marketflow_core::{
    market_key, merge_records, AggregateRecord, Extreme, MarketflowError, MarketflowResult,
    Metric, Pair, Period, Source, Tick,
};

use crate::cache::Cache;
use crate::coordinator::IngestionCoordinator;
use crate::store::Store;

pub struct QueryEngine {
    coordinator: Arc<IngestionCoordinator>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
}

/// Parsed `source pair [period]` tokens
fn parse_market(
    source: &str,
    pair: &str,
    period: Option<&str>,
) -> MarketflowResult<(Source, Pair, Option<Period>)> {
    let source: Source = source.parse()?;
    let pair: Pair = pair.parse()?;
    let period = period.map(str::parse::<Period>).transpose()?;
    Ok((source, pair, period))
}

fn reject_zero(tick: Option<Tick>, what: &str) -> MarketflowResult<Tick> {
    match tick {
        Some(tick) if tick.price != 0.0 => Ok(tick),
        _ => Err(MarketflowError::not_found(format!(
            "{} price is not found",
            what
        ))),
    }
}

impl QueryEngine {
    pub fn new(
        coordinator: Arc<IngestionCoordinator>,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            coordinator,
            store,
            cache,
        }
    }

    /// Dispatch on a metric token. `latest` ignores the period.
    pub async fn price(
        &self,
        metric: &str,
        source: &str,
        pair: &str,
        period: Option<&str>,
    ) -> MarketflowResult<Tick> {
        match metric.parse::<Metric>()? {
            Metric::Highest => self.extreme(Extreme::Highest, source, pair, period).await,
            Metric::Lowest => self.extreme(Extreme::Lowest, source, pair, period).await,
            Metric::Average => self.average(source, pair, period).await,
            Metric::Latest => self.latest(source, pair).await,
        }
    }

    pub async fn latest(&self, source: &str, pair: &str) -> MarketflowResult<Tick> {
        let (source, pair, _) = parse_market(source, pair, None)?;
        self.latest_price(source, pair).await
    }

    /// Cache first; any cache failure falls back to the store
    pub async fn latest_price(&self, source: Source, pair: Pair) -> MarketflowResult<Tick> {
        let tick = match self.cache.get_latest(source, pair).await {
            Ok(tick) => Some(tick),
            Err(e) => {
                debug!("[Query] Cache lookup for {} {} failed: {}", source, pair, e);
                if source.is_all() {
                    self.store.latest_by_all(pair).await?
                } else {
                    self.store.latest_by_source(source, pair).await?
                }
            }
        };

        reject_zero(tick, "latest")
    }

    pub async fn extreme(
        &self,
        op: Extreme,
        source: &str,
        pair: &str,
        period: Option<&str>,
    ) -> MarketflowResult<Tick> {
        let (source, pair, period) = parse_market(source, pair, period)?;
        match period {
            Some(period) if source.is_all() => self.extreme_across_all(op, pair, period).await,
            period => self.extreme_for_source(op, source, pair, period).await,
        }
    }

    pub async fn average(
        &self,
        source: &str,
        pair: &str,
        period: Option<&str>,
    ) -> MarketflowResult<Tick> {
        let (source, pair, period) = parse_market(source, pair, period)?;
        match period {
            Some(period) if source.is_all() => self.average_across_all(pair, period).await,
            period => self.average_for_source(source, pair, period).await,
        }
    }

    /// Per-source extreme; `All` is only accepted without a period here
    pub async fn extreme_for_source(
        &self,
        op: Extreme,
        source: Source,
        pair: Pair,
        period: Option<Period>,
    ) -> MarketflowResult<Tick> {
        if source.is_all() && period.is_some() {
            return Err(MarketflowError::validation(ALL_NOT_SUPPORTED));
        }
        self.resolve_extreme(op, source, pair, period).await
    }

    /// Extreme over the aggregated `All` series within a trailing window
    pub async fn extreme_across_all(
        &self,
        op: Extreme,
        pair: Pair,
        period: Period,
    ) -> MarketflowResult<Tick> {
        self.resolve_extreme(op, Source::All, pair, Some(period))
            .await
    }

    pub async fn average_for_source(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Period>,
    ) -> MarketflowResult<Tick> {
        if source.is_all() && period.is_some() {
            return Err(MarketflowError::validation(ALL_NOT_SUPPORTED));
        }
        self.resolve_average(source, pair, period).await
    }

    pub async fn average_across_all(&self, pair: Pair, period: Period) -> MarketflowResult<Tick> {
        self.resolve_average(Source::All, pair, Some(period)).await
    }

    async fn resolve_extreme(
        &self,
        op: Extreme,
        source: Source,
        pair: Pair,
        period: Option<Period>,
    ) -> MarketflowResult<Tick> {
        let window = period.map(|period| period.duration());
        let stored = self.store.extreme(op, source, pair, window).await?;
        let buffered = self.buffered(source, pair, period).await.map(|record| {
            let price = match op {
                Extreme::Highest => record.max_price,
                Extreme::Lowest => record.min_price,
            };
            Tick::new(
                source.as_str(),
                pair.as_str(),
                price,
                record.timestamp.timestamp_millis(),
            )
        });

        let combined = match (stored, buffered) {
            (Some(stored), Some(buffered)) => {
                if op.pick(stored.price, buffered.price) == buffered.price {
                    Some(buffered)
                } else {
                    Some(stored)
                }
            }
            (stored, buffered) => stored.or(buffered),
        };

        reject_zero(combined, op.as_str())
    }

    async fn resolve_average(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Period>,
    ) -> MarketflowResult<Tick> {
        let window = period.map(|period| period.duration());
        let stored = self.store.average(source, pair, window).await?;
        let buffered = self.buffered(source, pair, period).await;

        let combined = match (stored, buffered) {
            (Some(stored), Some(buffered)) => Some(Tick {
                price: (stored.price + buffered.avg_price) / 2.0,
                timestamp: stored.timestamp.max(buffered.timestamp.timestamp_millis()),
                ..stored
            }),
            (Some(stored), None) => Some(stored),
            (None, Some(buffered)) => Some(Tick::new(
                source.as_str(),
                pair.as_str(),
                buffered.avg_price,
                buffered.timestamp.timestamp_millis(),
            )),
            (None, None) => None,
        };

        reject_zero(combined, "average")
    }

    /// Unflushed records for the key, merged into one
    async fn buffered(
        &self,
        source: Source,
        pair: Pair,
        period: Option<Period>,
    ) -> Option<AggregateRecord> {
        let key = market_key(source.as_str(), pair.as_str());
        let records = self
            .coordinator
            .buffered_records(&key, period.map(|period| period.duration()))
            .await;
        merge_records(&records)
    }
}
