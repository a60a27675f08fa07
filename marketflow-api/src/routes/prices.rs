//! Price query endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use marketflow_core::{Tick, ALL_SOURCES};

use super::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    /// Lookback window (1s, 3s, 5s, 10s, 30s, 1m, 3m, 5m)
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub source: String,
    pub pair: String,
    pub price: f64,
    pub timestamp: String,
}

impl From<Tick> for PriceResponse {
    fn from(tick: Tick) -> Self {
        Self {
            timestamp: tick.time().to_rfc3339(),
            source: tick.source,
            pair: tick.pair,
            price: tick.price,
        }
    }
}

/// Create price routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/prices/{metric}/{pair}", get(all_sources_price))
        .route("/prices/{metric}/{source}/{pair}", get(source_price))
}

async fn all_sources_price(
    State(state): State<AppState>,
    Path((metric, pair)): Path<(String, String)>,
    Query(params): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    price_for(&state, &metric, ALL_SOURCES, &pair, &params).await
}

async fn source_price(
    State(state): State<AppState>,
    Path((metric, source, pair)): Path<(String, String, String)>,
    Query(params): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    price_for(&state, &metric, &source, &pair, &params).await
}

async fn price_for(
    state: &AppState,
    metric: &str,
    source: &str,
    pair: &str,
    params: &PriceQuery,
) -> Result<Json<PriceResponse>, ApiError> {
    let period = params.period.as_deref().filter(|period| !period.is_empty());
    let tick = state.query.price(metric, source, pair, period).await?;
    Ok(Json(tick.into()))
}
