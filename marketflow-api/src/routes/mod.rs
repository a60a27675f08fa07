//! API route definitions

mod health;
mod mode;
mod prices;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tracing::error;

use marketflow_core::MarketflowError;

use crate::AppState;

/// Create all API routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(mode::routes())
        .merge(prices::routes())
        .with_state(state)
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: String,
}

/// Service error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub MarketflowError);

impl From<MarketflowError> for ApiError {
    fn from(err: MarketflowError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MarketflowError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketflowError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketflowError::Conflict(_) => StatusCode::CONFLICT,
            MarketflowError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use marketflow_services::{
        CoordinatorConfig, IngestionCoordinator, MemoryCache, QueryEngine, SqliteStore,
    };

    use crate::AppState;

    pub(crate) fn create_test_state() -> AppState {
        create_test_state_with_cache(Arc::new(MemoryCache::new()))
    }

    pub(crate) fn create_test_state_with_cache(cache: Arc<MemoryCache>) -> AppState {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let coordinator =
            IngestionCoordinator::new(store.clone(), cache.clone(), CoordinatorConfig::default());
        AppState {
            query: Arc::new(QueryEngine::new(coordinator.clone(), store, cache)),
            coordinator,
        }
    }

    pub(crate) async fn send(
        app: Router,
        method: &str,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}
