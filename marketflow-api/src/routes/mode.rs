//! Data mode switching

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use marketflow_core::Mode;

use super::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub code: u16,
    pub message: String,
}

async fn switch_mode(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<ModeResponse>, ApiError> {
    let mode: Mode = mode.parse()?;
    state.coordinator.switch_mode(mode).await?;

    info!("Data mode switched to {}", mode);
    Ok(Json(ModeResponse {
        code: 200,
        message: format!("data mode switched to {}", mode),
    }))
}

/// Create mode routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/mode/{mode}", post(switch_mode))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_test_state, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_switch_then_conflict() {
        let state = create_test_state();

        let (status, body) = send(crate::routes::router(state.clone()), "POST", "/mode/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 200);
        assert_eq!(body["message"], "data mode switched to test");

        let (status, body) = send(crate::routes::router(state.clone()), "POST", "/mode/test").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], 409);

        state.coordinator.stop_listening().await;
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected() {
        let app = crate::routes::router(create_test_state());

        let (status, body) = send(app, "POST", "/mode/paper").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "mode value is invalid, must be (test or live)");
    }
}
