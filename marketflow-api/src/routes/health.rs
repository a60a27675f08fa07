//! Health check endpoint

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};

use marketflow_core::HealthEntry;

use crate::AppState;

/// One entry per failing collaborator, or a single healthy entry
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Vec<HealthEntry>>) {
    let entries = state.coordinator.check_health().await;

    let code = if entries.iter().all(HealthEntry::is_healthy) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(entries))
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_test_state, send};
    use axum::http::StatusCode;
    use marketflow_core::Mode;

    #[tokio::test]
    async fn test_idle_coordinator_reports_source() {
        let app = crate::routes::router(create_test_state());

        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body[0]["connection"], "source");
        assert_eq!(body[0]["status"], "no active source");
    }

    #[tokio::test]
    async fn test_running_coordinator_is_healthy() {
        let state = create_test_state();
        state.coordinator.start(Mode::Test).await.unwrap();
        let app = crate::routes::router(state.clone());

        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["status"], "all connections are healthy");

        state.coordinator.stop_listening().await;
    }
}
