//! Liveness and metrics endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;
use crate::metrics::MetricsSnapshot;

/// Returns 200 OK with the text "OK".
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Current counter values.
pub async fn metrics_handler<R, F, B>(State(app_state): State<AppState<R, F, B>>) -> Json<MetricsSnapshot>
where
    R: Send + Sync + 'static,
    F: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    Json(app_state.metrics().snapshot())
}
