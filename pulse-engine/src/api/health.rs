//! Health check endpoint

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::AppState;

/// GET /health
///
/// 200 for healthy or degraded, 503 for unhealthy.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;
    (report.http_status(), Json(report))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
