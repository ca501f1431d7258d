//! HTTP API handlers

pub mod auth;
pub mod backfill;
pub mod health;
pub mod quotes;
pub mod snapshots;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::AppState;

pub use health::health_routes;
pub use quotes::quote_routes;

pub fn snapshot_routes() -> Router<AppState> {
    Router::new().route("/snapshots/:symbol", get(snapshots::latest_snapshot))
}

/// Routes behind the admin bearer token
pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/backfill", post(backfill::start_backfill))
        .route("/admin/snapshots/run", post(snapshots::run_snapshots))
        .route_layer(middleware::from_fn_with_state(state, auth::require_admin))
}
