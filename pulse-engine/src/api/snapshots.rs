//! Snapshot read API and the on-demand run trigger

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::db::snapshots;
use crate::models::snapshot::{PeriodType, Snapshot};
use crate::services::snapshot_orchestrator::RunReport;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub period: Option<String>,
}

fn parse_period(raw: Option<&str>) -> ApiResult<PeriodType> {
    match raw {
        None => Ok(PeriodType::Daily),
        Some(raw) => raw.parse().map_err(ApiError::BadRequest),
    }
}

/// GET /snapshots/:symbol?period=
pub async fn latest_snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> ApiResult<Json<Snapshot>> {
    let symbol = symbol.trim().to_ascii_uppercase();
    let period = parse_period(query.period.as_deref())?;
    snapshots::latest(&state.db, &symbol, period)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No {} snapshot for {}", period, symbol)))
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub period: String,
    #[serde(default)]
    pub force: bool,
}

/// POST /admin/snapshots/run
pub async fn run_snapshots(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> ApiResult<Json<RunReport>> {
    let period = parse_period(Some(&request.period))?;
    Ok(Json(state.orchestrator.run(period, request.force).await))
}
