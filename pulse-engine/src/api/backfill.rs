//! Admin backfill endpoint, streamed as Server-Sent Events

use axum::{extract::State, response::IntoResponse, Json};
use pulse_common::sse::json_event_stream;
use tracing::info;

use crate::services::backfill::BackfillRequest;
use crate::{ApiResult, AppState};

/// POST /admin/backfill
///
/// Validation errors return 400 before the stream opens. After that every
/// outcome, including failures, arrives as an event.
pub async fn start_backfill(
    State(state): State<AppState>,
    Json(request): Json<BackfillRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = request.validate()?;
    info!(
        symbol = %request.symbol,
        start = %request.start_date,
        end = %request.end_date,
        "Backfill requested"
    );
    Ok(json_event_stream(state.backfill.stream(request)))
}
