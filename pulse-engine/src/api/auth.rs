//! Admin gate for `/admin/*` routes

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use pulse_common::api::auth::verify_admin_token;
use tracing::warn;

use crate::{ApiError, AppState};

/// Reject requests that do not carry the configured admin bearer token
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_admin_token(authorization, state.config.admin_token.as_deref()) {
        warn!(path = %request.uri().path(), reason = %e, "Admin request rejected");
        return Err(if e.is_unauthenticated() {
            ApiError::Unauthorized(e.to_string())
        } else {
            ApiError::Forbidden(e.to_string())
        });
    }

    Ok(next.run(request).await)
}
