//! Quote proxy endpoint
//!
//! Every response, success or failure, carries `X-Cache`, `X-Circuit` and
//! `X-Request-Id`.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Duration;
use serde::Deserialize;
use tracing::info;

use crate::models::quote::{interval_for_range, is_intraday_range};
use crate::resilience::{ProxyFailure, ProxyOutcome};
use crate::{ApiError, AppState};

pub const DEFAULT_TIME_RANGE: &str = "1d";

/// Fresh-cache lifetime for a range
pub fn cache_ttl(range: &str) -> Duration {
    if is_intraday_range(range) {
        Duration::seconds(60)
    } else {
        Duration::seconds(300)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub symbol: Option<String>,
    pub time_range: Option<String>,
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

fn proxy_headers<T>(outcome: &ProxyOutcome<T>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("x-cache"), header_value(outcome.cache.as_str()));
    headers.insert(HeaderName::from_static("x-circuit"), header_value(outcome.circuit));
    headers.insert(
        HeaderName::from_static("x-request-id"),
        header_value(&outcome.request_id.to_string()),
    );
    headers
}

fn failure_to_error(failure: ProxyFailure) -> ApiError {
    if failure.status == StatusCode::SERVICE_UNAVAILABLE.as_u16() {
        ApiError::ServiceUnavailable {
            message: failure.message,
            retry_after: failure.retry_after_secs,
        }
    } else {
        ApiError::Upstream {
            status: failure.status,
            message: failure.message,
        }
    }
}

/// GET /quotes?symbol=&timeRange=
pub async fn get_quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Response {
    let symbol = match query.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(symbol) => symbol.to_ascii_uppercase(),
        None => return ApiError::BadRequest("symbol is required".to_string()).into_response(),
    };
    let range = query
        .time_range
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_TIME_RANGE)
        .to_string();
    let Some(interval) = interval_for_range(&range) else {
        return ApiError::BadRequest(format!("Unsupported timeRange: {}", range)).into_response();
    };

    let key = format!("{}:{}", symbol, range);
    let provider = state.quotes.clone();
    let outcome = state
        .quote_proxy
        .fetch(&key, cache_ttl(&range), || provider.fetch_quote(&symbol, &range, interval))
        .await;

    info!(
        symbol = %symbol,
        range = %range,
        cache = outcome.cache.as_str(),
        circuit = outcome.circuit,
        request_id = %outcome.request_id,
        "Quote served"
    );

    let headers = proxy_headers(&outcome);
    match outcome.result {
        Ok(payload) => (StatusCode::OK, headers, Json(payload)).into_response(),
        Err(failure) => (headers, failure_to_error(failure)).into_response(),
    }
}

pub fn quote_routes() -> Router<AppState> {
    Router::new().route("/quotes", get(get_quote))
}
