use axum::{extract::State, http::StatusCode, Json};

use huddle_core::health::HealthReport;

use super::blocking;
use crate::error::ApiResult;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<HealthReport>)> {
    let report = blocking(move || Ok(state.health.check_health())).await?;
    let status =
        StatusCode::from_u16(report.status.to_http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    Ok((status, Json(report)))
}
