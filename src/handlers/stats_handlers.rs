//! Dashboard statistics endpoints.

use crate::{errors::AppError, services::AppState, services::stats::DateRangeQuery};
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

/// `GET /api/stats`: overview, monthly series, categories and recent activity.
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let dashboard = state.stats.dashboard().await?;
    Ok(Json(dashboard))
}

/// `GET /api/stats/date-range?startDate=&endDate=`
pub async fn get_date_range(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.stats.date_range(&query).await?;
    Ok(Json(report))
}
