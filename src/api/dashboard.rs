use axum::{extract::State, routing::get, Json, Router};
use chrono::{TimeZone, Utc};

use super::{error::ApiError, extract::AppPath, require_device};
use crate::{
    domain::{DashboardCounts, DeviceSnapshot},
    repo::RecordFilter,
    state::AppState,
};

const RECENT_ROWS: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/devices/:id", get(device_snapshot))
}

/// GET /api/dashboard/summary
pub async fn summary(State(state): State<AppState>) -> Result<Json<DashboardCounts>, ApiError> {
    let midnight = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
    let since = Utc.from_utc_datetime(&midnight);
    Ok(Json(state.store.dashboard_counts(since).await?))
}

/// GET /api/dashboard/devices/:id - One card's worth of data per poll
pub async fn device_snapshot(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<DeviceSnapshot>, ApiError> {
    let device = require_device(&state, id).await?;
    let recent = RecordFilter::for_device(id, RECENT_ROWS);

    let (location, battery, reflector, recent_alerts, recent_activity) = tokio::try_join!(
        state.store.latest_location(id),
        state.store.latest_battery(id),
        state.store.latest_reflector(id),
        state.store.list_alerts(&recent),
        state.store.list_activity(&recent),
    )?;

    Ok(Json(DeviceSnapshot {
        device,
        location,
        battery,
        reflector,
        recent_alerts,
        recent_activity,
    }))
}
