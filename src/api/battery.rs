//! Battery status endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use validator::Validate;

use super::{
    error::ApiError,
    extract::{AppJson, AppPath, AppQuery},
    require_device,
};
use crate::{
    domain::{BatteryStatus, NewBatteryStatus},
    repo::RecordFilter,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_battery).post(record_battery))
        .route("/latest/:device_id", get(latest_battery))
}

pub async fn list_battery(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<RecordFilter>,
) -> Result<Json<Vec<BatteryStatus>>, ApiError> {
    Ok(Json(state.store.list_battery(&filter).await?))
}

pub async fn latest_battery(
    State(state): State<AppState>,
    AppPath(device_id): AppPath<i64>,
) -> Result<Json<Option<BatteryStatus>>, ApiError> {
    require_device(&state, device_id).await?;
    Ok(Json(state.store.latest_battery(device_id).await?))
}

pub async fn record_battery(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewBatteryStatus>,
) -> Result<(StatusCode, Json<BatteryStatus>), ApiError> {
    request.validate()?;
    let row = state.store.insert_battery(&request).await?;
    Ok((StatusCode::CREATED, Json(row)))
}
