use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::{
    error::ApiError,
    extract::{AppJson, AppPath, AppQuery},
    require_device,
};
use crate::{
    domain::{NewReflectorStatus, ReflectorStatus},
    repo::RecordFilter,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reflector).post(record_reflector))
        .route("/latest/:device_id", get(latest_reflector))
}

pub async fn list_reflector(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<RecordFilter>,
) -> Result<Json<Vec<ReflectorStatus>>, ApiError> {
    Ok(Json(state.store.list_reflector(&filter).await?))
}

pub async fn latest_reflector(
    State(state): State<AppState>,
    AppPath(device_id): AppPath<i64>,
) -> Result<Json<Option<ReflectorStatus>>, ApiError> {
    require_device(&state, device_id).await?;
    Ok(Json(state.store.latest_reflector(device_id).await?))
}

pub async fn record_reflector(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewReflectorStatus>,
) -> Result<(StatusCode, Json<ReflectorStatus>), ApiError> {
    let row = state.store.insert_reflector(&request).await?;
    Ok((StatusCode::CREATED, Json(row)))
}
