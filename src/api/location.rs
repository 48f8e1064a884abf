use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use super::{
    error::ApiError,
    extract::{AppJson, AppPath, AppQuery},
    require_device,
};
use crate::{
    domain::{LocationLog, LocationUpdate, NewLocation},
    geocode::ResolvedPlace,
    repo::RecordFilter,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_locations).post(record_location))
        .route("/latest/:device_id", get(latest_location))
        .route("/reverse", get(reverse_geocode))
}

/// GET /api/location?device_id=&limit=
pub async fn list_locations(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<RecordFilter>,
) -> Result<Json<Vec<LocationLog>>, ApiError> {
    Ok(Json(state.store.list_locations(&filter).await?))
}

/// GET /api/location/latest/:device_id - `null` until the first fix arrives
pub async fn latest_location(
    State(state): State<AppState>,
    AppPath(device_id): AppPath<i64>,
) -> Result<Json<Option<LocationLog>>, ApiError> {
    require_device(&state, device_id).await?;
    Ok(Json(state.store.latest_location(device_id).await?))
}

/// POST /api/location - Record a fix and push it to live dashboards
pub async fn record_location(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewLocation>,
) -> Result<(StatusCode, Json<LocationLog>), ApiError> {
    request.validate()?;
    let device = require_device(&state, request.device_id).await?;
    let row = state.store.insert_location(&request).await?;
    state
        .relay
        .publish(LocationUpdate::from_log(&row, Some(device.serial_number)));
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReverseQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
}

/// GET /api/location/reverse?lat=&lon= - Address and POI for a coordinate
pub async fn reverse_geocode(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ReverseQuery>,
) -> Result<Json<ResolvedPlace>, ApiError> {
    query.validate()?;
    let geocoder = state
        .geocoder
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("reverse geocoding is disabled".to_string()))?;
    Ok(Json(geocoder.reverse(query.lat, query.lon).await?))
}
