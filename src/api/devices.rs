use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use validator::Validate;

use super::{
    error::ApiError,
    extract::{AppJson, AppPath},
    require_device,
};
use crate::{
    domain::{Device, NewDevice, UpdateDevice},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_devices).post(add_device))
        .route("/serial/:serial", get(get_device_by_serial))
        .route("/:id", get(get_device).put(update_device).delete(delete_device))
}

/// GET /api/devices - List all devices
pub async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(state.store.list_devices().await?))
}

/// GET /api/devices/:id - Get device by ID
pub async fn get_device(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(require_device(&state, id).await?))
}

/// GET /api/devices/serial/:serial
pub async fn get_device_by_serial(
    State(state): State<AppState>,
    AppPath(serial): AppPath<String>,
) -> Result<Json<Device>, ApiError> {
    state
        .store
        .find_device_by_serial(&serial)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("device with serial {serial} not found")))
}

/// POST /api/devices - Register a device
pub async fn add_device(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewDevice>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    request.validate()?;
    let device = state.store.create_device(&request).await?;
    tracing::info!(device_id = device.device_id, serial = %device.serial_number, "device registered");
    Ok((StatusCode::CREATED, Json(device)))
}

/// PUT /api/devices/:id - Update a device
pub async fn update_device(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<UpdateDevice>,
) -> Result<Json<Device>, ApiError> {
    request.validate()?;
    Ok(Json(state.store.update_device(id, &request).await?))
}

/// DELETE /api/devices/:id - Delete a device and its telemetry
pub async fn delete_device(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_device(id).await?;
    tracing::info!(device_id = id, "device deleted");
    Ok(StatusCode::NO_CONTENT)
}
