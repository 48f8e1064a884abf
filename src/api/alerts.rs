use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use validator::Validate;

use super::{
    error::ApiError,
    extract::{AppJson, AppPath, AppQuery},
};
use crate::{
    domain::{Alert, NewAlert},
    repo::RecordFilter,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts).post(raise_alert))
        .route("/:id", get(get_alert).delete(delete_alert))
        .route("/:id/acknowledge", patch(acknowledge_alert))
}

/// GET /api/alerts?device_id=&limit=&unacknowledged_only=
pub async fn list_alerts(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<RecordFilter>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    Ok(Json(state.store.list_alerts(&filter).await?))
}

pub async fn get_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Alert>, ApiError> {
    state
        .store
        .get_alert(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("alert {id} not found")))
}

pub async fn raise_alert(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewAlert>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    request.validate()?;
    let alert = state.store.insert_alert(&request).await?;
    tracing::info!(alert_id = alert.alert_id, device_id = alert.device_id, alert_type = %alert.alert_type, "alert raised");
    Ok((StatusCode::CREATED, Json(alert)))
}

/// PATCH /api/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.store.acknowledge_alert(id).await?))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_alert(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
