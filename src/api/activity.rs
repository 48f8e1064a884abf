use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use validator::Validate;

use super::{
    error::ApiError,
    extract::{AppJson, AppQuery},
};
use crate::{
    domain::{ActivityLog, NewActivity},
    repo::RecordFilter,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_activity).post(log_activity))
}

pub async fn list_activity(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<RecordFilter>,
) -> Result<Json<Vec<ActivityLog>>, ApiError> {
    Ok(Json(state.store.list_activity(&filter).await?))
}

pub async fn log_activity(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewActivity>,
) -> Result<(StatusCode, Json<ActivityLog>), ApiError> {
    request.validate()?;
    let row = state.store.insert_activity(&request).await?;
    Ok((StatusCode::CREATED, Json(row)))
}
