use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

use super::{error::ApiError, extract::AppJson};
use crate::{domain::SensorPacket, ingest, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/readings", post(ingest_reading))
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub device_id: i64,
    pub location_id: i64,
    pub battery_id: i64,
    pub reflector_id: i64,
    pub alert_id: Option<i64>,
    pub delivered: usize,
}

/// POST /api/sensor/readings - One packet from a cane or the simulator
pub async fn ingest_reading(
    State(state): State<AppState>,
    AppJson(packet): AppJson<SensorPacket>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let outcome = ingest::record_packet(state.store.as_ref(), &state.relay, &packet).await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            device_id: outcome.location.device_id,
            location_id: outcome.location.location_id,
            battery_id: outcome.battery.battery_id,
            reflector_id: outcome.reflector.reflector_id,
            alert_id: outcome.alert.map(|a| a.alert_id),
            delivered: outcome.delivered,
        }),
    ))
}
