use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: Status,
    timestamp: DateTime<Utc>,
    store: StoreProbe,
    /// Open dashboard and producer sockets
    socket_clients: usize,
    geocoding_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct StoreProbe {
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl StoreProbe {
    async fn run(state: &AppState) -> Self {
        let started = Instant::now();
        match state.store.ping().await {
            Ok(()) => Self {
                reachable: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                reachable: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// GET /health - store probe plus relay and geocoder state
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = StoreProbe::run(&state).await;
    let (status, code) = if store.reachable {
        (Status::Healthy, StatusCode::OK)
    } else {
        (Status::Degraded, StatusCode::SERVICE_UNAVAILABLE)
    };
    tracing::debug!(?status, "health check");

    let report = HealthReport {
        status,
        timestamp: Utc::now(),
        store,
        socket_clients: state.relay.subscriber_count(),
        geocoding_enabled: state.geocoder.is_some(),
    };
    (code, Json(report))
}

/// GET /health/ready
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if StoreProbe::run(&state).await.reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
