pub mod activity;
pub mod alerts;
pub mod auth;
pub mod battery;
pub mod dashboard;
pub mod devices;
pub mod error;
pub mod extract;
pub mod health;
pub mod location;
pub mod reflector;
pub mod sensor;
pub mod socket;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{domain::Device, state::AppState};
use error::ApiError;

/// Loads a device or fails with 404.
pub(crate) async fn require_device(state: &AppState, device_id: i64) -> Result<Device, ApiError> {
    state
        .store
        .get_device(device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id} not found")))
}

pub fn router(state: AppState) -> Router {
    let cfg = state.cfg.clone();

    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/devices", devices::router())
        .nest("/location", location::router())
        .nest("/battery", battery::router())
        .nest("/reflector", reflector::router())
        .nest("/alerts", alerts::router())
        .nest("/activity", activity::router())
        .nest("/dashboard", dashboard::router())
        .nest("/sensor", sensor::router());

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/ws", get(socket::ws_handler))
        .nest("/api", api)
        .with_state(state);

    if cfg.server.enable_cors {
        match cfg.server.cors_origin.parse::<HeaderValue>() {
            Ok(origin) => {
                let cors = CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::PATCH,
                        Method::DELETE,
                    ])
                    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
                router = router.layer(cors);
            }
            Err(e) => {
                tracing::warn!(origin = %cfg.server.cors_origin, error = %e, "invalid CORS origin, CORS disabled");
            }
        }
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(256 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}
