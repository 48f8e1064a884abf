#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use gabaylakad::{
    api,
    config::{
        AuthConfig, Config, DbConfig, GeocodingConfig, RelayConfig, ServerConfig, SimulatorConfig,
    },
    geocode::ReverseGeocoder,
    repo::MemoryStore,
    state::AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            enable_cors: true,
            cors_origin: "http://localhost:3000".to_string(),
            request_timeout_secs: 5,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-0123456789".to_string(),
            token_ttl_minutes: 60,
        },
        db: DbConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            run_migrations: false,
        },
        relay: RelayConfig::default(),
        geocoding: GeocodingConfig::default(),
        simulator: SimulatorConfig::default(),
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), Arc::new(MemoryStore::new())).expect("state builds")
}

pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    (api::router(state.clone()), state)
}

pub fn test_app_with_geocoder(geocoder: Arc<dyn ReverseGeocoder>) -> (Router, AppState) {
    let state = test_state().with_geocoder(geocoder);
    (api::router(state.clone()), state)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_token(app, method, uri, body, None).await
}

pub async fn send_with_token(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is JSON")
    };
    (status, value)
}
