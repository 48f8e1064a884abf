use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub enable_cors: bool,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub enabled: bool,
    pub nominatim_url: String,
    pub locationiq_url: String,
    /// LocationIQ is only consulted when a key is present
    pub locationiq_key: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            locationiq_url: "https://us1.locationiq.com".to_string(),
            locationiq_key: None,
            user_agent: "gabaylakad/0.1".to_string(),
            timeout_secs: 10,
            cache_ttl_secs: 600,
        }
    }
}

/// Geofence for the simulator's random walk.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub tick_seconds: u64,
    pub device_serials: Vec<String>,
    pub bounds: BoundingBox,
    pub target_city: Option<String>,
    pub step_meters: f64,
    pub max_geocode_attempts: u32,
    pub battery_drain_per_tick: f64,
    pub battery_charge_per_tick: f64,
    pub recharge_threshold: i32,
    pub low_battery_threshold: i32,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    /// UTC offset used for the night schedule
    pub utc_offset_hours: i32,
    pub alert_probability: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            socket_url: "ws://127.0.0.1:5000/ws".to_string(),
            tick_seconds: 5,
            device_serials: vec!["GL-0001".to_string()],
            // Naga City, Camarines Sur
            bounds: BoundingBox {
                min_lat: 13.6000,
                max_lat: 13.6500,
                min_lon: 123.1700,
                max_lon: 123.2100,
            },
            target_city: Some("Naga".to_string()),
            step_meters: 25.0,
            max_geocode_attempts: 5,
            battery_drain_per_tick: 0.5,
            battery_charge_per_tick: 5.0,
            recharge_threshold: 10,
            low_battery_threshold: 20,
            night_start_hour: 18,
            night_end_hour: 6,
            utc_offset_hours: 8,
            alert_probability: 0.01,
        }
    }
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_token_ttl() -> i64 {
    60 * 24
}
fn default_max_connections() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GABAY__").split("__"));
        Ok(figment.extract()?)
    }

    /// Whether the JWT secret is still the shipped placeholder.
    pub fn has_placeholder_secret(&self) -> bool {
        self.auth.jwt_secret.trim().is_empty() || self.auth.jwt_secret.starts_with("__SET_VIA_ENV")
    }
}
