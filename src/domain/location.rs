use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LocationLog {
    pub location_id: i64,
    pub device_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub poi: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewLocation {
    pub device_id: i64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(length(max = 512))]
    pub address: Option<String>,
    #[validate(length(max = 256))]
    pub poi: Option<String>,
    /// Defaults to the time of insertion
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Payload of a `location_update` relay event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationUpdate {
    pub device_id: i64,
    pub serial_number: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub poi: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationUpdate {
    pub fn from_log(log: &LocationLog, serial_number: Option<String>) -> Self {
        Self {
            device_id: log.device_id,
            serial_number,
            latitude: log.latitude,
            longitude: log.longitude,
            address: log.address.clone(),
            poi: log.poi.clone(),
            recorded_at: log.recorded_at,
        }
    }
}
