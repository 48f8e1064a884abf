use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Battery reading of a cane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BatteryStatus {
    pub battery_id: i64,
    pub device_id: i64,
    /// Charge in percent, 0..=100
    pub level: i32,
    pub is_charging: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBatteryStatus {
    pub device_id: i64,
    #[validate(range(min = 0, max = 100))]
    pub level: i32,
    #[serde(default)]
    pub is_charging: bool,
    pub recorded_at: Option<DateTime<Utc>>,
}
