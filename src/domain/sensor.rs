use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ActivityType, AlertType};

/// One report from a cane: position, battery and reflector state, plus any
/// alert or activity raised since the previous report.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SensorPacket {
    #[validate(length(min = 1, max = 64))]
    pub serial_number: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub address: Option<String>,
    pub poi: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub battery_level: i32,
    #[serde(default)]
    pub is_charging: bool,
    pub reflector_on: bool,
    pub alert: Option<PacketAlert>,
    pub activity: Option<PacketActivity>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PacketAlert {
    pub alert_type: AlertType,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PacketActivity {
    pub activity_type: ActivityType,
    pub description: Option<String>,
}
