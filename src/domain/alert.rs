use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlertType {
    /// Panic button pressed on the cane
    Sos,
    Fall,
    Obstacle,
    LowBattery,
    /// Cane left its expected area
    Geofence,
}

impl TryFrom<String> for AlertType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl AlertType {
    pub fn default_message(&self) -> &'static str {
        match self {
            AlertType::Sos => "SOS button pressed",
            AlertType::Fall => "Possible fall detected",
            AlertType::Obstacle => "Obstacle detected ahead",
            AlertType::LowBattery => "Battery is running low",
            AlertType::Geofence => "Device left the expected area",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Alert {
    pub alert_id: i64,
    pub device_id: i64,
    #[cfg_attr(feature = "db", sqlx(try_from = "String"))]
    pub alert_type: AlertType,
    pub message: String,
    pub acknowledged: bool,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAlert {
    pub device_id: i64,
    pub alert_type: AlertType,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl NewAlert {
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.alert_type.default_message().to_string())
    }
}
