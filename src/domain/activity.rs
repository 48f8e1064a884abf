use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActivityType {
    Walking,
    Idle,
    Charging,
    ReflectorToggled,
}

impl TryFrom<String> for ActivityType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ActivityLog {
    pub activity_id: i64,
    pub device_id: i64,
    #[cfg_attr(feature = "db", sqlx(try_from = "String"))]
    pub activity_type: ActivityType,
    pub description: Option<String>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewActivity {
    pub device_id: i64,
    pub activity_type: ActivityType,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub logged_at: Option<DateTime<Utc>>,
}
