use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ReflectorStatus {
    pub reflector_id: i64,
    pub device_id: i64,
    pub is_on: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReflectorStatus {
    pub device_id: i64,
    pub is_on: bool,
    pub recorded_at: Option<DateTime<Utc>>,
}
