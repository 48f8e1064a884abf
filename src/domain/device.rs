use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A registered smart cane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Device {
    pub device_id: i64,
    pub serial_number: String,
    pub device_name: Option<String>,
    pub user_id: Option<i64>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewDevice {
    #[validate(length(min = 1, max = 64))]
    pub serial_number: String,
    #[validate(length(max = 120))]
    pub device_name: Option<String>,
    pub user_id: Option<i64>,
}

impl NewDevice {
    pub fn with_serial(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            device_name: None,
            user_id: None,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateDevice {
    #[validate(length(min = 1, max = 64))]
    pub serial_number: Option<String>,
    #[validate(length(max = 120))]
    pub device_name: Option<String>,
    pub user_id: Option<i64>,
}

impl UpdateDevice {
    pub fn apply(&self, device: &mut Device) {
        if let Some(serial) = &self.serial_number {
            device.serial_number = serial.clone();
        }
        if let Some(name) = &self.device_name {
            device.device_name = Some(name.clone());
        }
        if let Some(user_id) = self.user_id {
            device.user_id = Some(user_id);
        }
    }
}
