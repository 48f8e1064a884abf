use serde::{Deserialize, Serialize};

use super::{ActivityLog, Alert, BatteryStatus, Device, LocationLog, ReflectorStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DashboardCounts {
    pub devices: i64,
    pub unacknowledged_alerts: i64,
    /// Location rows recorded since UTC midnight
    pub readings_today: i64,
}

/// Everything one dashboard card needs about a cane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub location: Option<LocationLog>,
    pub battery: Option<BatteryStatus>,
    pub reflector: Option<ReflectorStatus>,
    pub recent_alerts: Vec<Alert>,
    pub recent_activity: Vec<ActivityLog>,
}
