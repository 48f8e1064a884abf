//! Storage seam for the API, the ingest path and the simulator's DB sink.
//!
//! Every operation maps to one statement on the relational schema in
//! `migrations/`. `PgStore` is the production backend, `MemoryStore` backs
//! tests and `--memory` runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::domain::{
    ActivityLog, Alert, BatteryStatus, DashboardCounts, Device, LocationLog, NewActivity, NewAlert,
    NewBatteryStatus, NewDevice, NewLocation, NewReflectorStatus, NewUser, ReflectorStatus,
    UpdateDevice, User,
};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::MemoryStore;
#[cfg(feature = "db")]
pub use pg::PgStore;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query-string filter shared by the list endpoints. Results are newest first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    pub device_id: Option<i64>,
    pub limit: Option<i64>,
    /// Only honoured by alert listings
    pub unacknowledged_only: bool,
}

impl RecordFilter {
    pub fn for_device(device_id: i64, limit: i64) -> Self {
        Self {
            device_id: Some(device_id),
            limit: Some(limit),
            unacknowledged_only: false,
        }
    }

    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    async fn list_devices(&self) -> StoreResult<Vec<Device>>;
    async fn get_device(&self, device_id: i64) -> StoreResult<Option<Device>>;
    async fn find_device_by_serial(&self, serial: &str) -> StoreResult<Option<Device>>;
    async fn create_device(&self, device: &NewDevice) -> StoreResult<Device>;
    async fn update_device(&self, device_id: i64, update: &UpdateDevice) -> StoreResult<Device>;
    async fn delete_device(&self, device_id: i64) -> StoreResult<()>;

    async fn list_locations(&self, filter: &RecordFilter) -> StoreResult<Vec<LocationLog>>;
    async fn latest_location(&self, device_id: i64) -> StoreResult<Option<LocationLog>>;
    async fn insert_location(&self, location: &NewLocation) -> StoreResult<LocationLog>;

    async fn list_battery(&self, filter: &RecordFilter) -> StoreResult<Vec<BatteryStatus>>;
    async fn latest_battery(&self, device_id: i64) -> StoreResult<Option<BatteryStatus>>;
    async fn insert_battery(&self, status: &NewBatteryStatus) -> StoreResult<BatteryStatus>;

    async fn list_reflector(&self, filter: &RecordFilter) -> StoreResult<Vec<ReflectorStatus>>;
    async fn latest_reflector(&self, device_id: i64) -> StoreResult<Option<ReflectorStatus>>;
    async fn insert_reflector(&self, status: &NewReflectorStatus) -> StoreResult<ReflectorStatus>;

    async fn list_alerts(&self, filter: &RecordFilter) -> StoreResult<Vec<Alert>>;
    async fn get_alert(&self, alert_id: i64) -> StoreResult<Option<Alert>>;
    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert>;
    async fn acknowledge_alert(&self, alert_id: i64) -> StoreResult<Alert>;
    async fn delete_alert(&self, alert_id: i64) -> StoreResult<()>;

    async fn list_activity(&self, filter: &RecordFilter) -> StoreResult<Vec<ActivityLog>>;
    async fn insert_activity(&self, activity: &NewActivity) -> StoreResult<ActivityLog>;

    async fn dashboard_counts(&self, since: DateTime<Utc>) -> StoreResult<DashboardCounts>;
}

pub type DynStore = Arc<dyn Store>;

/// Opens the configured backend, or an empty in-memory store when `memory` is set.
pub async fn open_store(cfg: &Config, memory: bool) -> anyhow::Result<DynStore> {
    if memory {
        tracing::warn!("using in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "db")]
    {
        let store = PgStore::connect(&cfg.db).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "db"))]
    {
        let _ = cfg;
        anyhow::bail!("built without the `db` feature; run with --memory")
    }
}
