#![cfg(feature = "db")]

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use super::{RecordFilter, Store, StoreError, StoreResult};
use crate::config::DbConfig;
use crate::domain::{
    ActivityLog, Alert, BatteryStatus, DashboardCounts, Device, LocationLog, NewActivity, NewAlert,
    NewBatteryStatus, NewDevice, NewLocation, NewReflectorStatus, NewUser, ReflectorStatus,
    UpdateDevice, User,
};

const CONNECT_ATTEMPTS: usize = 5;

const DEVICE_COLUMNS: &str = "device_id, serial_number, device_name, user_id, registered_at";
const USER_COLUMNS: &str = "user_id, email, full_name, password_hash, created_at";
const LOCATION_COLUMNS: &str = "location_id, device_id, latitude, longitude, address, poi, recorded_at";
const BATTERY_COLUMNS: &str = "battery_id, device_id, level, is_charging, recorded_at";
const REFLECTOR_COLUMNS: &str = "reflector_id, device_id, is_on, recorded_at";
const ALERT_COLUMNS: &str = "alert_id, device_id, alert_type, message, acknowledged, triggered_at";
const ACTIVITY_COLUMNS: &str = "activity_id, device_id, activity_type, description, logged_at";

/// Maps constraint violations onto the store's error kinds.
fn map_err(error: sqlx::Error, device_id: Option<i64>) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return match device_id {
                Some(id) => StoreError::not_found("device", id),
                None => StoreError::Conflict(db.message().to_string()),
            };
        }
    }
    StoreError::Backend(anyhow::Error::new(error))
}

fn backend(error: sqlx::Error) -> StoreError {
    map_err(error, None)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(cfg: &DbConfig) -> anyhow::Result<Self> {
        info!("initializing database connection pool");
        let pool = Self::connect_with_retry(cfg).await?;

        if cfg.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("failed to run database migrations")?;
            info!("database migrations applied");
        }

        Ok(Self { pool })
    }

    async fn connect_with_retry(cfg: &DbConfig) -> anyhow::Result<PgPool> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            let result = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&cfg.url)
                .await;
            match result {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt >= CONNECT_ATTEMPTS => {
                    return Err(e).context(format!(
                        "failed to connect to database after {CONNECT_ATTEMPTS} attempts"
                    ));
                }
                Err(e) => {
                    warn!(attempt, max = CONNECT_ATTEMPTS, error = %e, ?delay, "database connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, full_name, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn list_devices(&self) -> StoreResult<Vec<Device>> {
        sqlx::query_as::<_, Device>(&format!("SELECT {DEVICE_COLUMNS} FROM device ORDER BY device_id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn get_device(&self, device_id: i64) -> StoreResult<Option<Device>> {
        sqlx::query_as::<_, Device>(&format!("SELECT {DEVICE_COLUMNS} FROM device WHERE device_id = $1"))
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_device_by_serial(&self, serial: &str) -> StoreResult<Option<Device>> {
        sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM device WHERE serial_number = $1"
        ))
        .bind(serial)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn create_device(&self, device: &NewDevice) -> StoreResult<Device> {
        sqlx::query_as::<_, Device>(&format!(
            "INSERT INTO device (serial_number, device_name, user_id) VALUES ($1, $2, $3) RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(&device.serial_number)
        .bind(&device.device_name)
        .bind(device.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn update_device(&self, device_id: i64, update: &UpdateDevice) -> StoreResult<Device> {
        sqlx::query_as::<_, Device>(&format!(
            r#"
            UPDATE device
            SET serial_number = COALESCE($2, serial_number),
                device_name = COALESCE($3, device_name),
                user_id = COALESCE($4, user_id)
            WHERE device_id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(device_id)
        .bind(&update.serial_number)
        .bind(&update.device_name)
        .bind(update.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::not_found("device", device_id))
    }

    async fn delete_device(&self, device_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM device WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("device", device_id));
        }
        Ok(())
    }

    async fn list_locations(&self, filter: &RecordFilter) -> StoreResult<Vec<LocationLog>> {
        sqlx::query_as::<_, LocationLog>(&format!(
            r#"
            SELECT {LOCATION_COLUMNS} FROM location_log
            WHERE ($1::BIGINT IS NULL OR device_id = $1)
            ORDER BY recorded_at DESC, location_id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.device_id)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn latest_location(&self, device_id: i64) -> StoreResult<Option<LocationLog>> {
        let mut rows = self.list_locations(&RecordFilter::for_device(device_id, 1)).await?;
        Ok(rows.pop())
    }

    async fn insert_location(&self, location: &NewLocation) -> StoreResult<LocationLog> {
        sqlx::query_as::<_, LocationLog>(&format!(
            r#"
            INSERT INTO location_log (device_id, latitude, longitude, address, poi, recorded_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            RETURNING {LOCATION_COLUMNS}
            "#
        ))
        .bind(location.device_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(&location.address)
        .bind(&location.poi)
        .bind(location.recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err(e, Some(location.device_id)))
    }

    async fn list_battery(&self, filter: &RecordFilter) -> StoreResult<Vec<BatteryStatus>> {
        sqlx::query_as::<_, BatteryStatus>(&format!(
            r#"
            SELECT {BATTERY_COLUMNS} FROM battery_status
            WHERE ($1::BIGINT IS NULL OR device_id = $1)
            ORDER BY recorded_at DESC, battery_id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.device_id)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn latest_battery(&self, device_id: i64) -> StoreResult<Option<BatteryStatus>> {
        let mut rows = self.list_battery(&RecordFilter::for_device(device_id, 1)).await?;
        Ok(rows.pop())
    }

    async fn insert_battery(&self, status: &NewBatteryStatus) -> StoreResult<BatteryStatus> {
        sqlx::query_as::<_, BatteryStatus>(&format!(
            r#"
            INSERT INTO battery_status (device_id, level, is_charging, recorded_at)
            VALUES ($1, $2, $3, COALESCE($4, NOW()))
            RETURNING {BATTERY_COLUMNS}
            "#
        ))
        .bind(status.device_id)
        .bind(status.level)
        .bind(status.is_charging)
        .bind(status.recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err(e, Some(status.device_id)))
    }

    async fn list_reflector(&self, filter: &RecordFilter) -> StoreResult<Vec<ReflectorStatus>> {
        sqlx::query_as::<_, ReflectorStatus>(&format!(
            r#"
            SELECT {REFLECTOR_COLUMNS} FROM night_reflector_status
            WHERE ($1::BIGINT IS NULL OR device_id = $1)
            ORDER BY recorded_at DESC, reflector_id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.device_id)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn latest_reflector(&self, device_id: i64) -> StoreResult<Option<ReflectorStatus>> {
        let mut rows = self.list_reflector(&RecordFilter::for_device(device_id, 1)).await?;
        Ok(rows.pop())
    }

    async fn insert_reflector(&self, status: &NewReflectorStatus) -> StoreResult<ReflectorStatus> {
        sqlx::query_as::<_, ReflectorStatus>(&format!(
            r#"
            INSERT INTO night_reflector_status (device_id, is_on, recorded_at)
            VALUES ($1, $2, COALESCE($3, NOW()))
            RETURNING {REFLECTOR_COLUMNS}
            "#
        ))
        .bind(status.device_id)
        .bind(status.is_on)
        .bind(status.recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err(e, Some(status.device_id)))
    }

    async fn list_alerts(&self, filter: &RecordFilter) -> StoreResult<Vec<Alert>> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alert
            WHERE ($1::BIGINT IS NULL OR device_id = $1)
              AND ($3 = FALSE OR acknowledged = FALSE)
            ORDER BY triggered_at DESC, alert_id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.device_id)
        .bind(filter.effective_limit())
        .bind(filter.unacknowledged_only)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn get_alert(&self, alert_id: i64) -> StoreResult<Option<Alert>> {
        sqlx::query_as::<_, Alert>(&format!("SELECT {ALERT_COLUMNS} FROM alert WHERE alert_id = $1"))
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            INSERT INTO alert (device_id, alert_type, message, triggered_at)
            VALUES ($1, $2, $3, COALESCE($4, NOW()))
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(alert.device_id)
        .bind(alert.alert_type.to_string())
        .bind(alert.message_or_default())
        .bind(alert.triggered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err(e, Some(alert.device_id)))
    }

    async fn acknowledge_alert(&self, alert_id: i64) -> StoreResult<Alert> {
        sqlx::query_as::<_, Alert>(&format!(
            "UPDATE alert SET acknowledged = TRUE WHERE alert_id = $1 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::not_found("alert", alert_id))
    }

    async fn delete_alert(&self, alert_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM alert WHERE alert_id = $1")
            .bind(alert_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("alert", alert_id));
        }
        Ok(())
    }

    async fn list_activity(&self, filter: &RecordFilter) -> StoreResult<Vec<ActivityLog>> {
        sqlx::query_as::<_, ActivityLog>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS} FROM activity_log
            WHERE ($1::BIGINT IS NULL OR device_id = $1)
            ORDER BY logged_at DESC, activity_id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.device_id)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn insert_activity(&self, activity: &NewActivity) -> StoreResult<ActivityLog> {
        sqlx::query_as::<_, ActivityLog>(&format!(
            r#"
            INSERT INTO activity_log (device_id, activity_type, description, logged_at)
            VALUES ($1, $2, $3, COALESCE($4, NOW()))
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(activity.device_id)
        .bind(activity.activity_type.to_string())
        .bind(&activity.description)
        .bind(activity.logged_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err(e, Some(activity.device_id)))
    }

    async fn dashboard_counts(&self, since: DateTime<Utc>) -> StoreResult<DashboardCounts> {
        sqlx::query_as::<_, DashboardCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM device) AS devices,
                (SELECT COUNT(*) FROM alert WHERE acknowledged = FALSE) AS unacknowledged_alerts,
                (SELECT COUNT(*) FROM location_log WHERE recorded_at >= $1) AS readings_today
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn device_round_trip_against_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let store = PgStore::connect(&DbConfig {
            url,
            max_connections: 2,
            run_migrations: true,
        })
        .await
        .unwrap();

        let serial = format!("GL-TEST-{}", uuid::Uuid::new_v4());
        let device = store.create_device(&NewDevice::with_serial(&serial)).await.unwrap();
        let found = store.find_device_by_serial(&serial).await.unwrap().unwrap();
        assert_eq!(found.device_id, device.device_id);
        store.delete_device(device.device_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn email_uniqueness_ignores_case() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let store = PgStore::connect(&DbConfig {
            url,
            max_connections: 2,
            run_migrations: true,
        })
        .await
        .unwrap();

        let local = uuid::Uuid::new_v4().simple().to_string();
        let user = |email: String| NewUser {
            email,
            full_name: "Maria Santos".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        };
        store.create_user(&user(format!("{local}@example.com"))).await.unwrap();
        let err = store
            .create_user(&user(format!("{}@EXAMPLE.com", local.to_uppercase())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
