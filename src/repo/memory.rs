use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{RecordFilter, Store, StoreError, StoreResult};
use crate::domain::{
    ActivityLog, Alert, BatteryStatus, DashboardCounts, Device, LocationLog, NewActivity, NewAlert,
    NewBatteryStatus, NewDevice, NewLocation, NewReflectorStatus, NewUser, ReflectorStatus,
    UpdateDevice, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    devices: Vec<Device>,
    locations: Vec<LocationLog>,
    battery: Vec<BatteryStatus>,
    reflector: Vec<ReflectorStatus>,
    alerts: Vec<Alert>,
    activity: Vec<ActivityLog>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_device(&self, device_id: i64) -> StoreResult<()> {
        if self.devices.iter().any(|d| d.device_id == device_id) {
            Ok(())
        } else {
            Err(StoreError::not_found("device", device_id))
        }
    }
}

/// Ordering key shared by listings and `latest_*`: timestamp, then id.
type Recency = (DateTime<Utc>, i64);

/// Filtered rows ordered by `(timestamp, id)` descending, like the
/// `ORDER BY ... DESC` in the Postgres queries.
fn newest<T: Clone>(
    rows: &[T],
    filter: &RecordFilter,
    device_of: impl Fn(&T) -> i64,
    recency: impl Fn(&T) -> Recency,
    extra: impl Fn(&T) -> bool,
) -> Vec<T> {
    let mut matching: Vec<&T> = rows
        .iter()
        .filter(|row| filter.device_id.map_or(true, |id| device_of(row) == id))
        .filter(|row| extra(row))
        .collect();
    matching.sort_unstable_by_key(|row| std::cmp::Reverse(recency(row)));
    matching
        .into_iter()
        .take(filter.effective_limit() as usize)
        .cloned()
        .collect()
}

fn latest<T: Clone>(
    rows: &[T],
    device_id: i64,
    device_of: impl Fn(&T) -> i64,
    recency: impl Fn(&T) -> Recency,
) -> Option<T> {
    rows.iter()
        .filter(|row| device_of(row) == device_id)
        .max_by_key(|row| recency(row))
        .cloned()
}

fn location_recency(r: &LocationLog) -> Recency {
    (r.recorded_at, r.location_id)
}

fn battery_recency(r: &BatteryStatus) -> Recency {
    (r.recorded_at, r.battery_id)
}

fn reflector_recency(r: &ReflectorStatus) -> Recency {
    (r.recorded_at, r.reflector_id)
}

/// In-process store with the same semantics as the Postgres schema,
/// including cascade deletes and the unique serial/e-mail constraints.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut t = self.tables.write();
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }
        let row = User {
            user_id: t.next_id(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            password_hash: user.password_hash.clone(),
            created_at: Utc::now(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read();
        Ok(t.users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let t = self.tables.read();
        Ok(t.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn list_devices(&self) -> StoreResult<Vec<Device>> {
        Ok(self.tables.read().devices.clone())
    }

    async fn get_device(&self, device_id: i64) -> StoreResult<Option<Device>> {
        let t = self.tables.read();
        Ok(t.devices.iter().find(|d| d.device_id == device_id).cloned())
    }

    async fn find_device_by_serial(&self, serial: &str) -> StoreResult<Option<Device>> {
        let t = self.tables.read();
        Ok(t.devices.iter().find(|d| d.serial_number == serial).cloned())
    }

    async fn create_device(&self, device: &NewDevice) -> StoreResult<Device> {
        let mut t = self.tables.write();
        if t.devices.iter().any(|d| d.serial_number == device.serial_number) {
            return Err(StoreError::Conflict(format!(
                "serial number {} already registered",
                device.serial_number
            )));
        }
        let row = Device {
            device_id: t.next_id(),
            serial_number: device.serial_number.clone(),
            device_name: device.device_name.clone(),
            user_id: device.user_id,
            registered_at: Utc::now(),
        };
        t.devices.push(row.clone());
        Ok(row)
    }

    async fn update_device(&self, device_id: i64, update: &UpdateDevice) -> StoreResult<Device> {
        let mut t = self.tables.write();
        if let Some(serial) = &update.serial_number {
            if t.devices.iter().any(|d| &d.serial_number == serial && d.device_id != device_id) {
                return Err(StoreError::Conflict(format!("serial number {serial} already registered")));
            }
        }
        let device = t
            .devices
            .iter_mut()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| StoreError::not_found("device", device_id))?;
        update.apply(device);
        Ok(device.clone())
    }

    async fn delete_device(&self, device_id: i64) -> StoreResult<()> {
        let mut t = self.tables.write();
        t.require_device(device_id)?;
        t.devices.retain(|d| d.device_id != device_id);
        t.locations.retain(|r| r.device_id != device_id);
        t.battery.retain(|r| r.device_id != device_id);
        t.reflector.retain(|r| r.device_id != device_id);
        t.alerts.retain(|r| r.device_id != device_id);
        t.activity.retain(|r| r.device_id != device_id);
        Ok(())
    }

    async fn list_locations(&self, filter: &RecordFilter) -> StoreResult<Vec<LocationLog>> {
        Ok(newest(&self.tables.read().locations, filter, |r| r.device_id, location_recency, |_| true))
    }

    async fn latest_location(&self, device_id: i64) -> StoreResult<Option<LocationLog>> {
        Ok(latest(&self.tables.read().locations, device_id, |r| r.device_id, location_recency))
    }

    async fn insert_location(&self, location: &NewLocation) -> StoreResult<LocationLog> {
        let mut t = self.tables.write();
        t.require_device(location.device_id)?;
        let row = LocationLog {
            location_id: t.next_id(),
            device_id: location.device_id,
            latitude: location.latitude,
            longitude: location.longitude,
            address: location.address.clone(),
            poi: location.poi.clone(),
            recorded_at: location.recorded_at.unwrap_or_else(Utc::now),
        };
        t.locations.push(row.clone());
        Ok(row)
    }

    async fn list_battery(&self, filter: &RecordFilter) -> StoreResult<Vec<BatteryStatus>> {
        Ok(newest(&self.tables.read().battery, filter, |r| r.device_id, battery_recency, |_| true))
    }

    async fn latest_battery(&self, device_id: i64) -> StoreResult<Option<BatteryStatus>> {
        Ok(latest(&self.tables.read().battery, device_id, |r| r.device_id, battery_recency))
    }

    async fn insert_battery(&self, status: &NewBatteryStatus) -> StoreResult<BatteryStatus> {
        let mut t = self.tables.write();
        t.require_device(status.device_id)?;
        let row = BatteryStatus {
            battery_id: t.next_id(),
            device_id: status.device_id,
            level: status.level,
            is_charging: status.is_charging,
            recorded_at: status.recorded_at.unwrap_or_else(Utc::now),
        };
        t.battery.push(row.clone());
        Ok(row)
    }

    async fn list_reflector(&self, filter: &RecordFilter) -> StoreResult<Vec<ReflectorStatus>> {
        Ok(newest(&self.tables.read().reflector, filter, |r| r.device_id, reflector_recency, |_| true))
    }

    async fn latest_reflector(&self, device_id: i64) -> StoreResult<Option<ReflectorStatus>> {
        Ok(latest(&self.tables.read().reflector, device_id, |r| r.device_id, reflector_recency))
    }

    async fn insert_reflector(&self, status: &NewReflectorStatus) -> StoreResult<ReflectorStatus> {
        let mut t = self.tables.write();
        t.require_device(status.device_id)?;
        let row = ReflectorStatus {
            reflector_id: t.next_id(),
            device_id: status.device_id,
            is_on: status.is_on,
            recorded_at: status.recorded_at.unwrap_or_else(Utc::now),
        };
        t.reflector.push(row.clone());
        Ok(row)
    }

    async fn list_alerts(&self, filter: &RecordFilter) -> StoreResult<Vec<Alert>> {
        let unack_only = filter.unacknowledged_only;
        Ok(newest(
            &self.tables.read().alerts,
            filter,
            |r| r.device_id,
            |r| (r.triggered_at, r.alert_id),
            |r| !unack_only || !r.acknowledged,
        ))
    }

    async fn get_alert(&self, alert_id: i64) -> StoreResult<Option<Alert>> {
        let t = self.tables.read();
        Ok(t.alerts.iter().find(|a| a.alert_id == alert_id).cloned())
    }

    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert> {
        let mut t = self.tables.write();
        t.require_device(alert.device_id)?;
        let row = Alert {
            alert_id: t.next_id(),
            device_id: alert.device_id,
            alert_type: alert.alert_type,
            message: alert.message_or_default(),
            acknowledged: false,
            triggered_at: alert.triggered_at.unwrap_or_else(Utc::now),
        };
        t.alerts.push(row.clone());
        Ok(row)
    }

    async fn acknowledge_alert(&self, alert_id: i64) -> StoreResult<Alert> {
        let mut t = self.tables.write();
        let alert = t
            .alerts
            .iter_mut()
            .find(|a| a.alert_id == alert_id)
            .ok_or_else(|| StoreError::not_found("alert", alert_id))?;
        alert.acknowledged = true;
        Ok(alert.clone())
    }

    async fn delete_alert(&self, alert_id: i64) -> StoreResult<()> {
        let mut t = self.tables.write();
        let before = t.alerts.len();
        t.alerts.retain(|a| a.alert_id != alert_id);
        if t.alerts.len() == before {
            return Err(StoreError::not_found("alert", alert_id));
        }
        Ok(())
    }

    async fn list_activity(&self, filter: &RecordFilter) -> StoreResult<Vec<ActivityLog>> {
        Ok(newest(
            &self.tables.read().activity,
            filter,
            |r| r.device_id,
            |r| (r.logged_at, r.activity_id),
            |_| true,
        ))
    }

    async fn insert_activity(&self, activity: &NewActivity) -> StoreResult<ActivityLog> {
        let mut t = self.tables.write();
        t.require_device(activity.device_id)?;
        let row = ActivityLog {
            activity_id: t.next_id(),
            device_id: activity.device_id,
            activity_type: activity.activity_type,
            description: activity.description.clone(),
            logged_at: activity.logged_at.unwrap_or_else(Utc::now),
        };
        t.activity.push(row.clone());
        Ok(row)
    }

    async fn dashboard_counts(&self, since: DateTime<Utc>) -> StoreResult<DashboardCounts> {
        let t = self.tables.read();
        Ok(DashboardCounts {
            devices: t.devices.len() as i64,
            unacknowledged_alerts: t.alerts.iter().filter(|a| !a.acknowledged).count() as i64,
            readings_today: t.locations.iter().filter(|l| l.recorded_at >= since).count() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertType;

    fn location(device_id: i64, lat: f64) -> NewLocation {
        NewLocation {
            device_id,
            latitude: lat,
            longitude: 123.19,
            address: None,
            poi: None,
            recorded_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_serial_conflicts() {
        let store = MemoryStore::new();
        store.create_device(&NewDevice::with_serial("GL-1")).await.unwrap();
        let err = store.create_device(&NewDevice::with_serial("GL-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn email_uniqueness_ignores_case() {
        let store = MemoryStore::new();
        let user = |email: &str| NewUser {
            email: email.to_string(),
            full_name: "Maria Santos".to_string(),
            password_hash: "hash".to_string(),
        };
        store.create_user(&user("maria@example.com")).await.unwrap();
        let err = store.create_user(&user("Maria@Example.COM")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn telemetry_for_unknown_device_is_not_found() {
        let store = MemoryStore::new();
        let err = store.insert_location(&location(42, 13.6)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "device", .. }));
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_filtered() {
        let store = MemoryStore::new();
        let a = store.create_device(&NewDevice::with_serial("GL-A")).await.unwrap();
        let b = store.create_device(&NewDevice::with_serial("GL-B")).await.unwrap();
        for i in 0..5 {
            store.insert_location(&location(a.device_id, 13.60 + i as f64 * 0.001)).await.unwrap();
        }
        store.insert_location(&location(b.device_id, 13.64)).await.unwrap();

        let rows = store
            .list_locations(&RecordFilter::for_device(a.device_id, 3))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.device_id == a.device_id));
        assert!(rows[0].location_id > rows[1].location_id);

        let latest = store.latest_location(a.device_id).await.unwrap().unwrap();
        assert_eq!(latest.location_id, rows[0].location_id);
    }

    #[tokio::test]
    async fn backdated_rows_do_not_become_latest() {
        let store = MemoryStore::new();
        let d = store.create_device(&NewDevice::with_serial("GL-E")).await.unwrap();
        let fresh = store.insert_location(&location(d.device_id, 13.61)).await.unwrap();
        let old = store
            .insert_location(&NewLocation {
                recorded_at: Some(Utc::now() - chrono::Duration::days(1)),
                ..location(d.device_id, 13.62)
            })
            .await
            .unwrap();
        assert!(old.location_id > fresh.location_id);

        let latest = store.latest_location(d.device_id).await.unwrap().unwrap();
        assert_eq!(latest.location_id, fresh.location_id);

        let rows = store.list_locations(&RecordFilter::default()).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.location_id).collect();
        assert_eq!(ids, vec![fresh.location_id, old.location_id]);
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_id() {
        let store = MemoryStore::new();
        let d = store.create_device(&NewDevice::with_serial("GL-F")).await.unwrap();
        let at = Utc::now();
        let mut ids = Vec::new();
        for level in [80, 79] {
            let row = store
                .insert_battery(&NewBatteryStatus {
                    device_id: d.device_id,
                    level,
                    is_charging: false,
                    recorded_at: Some(at),
                })
                .await
                .unwrap();
            ids.push(row.battery_id);
        }

        let latest = store.latest_battery(d.device_id).await.unwrap().unwrap();
        assert_eq!(latest.battery_id, ids[1]);
        assert_eq!(latest.level, 79);
    }

    #[tokio::test]
    async fn deleting_a_device_cascades() {
        let store = MemoryStore::new();
        let d = store.create_device(&NewDevice::with_serial("GL-C")).await.unwrap();
        store.insert_location(&location(d.device_id, 13.61)).await.unwrap();
        store
            .insert_alert(&NewAlert {
                device_id: d.device_id,
                alert_type: AlertType::Sos,
                message: None,
                triggered_at: None,
            })
            .await
            .unwrap();

        store.delete_device(d.device_id).await.unwrap();

        assert!(store.list_locations(&RecordFilter::default()).await.unwrap().is_empty());
        assert!(store.list_alerts(&RecordFilter::default()).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_device(d.device_id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn acknowledged_alerts_drop_out_of_unacknowledged_listing() {
        let store = MemoryStore::new();
        let d = store.create_device(&NewDevice::with_serial("GL-D")).await.unwrap();
        let alert = store
            .insert_alert(&NewAlert {
                device_id: d.device_id,
                alert_type: AlertType::Obstacle,
                message: None,
                triggered_at: None,
            })
            .await
            .unwrap();
        assert_eq!(alert.message, "Obstacle detected ahead");

        let acked = store.acknowledge_alert(alert.alert_id).await.unwrap();
        assert!(acked.acknowledged);

        let filter = RecordFilter {
            unacknowledged_only: true,
            ..Default::default()
        };
        assert!(store.list_alerts(&filter).await.unwrap().is_empty());
        let counts = store.dashboard_counts(Utc::now()).await.unwrap();
        assert_eq!(counts.unacknowledged_alerts, 0);
        assert_eq!(counts.devices, 1);
    }
}
