use thiserror::Error;
use tracing::{debug, info};
use validator::{Validate, ValidationErrors};

use crate::domain::{
    Alert, BatteryStatus, LocationLog, LocationUpdate, NewActivity, NewAlert, NewBatteryStatus,
    NewLocation, NewReflectorStatus, ReflectorStatus, SensorPacket,
};
use crate::relay::LocationRelay;
use crate::repo::{Store, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid sensor packet: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("unknown device serial {0}")]
    UnknownDevice(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rows written for one packet.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub location: LocationLog,
    pub battery: BatteryStatus,
    pub reflector: ReflectorStatus,
    pub alert: Option<Alert>,
    /// Dashboard sockets that received the resulting `location_update`
    pub delivered: usize,
}

/// Persists a sensor packet and broadcasts the new position.
pub async fn record_packet(
    store: &dyn Store,
    relay: &LocationRelay,
    packet: &SensorPacket,
) -> Result<IngestOutcome, IngestError> {
    packet.validate()?;

    let device = store
        .find_device_by_serial(&packet.serial_number)
        .await?
        .ok_or_else(|| IngestError::UnknownDevice(packet.serial_number.clone()))?;
    let device_id = device.device_id;

    let location = store
        .insert_location(&NewLocation {
            device_id,
            latitude: packet.latitude,
            longitude: packet.longitude,
            address: packet.address.clone(),
            poi: packet.poi.clone(),
            recorded_at: packet.recorded_at,
        })
        .await?;

    let battery = store
        .insert_battery(&NewBatteryStatus {
            device_id,
            level: packet.battery_level,
            is_charging: packet.is_charging,
            recorded_at: packet.recorded_at,
        })
        .await?;

    let reflector = store
        .insert_reflector(&NewReflectorStatus {
            device_id,
            is_on: packet.reflector_on,
            recorded_at: packet.recorded_at,
        })
        .await?;

    let alert = match &packet.alert {
        Some(a) => {
            let alert = store
                .insert_alert(&NewAlert {
                    device_id,
                    alert_type: a.alert_type,
                    message: a.message.clone(),
                    triggered_at: packet.recorded_at,
                })
                .await?;
            info!(device_id, alert_type = %alert.alert_type, "alert raised");
            Some(alert)
        }
        None => None,
    };

    if let Some(activity) = &packet.activity {
        store
            .insert_activity(&NewActivity {
                device_id,
                activity_type: activity.activity_type,
                description: activity.description.clone(),
                logged_at: packet.recorded_at,
            })
            .await?;
    }

    let delivered = relay.publish(LocationUpdate::from_log(&location, Some(device.serial_number)));
    debug!(device_id, location_id = location.location_id, delivered, "sensor packet ingested");

    Ok(IngestOutcome {
        location,
        battery,
        reflector,
        alert,
        delivered,
    })
}
