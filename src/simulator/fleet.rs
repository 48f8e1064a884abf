//! Per-device simulation state and packet generation.

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    battery::{BatteryParams, BatterySimulator},
    movement::{GeofencedWalk, Position},
    schedule::NightSchedule,
};
use crate::{
    config::SimulatorConfig,
    domain::{ActivityType, AlertType, PacketActivity, PacketAlert, SensorPacket},
    geocode::{ResolvedPlace, ReverseGeocoder},
};

const RANDOM_ALERTS: [AlertType; 3] = [AlertType::Sos, AlertType::Fall, AlertType::Obstacle];

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub serial_number: String,
    pub position: Position,
    pub place: Option<ResolvedPlace>,
    pub battery: BatterySimulator,
    pub reflector_on: bool,
}

/// Every simulated cane plus the shared world they move in.
pub struct Fleet {
    cfg: SimulatorConfig,
    walk: GeofencedWalk,
    schedule: NightSchedule,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    rng: StdRng,
    devices: Vec<SimDevice>,
}

impl Fleet {
    pub fn new(
        cfg: SimulatorConfig,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let walk = GeofencedWalk::new(cfg.bounds, cfg.step_meters);
        let schedule = NightSchedule {
            start_hour: cfg.night_start_hour,
            end_hour: cfg.night_end_hour,
            utc_offset_hours: cfg.utc_offset_hours,
        };
        let params = BatteryParams {
            drain_per_tick: cfg.battery_drain_per_tick,
            charge_per_tick: cfg.battery_charge_per_tick,
            recharge_threshold: cfg.recharge_threshold,
            low_threshold: cfg.low_battery_threshold,
        };

        let devices = cfg
            .device_serials
            .iter()
            .map(|serial| SimDevice {
                serial_number: serial.clone(),
                position: walk.random_start(&mut rng),
                place: None,
                battery: BatterySimulator::new(params, rng.gen_range(60.0..=100.0)),
                reflector_on: false,
            })
            .collect();

        Self {
            cfg,
            walk,
            schedule,
            geocoder,
            rng,
            devices,
        }
    }

    pub fn serials(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.serial_number.as_str())
    }

    /// Advances every device one tick and returns their packets.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<SensorPacket> {
        let night = self.schedule.is_night(now);
        let mut packets = Vec::with_capacity(self.devices.len());

        for device in self.devices.iter_mut() {
            let battery = device.battery.tick();
            let previous = device.position;

            // docked while charging
            if !battery.charging {
                let (position, place) = locate(
                    &self.walk,
                    &mut self.rng,
                    self.geocoder.as_deref(),
                    self.cfg.target_city.as_deref(),
                    self.cfg.max_geocode_attempts,
                    previous,
                )
                .await;
                device.position = position;
                device.place = place;
            }

            let toggled = device.reflector_on != night;
            device.reflector_on = night;

            let alert = if battery.became_low {
                Some(AlertType::LowBattery)
            } else if self.rng.gen_bool(self.cfg.alert_probability.clamp(0.0, 1.0)) {
                Some(RANDOM_ALERTS[self.rng.gen_range(0..RANDOM_ALERTS.len())])
            } else {
                None
            };

            let activity = if toggled {
                PacketActivity {
                    activity_type: ActivityType::ReflectorToggled,
                    description: Some(
                        if night { "reflector switched on" } else { "reflector switched off" }.to_string(),
                    ),
                }
            } else if battery.charging {
                PacketActivity {
                    activity_type: ActivityType::Charging,
                    description: Some(format!("charging at {}%", battery.level)),
                }
            } else {
                PacketActivity {
                    activity_type: ActivityType::Walking,
                    description: Some(format!(
                        "walked {:.0} m",
                        previous.distance_m(&device.position)
                    )),
                }
            };

            if let Some(alert_type) = alert {
                debug!(serial = %device.serial_number, %alert_type, "simulated alert");
            }

            packets.push(SensorPacket {
                serial_number: device.serial_number.clone(),
                latitude: device.position.latitude,
                longitude: device.position.longitude,
                address: device.place.as_ref().map(ResolvedPlace::short_address),
                poi: device.place.as_ref().and_then(|p| p.poi.clone()),
                battery_level: battery.level,
                is_charging: battery.charging,
                reflector_on: device.reflector_on,
                alert: alert.map(|alert_type| PacketAlert {
                    alert_type,
                    message: None,
                }),
                activity: Some(activity),
                recorded_at: Some(now),
            });
        }

        packets
    }
}

/// Steps away from `from`, retrying until the geocoded locality matches
/// `target_city` or the attempts run out. The last in-box candidate wins
/// when nothing matches.
async fn locate(
    walk: &GeofencedWalk,
    rng: &mut StdRng,
    geocoder: Option<&dyn ReverseGeocoder>,
    target_city: Option<&str>,
    max_attempts: u32,
    from: Position,
) -> (Position, Option<ResolvedPlace>) {
    let Some(geocoder) = geocoder else {
        return (walk.step(rng, from), None);
    };

    let mut last = (from, None);
    for attempt in 1..=max_attempts.max(1) {
        let candidate = walk.step(rng, from);
        match geocoder.reverse(candidate.latitude, candidate.longitude).await {
            Ok(place) => {
                let accepted = target_city.map_or(true, |city| place.is_in_locality(city));
                if accepted {
                    return (candidate, Some(place));
                }
                debug!(attempt, locality = ?place.locality, "candidate outside target city");
                last = (candidate, Some(place));
            }
            Err(e) => {
                warn!(attempt, error = %e, "reverse geocoding failed");
                last = (candidate, None);
            }
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers "Pili" for the first `misses` calls, "Naga City" afterwards.
    struct ScriptedGeocoder {
        calls: AtomicUsize,
        misses: usize,
    }

    #[async_trait]
    impl ReverseGeocoder for ScriptedGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<ResolvedPlace, GeocodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let locality = if n < self.misses { "Pili" } else { "Naga City" };
            Ok(ResolvedPlace {
                display_name: format!("somewhere in {locality}"),
                poi: Some("Naga Cathedral".to_string()),
                road: Some("Elias Angeles Street".to_string()),
                locality: Some(locality.to_string()),
                region: Some("Bicol Region".to_string()),
                postcode: None,
                provider: "scripted".to_string(),
            })
        }
    }

    /// Resolves the first call, fails every call after it.
    struct OneShotGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReverseGeocoder for OneShotGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<ResolvedPlace, GeocodeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(GeocodeError::NoProviders);
            }
            Ok(ResolvedPlace {
                display_name: "Naga Metropolitan Cathedral".to_string(),
                poi: Some("Cathedral".to_string()),
                road: None,
                locality: Some("Naga".to_string()),
                region: None,
                postcode: None,
                provider: "scripted".to_string(),
            })
        }
    }

    fn cfg() -> SimulatorConfig {
        SimulatorConfig {
            device_serials: vec!["GL-0001".to_string(), "GL-0002".to_string()],
            alert_probability: 0.0,
            ..SimulatorConfig::default()
        }
    }

    fn noon_manila() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn packets_stay_inside_the_geofence() {
        let mut fleet = Fleet::new(cfg(), None, Some(3));
        let bounds = cfg().bounds;

        for _ in 0..50 {
            for packet in fleet.tick(noon_manila()).await {
                assert!(bounds.contains(packet.latitude, packet.longitude));
                assert!((0..=100).contains(&packet.battery_level));
                assert!(packet.address.is_none());
            }
        }
    }

    #[tokio::test]
    async fn retries_until_target_city_matches() {
        let geocoder = Arc::new(ScriptedGeocoder {
            calls: AtomicUsize::new(0),
            misses: 2,
        });
        let mut fleet = Fleet::new(
            SimulatorConfig {
                device_serials: vec!["GL-0001".to_string()],
                ..cfg()
            },
            Some(geocoder.clone()),
            Some(9),
        );

        let packets = fleet.tick(noon_manila()).await;
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(packets[0].poi.as_deref(), Some("Naga Cathedral"));
        assert_eq!(
            packets[0].address.as_deref(),
            Some("Naga Cathedral, Elias Angeles Street, Naga City")
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let geocoder = Arc::new(ScriptedGeocoder {
            calls: AtomicUsize::new(0),
            misses: usize::MAX,
        });
        let mut fleet = Fleet::new(
            SimulatorConfig {
                device_serials: vec!["GL-0001".to_string()],
                max_geocode_attempts: 4,
                ..cfg()
            },
            Some(geocoder.clone()),
            Some(9),
        );

        let packets = fleet.tick(noon_manila()).await;
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 4);
        assert!(packets[0].address.as_deref().unwrap().ends_with("Pili"));
    }

    #[tokio::test]
    async fn failed_lookup_drops_the_previous_address() {
        let geocoder = Arc::new(OneShotGeocoder {
            calls: AtomicUsize::new(0),
        });
        let mut fleet = Fleet::new(
            SimulatorConfig {
                device_serials: vec!["GL-0001".to_string()],
                max_geocode_attempts: 2,
                ..cfg()
            },
            Some(geocoder),
            Some(21),
        );

        let first = fleet.tick(noon_manila()).await.remove(0);
        assert_eq!(first.poi.as_deref(), Some("Cathedral"));
        assert!(!first.is_charging);

        let second = fleet.tick(noon_manila()).await.remove(0);
        assert_ne!(
            (second.latitude, second.longitude),
            (first.latitude, first.longitude)
        );
        assert!(second.poi.is_none());
        assert!(second.address.is_none());
    }

    #[tokio::test]
    async fn reflector_toggles_at_nightfall() {
        let mut fleet = Fleet::new(cfg(), None, Some(5));

        let day = fleet.tick(noon_manila()).await;
        assert!(day.iter().all(|p| !p.reflector_on));

        // 19:00 in Manila
        let evening = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        let night = fleet.tick(evening).await;
        for packet in night {
            assert!(packet.reflector_on);
            assert_eq!(
                packet.activity.unwrap().activity_type,
                ActivityType::ReflectorToggled
            );
        }
    }

    #[tokio::test]
    async fn low_battery_alert_when_crossing_threshold() {
        let mut fleet = Fleet::new(
            SimulatorConfig {
                device_serials: vec!["GL-0001".to_string()],
                battery_drain_per_tick: 10.0,
                ..cfg()
            },
            None,
            Some(11),
        );

        let mut low_alerts = 0;
        for _ in 0..10 {
            for packet in fleet.tick(noon_manila()).await {
                if let Some(alert) = packet.alert {
                    assert_eq!(alert.alert_type, AlertType::LowBattery);
                    low_alerts += 1;
                }
            }
        }
        assert_eq!(low_alerts, 1);
    }

    #[tokio::test]
    async fn same_seed_produces_same_packets() {
        let mut a = Fleet::new(cfg(), None, Some(77));
        let mut b = Fleet::new(cfg(), None, Some(77));
        assert_eq!(a.tick(noon_manila()).await, b.tick(noon_manila()).await);
    }
}
