//! # Smart-cane telemetry simulator
//!
//! Drives one or more virtual canes through a geofenced area and delivers
//! their packets to the backend.
//!
//! ## Components
//!
//! - **Movement**: random walk reflected back into a bounding box
//! - **Battery**: linear drain, recharge from a threshold until full
//! - **Schedule**: night window for the reflector, wrapping midnight
//! - **Fleet**: per-device state, city validation through reverse geocoding,
//!   alert and activity generation
//! - **Sink**: delivery to the relay socket, the HTTP API or the store, with
//!   an ordered fallback chain
//!
//! ## Usage
//!
//! ```ignore
//! let fleet = Fleet::new(cfg.simulator.clone(), None, Some(42));
//! let sink = SocketSink::new(&cfg.simulator.socket_url, Duration::from_secs(5));
//! let mut sim = Simulator::new(fleet, Box::new(sink));
//! sim.register_devices().await;
//! sim.run(10, Duration::from_secs(5)).await;
//! ```

pub mod battery;
pub mod fleet;
pub mod movement;
pub mod schedule;
pub mod sink;

pub use battery::{BatteryParams, BatterySimulator, BatteryTick};
pub use fleet::{Fleet, SimDevice};
pub use movement::{GeofencedWalk, Position};
pub use schedule::NightSchedule;
pub use sink::{
    ApiSink, DbSink, FallbackSink, Registration, SinkMode, SocketSink, TelemetrySink,
};

use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{config::SimulatorConfig, repo::DynStore, telemetry};

/// Socket ack and HTTP request timeout.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the sink chain for `mode`. `store` is needed for `db` and is
/// optional for `auto`.
pub fn build_sink(
    mode: SinkMode,
    cfg: &SimulatorConfig,
    store: Option<DynStore>,
) -> anyhow::Result<Box<dyn TelemetrySink>> {
    let sink: Box<dyn TelemetrySink> = match mode {
        SinkMode::Socket => Box::new(SocketSink::new(&cfg.socket_url, DELIVERY_TIMEOUT)),
        SinkMode::Api => Box::new(ApiSink::new(&cfg.api_base_url, DELIVERY_TIMEOUT)?),
        SinkMode::Db => match store {
            Some(store) => Box::new(DbSink::new(store)),
            None => anyhow::bail!("db mode needs a store"),
        },
        SinkMode::Auto => {
            let mut chain: Vec<Box<dyn TelemetrySink>> = vec![
                Box::new(SocketSink::new(&cfg.socket_url, DELIVERY_TIMEOUT)),
                Box::new(ApiSink::new(&cfg.api_base_url, DELIVERY_TIMEOUT)?),
            ];
            if let Some(store) = store {
                chain.push(Box::new(DbSink::new(store)));
            }
            let chain = FallbackSink::new(chain);
            info!(sinks = ?chain.names(), "delivery chain");
            Box::new(chain)
        }
    };
    Ok(sink)
}

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct Simulator {
    fleet: Fleet,
    sink: Box<dyn TelemetrySink>,
}

impl Simulator {
    pub fn new(fleet: Fleet, sink: Box<dyn TelemetrySink>) -> Self {
        Self { fleet, sink }
    }

    /// Creates any missing devices. Failures are logged; the run continues.
    pub async fn register_devices(&self) {
        if !self.sink.can_register() {
            info!(sink = self.sink.name(), "sink cannot register devices, skipping");
            return;
        }
        for serial in self.fleet.serials() {
            match self.sink.register(serial).await {
                Ok(Registration::Created) => info!(serial, "device registered"),
                Ok(Registration::Existing) => info!(serial, "device already registered"),
                Err(e) => warn!(serial, error = %e, "device registration failed"),
            }
        }
    }

    pub async fn tick_once(&mut self) -> TickReport {
        let mut report = TickReport::default();
        for packet in self.fleet.tick(Utc::now()).await {
            match self.sink.send(&packet).await {
                Ok(()) => {
                    report.sent += 1;
                    info!(
                        serial = %packet.serial_number,
                        lat = packet.latitude,
                        lon = packet.longitude,
                        battery = packet.battery_level,
                        address = packet.address.as_deref().unwrap_or("-"),
                        "packet sent"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(serial = %packet.serial_number, error = %e, "packet dropped");
                }
            }
        }
        report
    }

    /// Runs `ticks` ticks (0 = until shutdown), `interval` apart.
    pub async fn run(&mut self, ticks: u64, interval: Duration) -> TickReport {
        let mut total = TickReport::default();
        let mut timer = tokio::time::interval(interval);
        let shutdown = telemetry::shutdown_signal();
        tokio::pin!(shutdown);

        let mut done = 0u64;
        while ticks == 0 || done < ticks {
            tokio::select! {
                _ = timer.tick() => {}
                _ = &mut shutdown => {
                    info!("simulator interrupted");
                    break;
                }
            }
            let report = self.tick_once().await;
            total.sent += report.sent;
            total.failed += report.failed;
            done += 1;
        }

        info!(ticks = done, sent = total.sent, failed = total.failed, "simulator finished");
        total
    }
}
