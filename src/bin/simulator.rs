use anyhow::Result;
use clap::Parser;
use gabaylakad::{
    config::{Config, DEFAULT_CONFIG_PATH},
    geocode::{GeocodingClient, ReverseGeocoder},
    repo,
    simulator::{build_sink, Fleet, Simulator, SinkMode},
    telemetry::{init_tracing, LogFormat},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gabaylakad-sim", version, about = "Simulates smart canes reporting to GabayLakad")]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Number of ticks to run; 0 runs until interrupted
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Seconds between ticks; defaults to simulator.tick_seconds
    #[arg(long)]
    interval_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = SinkMode::Auto)]
    mode: SinkMode,

    /// Seed for a reproducible walk
    #[arg(long)]
    seed: Option<u64>,

    /// Use an in-memory store for the db sink (dry run)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(LogFormat::Compact);

    let cfg = Config::load_from(&args.config)?;
    let sim_cfg = cfg.simulator.clone();

    let store = match args.mode {
        SinkMode::Db => Some(repo::open_store(&cfg, args.memory).await?),
        SinkMode::Auto => match repo::open_store(&cfg, args.memory).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "database unavailable, chain continues without the db sink");
                None
            }
        },
        SinkMode::Socket | SinkMode::Api => None,
    };

    let geocoder: Option<Arc<dyn ReverseGeocoder>> = if cfg.geocoding.enabled {
        Some(Arc::new(GeocodingClient::from_config(&cfg.geocoding)?))
    } else {
        info!("geocoding disabled, city validation skipped");
        None
    };

    let sink = build_sink(args.mode, &sim_cfg, store)?;
    let interval = Duration::from_secs(args.interval_secs.unwrap_or(sim_cfg.tick_seconds).max(1));
    info!(
        mode = %args.mode,
        devices = sim_cfg.device_serials.len(),
        ticks = args.ticks,
        interval_secs = interval.as_secs(),
        "starting simulator"
    );

    let mut sim = Simulator::new(Fleet::new(sim_cfg, geocoder, args.seed), sink);
    sim.register_devices().await;
    let report = sim.run(args.ticks, interval).await;

    if report.sent == 0 && report.failed > 0 {
        anyhow::bail!("no packet was delivered ({} failed)", report.failed);
    }
    Ok(())
}
