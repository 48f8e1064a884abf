use anyhow::Result;
use clap::Parser;
use gabaylakad::{api, config::Config, repo, state::AppState, telemetry};
use std::path::PathBuf;
use telemetry::{init_tracing, LogFormat};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gabaylakad", version, about = "Smart-cane caregiver monitoring backend")]
struct Args {
    /// Base TOML config; GABAY__* environment variables override it
    #[arg(long, default_value = gabaylakad::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Keep everything in memory instead of Postgres
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(LogFormat::Json);

    let cfg = Config::load_from(&args.config)?;

    if cfg.has_placeholder_secret() {
        anyhow::bail!(
            "SECURITY ERROR: GABAY__AUTH__JWT_SECRET must be set to a random secret. \
            Generate one with: openssl rand -base64 32"
        );
    }

    let store = repo::open_store(&cfg, args.memory).await?;
    let state = AppState::new(cfg.clone(), store)?;
    let app = api::router(state);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server bound to 0.0.0.0; the API is reachable from the network");
    }

    info!(%addr, memory = args.memory, "starting GabayLakad");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
