//! ---
//! phs_section: "01-core-functionality"
//! phs_subsection: "binary"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Binary entrypoint for the pharos daemon."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::time::sleep;
use tracing::{info, warn};

use pharos_common::config::AppConfig;
use pharos_common::logging::init_tracing;
use pharos_core::{CommandError, DeviceKeys, DeviceSupervisor};
use pharos_store::{MemoryStore, SharedGateway};

mod sim;

use sim::SimulatedEndpoint;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "pharos daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the monitored device id")]
    device: Option<String>,

    #[arg(long, help = "Force-enable the simulated endpoint")]
    simulate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the supervision loop")]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/pharosd.toml"));
    candidates.push(PathBuf::from("configs/pharosd.dev.toml"));

    let mut config = AppConfig::load(&candidates)?;
    if let Some(device) = cli.device {
        config.device.device_id = device;
    }
    if cli.simulate {
        config.simulation.enabled = true;
    }
    config.validate()?;
    init_tracing("pharosd", &config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway: SharedGateway = store.clone();
    let keys = DeviceKeys::new(&config.device.device_id);

    // The connection is established off the startup path; the readiness gate
    // holds everything back until it reports initialized.
    let connecting = store.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(250)).await;
        connecting.connect();
    });

    let simulation = config
        .simulation
        .enabled
        .then(|| SimulatedEndpoint::new(store.clone(), keys.clone(), config.simulation.clone()).start());
    if simulation.is_none() {
        warn!("no simulated endpoint configured; expecting a real device behind the store");
    }

    let supervisor = DeviceSupervisor::start(gateway, &config).await?;
    info!(device = %supervisor.device_id(), "pharosd running; ctrl-c to stop");

    let mut verdicts = supervisor.monitor().watch();
    let mut toggle = config
        .simulation
        .toggle_interval
        .map(tokio::time::interval);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            changed = verdicts.changed() => {
                if changed.is_err() {
                    break;
                }
                let verdict = verdicts.borrow().clone();
                info!(
                    state = %verdict.state,
                    last_activity = verdict.last_activity().as_deref().unwrap_or("never"),
                    "liveness verdict"
                );
            }
            _ = tick_toggle(&mut toggle) => {
                let next = !supervisor.reconciler().state().observed;
                match supervisor.reconciler().set(next).await {
                    Ok(()) => info!(desired = next, "toggle command submitted"),
                    Err(err @ CommandError::EndpointUnreachable { .. }) => {
                        info!(error = %err, "toggle skipped");
                    }
                    Err(err) => warn!(error = %err, "toggle command failed"),
                }
            }
        }
    }

    supervisor.shutdown().await;
    if let Some(sim) = simulation {
        sim.stop().await;
    }
    info!("pharosd stopped");
    Ok(())
}

async fn tick_toggle(toggle: &mut Option<tokio::time::Interval>) {
    match toggle {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
