//! meshcoordd - mesh network coordinator daemon
//!
//! Runs the coordinator loop against the simulated radio stack until
//! Ctrl+C, logging device and commissioning events as they happen.

use anyhow::{Context, Result};
use clap::Parser;
use meshcoord_stack::SimulatedStack;
use meshcoordd::config::Config;
use meshcoordd::simulation;
use meshcoordd::{Coordinator, MonotonicClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "meshcoordd")]
#[command(about = "Mesh network coordinator daemon")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "MESHCOORD_CONFIG")]
    config: Option<PathBuf>,

    /// Write a default configuration and exit
    #[arg(long)]
    init: bool,

    /// Log filter, overrides the configured level and RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of simulated devices to join
    #[arg(short, long, default_value = "4")]
    simulate: usize,

    /// Milliseconds between simulated joins
    #[arg(long, default_value = "1500")]
    join_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        let config = Config::create_default(args.config)?;
        println!(
            "Created default configuration at {}",
            config.config_path().display()
        );
        return Ok(());
    }

    let config = Config::load(args.config)?;
    meshcoordd::logging::init(&config.logging, args.log_level.as_deref())?;

    info!("Starting meshcoordd");
    info!("Configuration: {}", config.config_path().display());

    let stack = Arc::new(SimulatedStack::default());
    let mut coordinator = Coordinator::new(
        stack.clone(),
        config.coordinator.clone(),
        Arc::new(MonotonicClock::new()),
    )
    .context("Failed to create coordinator")?;

    coordinator.on_device_added(|device| {
        let features: Vec<&str> = device.features().iter().map(|f| f.as_str()).collect();
        info!(
            "Device added: {} ({}) features [{}]",
            device.short_addr,
            device.ieee_addr,
            features.join(", ")
        );
    });
    coordinator.on_device_updated(|device| {
        info!("Device updated: {} ({})", device.short_addr, device.ieee_addr);
    });
    coordinator.on_commissioning_event(|event| match serde_json::to_string(event) {
        Ok(json) => debug!("Commissioning event: {}", json),
        Err(e) => warn!("Failed to encode commissioning event: {}", e),
    });

    coordinator
        .start(config.coordinator.network.form_network)
        .await
        .context("Failed to start network")?;
    coordinator
        .permit_join(config.runtime.permit_join_s, None)
        .await
        .context("Failed to open network for joining")?;

    let network = coordinator.network_info();
    info!(
        "Network up: channel {:?}, PAN {:?}",
        network.channel,
        network.pan_id.map(|p| format!("{:#06x}", p))
    );

    let joiner = simulation::spawn_joiner(
        stack.clone(),
        args.simulate,
        Duration::from_millis(args.join_interval_ms),
    );

    let mut interval =
        tokio::time::interval(Duration::from_millis(config.runtime.tick_interval_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Coordinator running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = coordinator.tick(config.runtime.max_items_per_tick).await;
                if report.discovery.processed > 0 {
                    debug!(
                        "Tick: {} attempted, {} ok, {} pending",
                        report.discovery.processed,
                        report.discovery.success,
                        report.discovery.queue_depth
                    );
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    joiner.abort();

    let stats = coordinator.stats();
    info!(
        "Discovery: {} succeeded, {} failed, {} abandoned",
        stats.success, stats.failed, stats.abandoned
    );

    let snapshot = coordinator
        .registry_snapshot()
        .to_json()
        .context("Failed to encode registry snapshot")?;
    println!("{}", snapshot);

    Ok(())
}
