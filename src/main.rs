use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lora_mac_engine::config::Config;
use lora_mac_engine::sim::{run_device, DeviceReport, SimKeyStore, SimulatedDevice, SimulationEnv};

#[derive(Parser)]
#[command(name = "lora-mac-engine")]
#[command(about = "Run simulated LoRaWAN devices against the MAC command engine")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Uplink/downlink exchanges per device (overrides the config)
    #[arg(short = 'n', long)]
    cycles: Option<u32>,

    /// Print the final device records as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("lora-mac-engine v{}", env!("CARGO_PKG_VERSION"));

    let phy = config.band()?;
    let frequency_plan = config.frequency_plan()?;
    let cycles = cli.cycles.unwrap_or(config.simulation.cycles);

    let mut devices = Vec::with_capacity(config.devices.len());
    for device in &config.devices {
        let dev = device.end_device(phy, &frequency_plan, &config.defaults)?;
        let radio = SimulatedDevice::new(&dev, device.radio.clone());
        devices.push((dev, radio));
    }

    let env = Arc::new(SimulationEnv {
        phy,
        frequency_plan,
        defaults: config.defaults,
        relay_keys: Arc::new(SimKeyStore::from_hex(&config.simulation.relay_root_key)?),
        start: Utc::now(),
        uplink_interval: Duration::seconds(config.simulation.uplink_interval_secs),
    });
    info!(
        "Simulating {} devices on {} for {} cycles",
        devices.len(),
        phy.id,
        cycles
    );

    // One task per device
    let handles: Vec<_> = devices
        .into_iter()
        .map(|(dev, radio)| {
            let device_id = dev.device_id.clone();
            let env = env.clone();
            (device_id, tokio::spawn(run_device(env, dev, radio, cycles)))
        })
        .collect();

    let mut reports: Vec<DeviceReport> = Vec::new();
    for (device_id, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => error!("Device {} failed: {}", device_id, e),
            Err(e) => error!("Device task {} panicked: {}", device_id, e),
        }
    }

    for report in &reports {
        let current = &report.device.mac_state.current_parameters;
        info!(
            "{}: DR{} power {} NbTrans {} ({} uplinks, {} incomplete downlinks, converged: {})",
            report.device.device_id,
            current.data_rate_index,
            current.tx_power_index,
            current.nb_trans,
            report.uplinks,
            report.incomplete_downlinks,
            report.converged
        );
        for (event, count) in &report.events {
            info!("  {} x {}", count, event);
        }
    }
    if reports.iter().any(|r| !r.converged) {
        warn!("Not every device converged; try more cycles");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}
