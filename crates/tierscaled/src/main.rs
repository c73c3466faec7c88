//! tierscaled — the tierscale daemon.
//!
//! Runs all three control loop roles in one process against the
//! simulated cloud until Ctrl-C, then prints the cost report as JSON.
//!
//! # Usage
//!
//! ```text
//! tierscaled run --config tierscale.toml --interval 10s --receive-timeout 10s
//! tierscaled check-config --config tierscale.toml
//! tierscaled default-config > tierscale.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tierscale_core::{Config, Settings};
use tierscale_executor::system_clock;
use tierscaled::{SimulatedCloud, spawn_control_loop};

const DEFAULT_FILTER: &str = "info,tierscaled=debug,tierscale=debug";

#[derive(Parser)]
#[command(name = "tierscaled", about = "tierscale autoscaling daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run {
        /// Path to tierscale.toml. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the monitor interval (e.g. "30s").
        #[arg(long)]
        interval: Option<String>,

        /// Override how long the decider and executor wait for a message.
        #[arg(long)]
        receive_timeout: Option<String>,

        /// Seed for the simulated telemetry.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a config file and print the resolved settings.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the built-in configuration as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            interval,
            receive_timeout,
            seed,
        } => {
            let settings = load_settings(config.as_deref(), interval, receive_timeout)?;
            run(settings, seed.unwrap_or_else(rand::random)).await
        }
        Command::CheckConfig { config } => check_config(&config),
        Command::DefaultConfig => {
            print!("{}", Config::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_settings(
    path: Option<&Path>,
    interval: Option<String>,
    receive_timeout: Option<String>,
) -> anyhow::Result<Settings> {
    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(interval) = interval {
        config.control.interval = interval;
    }
    if let Some(timeout) = receive_timeout {
        config.control.receive_timeout = timeout;
    }
    Ok(config.resolve()?)
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let settings = Config::load(path)?;
    info!(
        interval = ?settings.interval,
        receive_timeout = ?settings.receive_timeout,
        lookback = ?settings.lookback,
        "config ok"
    );
    for tier in settings.tiers.iter() {
        info!(tier = %tier.name, hourly_rate = tier.hourly_rate, memory_gb = tier.memory_gb, "tier");
    }
    for inst in &settings.instances {
        info!(instance = %inst.id, initial_tier = %settings.tiers.name(inst.initial_tier), "instance");
    }
    Ok(())
}

async fn run(settings: Settings, seed: u64) -> anyhow::Result<()> {
    info!(seed, "tierscale daemon starting with simulated cloud");

    let cloud = Arc::new(SimulatedCloud::new(&settings, seed));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let control =
        spawn_control_loop(&settings, cloud.clone(), cloud, system_clock(), shutdown_rx).await?;

    // Graceful shutdown on Ctrl-C.
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl-C, shutting down"),
    }
    let _ = shutdown_tx.send(true);

    let report = control.wait().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(total_cost = report.total_cost, "tierscale daemon stopped");
    Ok(())
}
