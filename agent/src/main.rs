//! Matchday Agent - live fixture simulator daemon
//!
//! Connects to the match API, fast-forwards fixtures missed while the agent
//! was offline, then plays every due fixture live at one virtual minute per
//! tick until interrupted.
//! - Fixture discovery every `--sync-mins`
//! - Kick-off scan every `--scan-secs`
//! - Ctrl-C stops scheduling and exits

use anyhow::{Context, Result};
use clap::Parser;
use matchday_core::{Simulator, SimulatorConfig, DEFAULT_REGULATION_MINUTES};
use matchday_env::{HttpMatchStore, HttpStoreConfig, TokioContext, TOKEN_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Matchday live simulator
#[derive(Parser, Debug)]
#[command(name = "matchday-agent")]
#[command(about = "Simulate scheduled fixtures and push live results to the match API", long_about = None)]
struct Args {
    /// Base URL of the match API
    #[arg(long, env = "MATCHDAY_API_URL", default_value = "http://localhost:3000/api")]
    api_url: String,

    /// Simulator token for write access
    #[arg(long, env = "SIMULATOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Virtual minutes per fixture
    #[arg(long, default_value_t = DEFAULT_REGULATION_MINUTES)]
    regulation_minutes: u32,

    /// Wall-clock seconds per virtual minute
    #[arg(long, default_value = "60")]
    tick_secs: u64,

    /// Minutes between fixture synchronizations
    #[arg(long, default_value = "15")]
    sync_mins: u64,

    /// Seconds between kick-off scans
    #[arg(long, default_value = "60")]
    scan_secs: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig::default()
            .with_regulation_minutes(self.regulation_minutes)
            .with_tick_interval(Duration::from_secs(self.tick_secs))
            .with_sync_interval(Duration::from_secs(self.sync_mins * 60))
            .with_scan_interval(Duration::from_secs(self.scan_secs))
    }

    fn store_config(&self) -> HttpStoreConfig {
        HttpStoreConfig {
            base_url: self.api_url.clone(),
            token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Flips the shutdown channel on Ctrl-C.
fn spawn_shutdown_listener(stop: watch::Sender<bool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C, running until killed");
            // Dropping the sender would stop the simulator
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
        let _ = stop.send(true);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Matchday Agent v{}", env!("CARGO_PKG_VERSION"));

    if args.token.is_none() {
        warn!("no simulator token configured, {} header will be omitted", TOKEN_HEADER);
    }

    let store = HttpMatchStore::new(args.store_config()).context("failed to build match API client")?;
    let config = args.simulator_config();

    info!(
        api_url = %args.api_url,
        regulation_minutes = config.regulation_minutes,
        tick = ?config.tick_interval,
        sync = ?config.sync_interval,
        scan = ?config.scan_interval,
        "configuration loaded"
    );

    let mut simulator = Simulator::new(TokioContext::shared(), Arc::new(store), config)
        .context("invalid simulator configuration")?;

    let (stop, shutdown) = watch::channel(false);
    spawn_shutdown_listener(stop);

    simulator.start(shutdown).await;

    if simulator.active_count() > 0 {
        warn!(active = simulator.active_count(), "exiting with live fixtures unfinished");
    }

    Ok(())
}
