#![forbid(unsafe_code)]

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use muninn_files_lib::config::{load_from_path, validate_config};
use muninn_files_lib::{server, Config, ServerState};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Concurrent file server with per-client rate limiting"
)]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to serve
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Hold every request for the configured delay so overlap is visible
    #[arg(long)]
    simulate: bool,

    /// Use the racy read-then-write counter update
    #[arg(long = "unsafe")]
    unsafe_counters: bool,

    /// Requests allowed per client per second
    #[arg(long, value_name = "RATE")]
    max_rate: Option<f64>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = match build_config(cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        ?config.listen,
        root = %config.root_dir.display(),
        simulate = config.simulate_work,
        unsafe_counters = config.unsafe_counters,
        rate = config.max_rate,
        "configuration loaded"
    );

    let config = Arc::new(config);
    let state = ServerState::from_config(&config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_on_signal(shutdown_tx));

    if let Err(err) = server::run(config, state.clone(), shutdown_rx).await {
        error!(%err, "server exited with error");
        std::process::exit(1);
    }

    let snapshot = state.stats.snapshot();
    info!(
        total = snapshot.total,
        denied = snapshot.denied,
        errors = snapshot.errors,
        "server stopped"
    );
}

/// Configuration file first, command-line flags on top.
fn build_config(cli: Cli) -> muninn_files_lib::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_from_path(path)?,
        None => Config::default(),
    };
    if let Some(root) = cli.root {
        config.root_dir = root;
    }
    if let Some(host) = cli.host {
        config.listen.set_ip(host);
    }
    if let Some(port) = cli.port {
        config.listen.set_port(port);
    }
    if cli.simulate {
        config.simulate_work = true;
    }
    if cli.unsafe_counters {
        config.unsafe_counters = true;
    }
    if let Some(rate) = cli.max_rate {
        config.max_rate = rate;
    }
    validate_config(&config)?;
    Ok(config)
}

async fn shutdown_on_signal(shutdown_tx: watch::Sender<bool>) {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to set up SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to set up SIGINT handler");
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
    let _ = shutdown_tx.send(true);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
