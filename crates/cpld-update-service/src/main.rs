//! CPLD update service daemon (cpld-updated)

#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::Parser;
use cpld_firmware_update::{ActiveImageWatch, ActiveLink, UpdaterConfig, VersionRepository};
use cpld_update_service::{
    DEFAULT_LOG_FILTER, ServiceEvent, SystemctlUnitManager, TracingBusPublisher, UpdaterDaemon,
    forward_control_lines,
};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cpld-updated")]
#[command(about = "Manage CPLD firmware versions and their activation")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding installed images
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Directory holding persisted priorities and the running-image link
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// Maximum number of Active or Failed versions kept resident
    #[arg(long)]
    max_active_versions: Option<usize>,

    /// Log filter directives, overriding RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,

    /// Skip the startup scan of installed images
    #[arg(long)]
    no_scan: bool,
}

fn init_logging(args: &Args) {
    let directives = args
        .log_filter
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .init();
}

fn load_config(args: &Args) -> Result<UpdaterConfig> {
    let mut config = match &args.config {
        Some(path) => UpdaterConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => UpdaterConfig::default(),
    };

    if let Some(dir) = &args.media_dir {
        config.media_dir.clone_from(dir);
    }
    if let Some(dir) = &args.persist_dir {
        config.persist_dir.clone_from(dir);
    }
    if let Some(max) = args.max_active_versions {
        config.max_active_versions = max;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting CPLD update service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    debug!(?config, "Configuration loaded");

    let (tx, rx) = mpsc::unbounded_channel();
    let units = SystemctlUnitManager::new(Handle::current(), tx.clone());
    let running = ActiveLink::new(&config);
    let repo = VersionRepository::new(
        config.clone(),
        Box::new(TracingBusPublisher),
        Box::new(units),
        Box::new(running),
    );
    let mut daemon = UpdaterDaemon::new(repo, rx);

    if args.no_scan {
        info!("Startup scan skipped");
    } else {
        daemon.discover().context("Startup scan failed")?;
    }

    let watch_tx = tx.clone();
    let _watch = ActiveImageWatch::new(&config, move |id| {
        if watch_tx.send(ServiceEvent::FunctionalChanged { id }).is_err() {
            debug!("Event loop stopped, dropping running image change");
        }
    })
    .context("Failed to watch the running image link")?;

    let control = tokio::spawn(forward_control_lines(
        BufReader::new(tokio::io::stdin()),
        tx,
    ));

    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Error waiting for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    control.abort();
    info!("CPLD update service stopped");
    Ok(())
}
