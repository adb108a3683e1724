//! resurrectd — watchdog for a Clash-compatible proxy daemon.
//!
//! Every tick it probes the daemon's control API, kills the daemon if it
//! answers wrongly (a supervisor is expected to restart it), and keeps
//! the user's proxy-group selections alive across restarts through a
//! checkpoint file.
//!
//! # Usage
//!
//! ```text
//! resurrectd run --clash-api-port 9090 --checkpoint-dir /tmp/clash-resurrect/
//! resurrectd once --config /etc/resurrect.toml
//! resurrectd status
//! ```

mod cli;

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use resurrect_checkpoint::CheckpointStore;
use resurrect_client::{ControlApi, DaemonClient};
use resurrect_core::{ResurrectConfig, format_duration};
use resurrect_proc::ProcfsLocator;
use resurrect_watchdog::{Reconciler, ReconcilerSettings};

use crate::cli::{Cli, Command};

const DEFAULT_LOG_FILTER: &str = "info,resurrectd=debug,resurrect=debug";

type Watchdog = Reconciler<DaemonClient, ProcfsLocator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.options.json_logs);

    let config = cli.options.resolve().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => once(config).await,
        Command::Status => status(config).await,
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Logs go to stderr so `once`/`status` output stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_watchdog(config: &ResurrectConfig) -> anyhow::Result<Watchdog> {
    let client = DaemonClient::from_config(&config.daemon)?;
    let store = CheckpointStore::open(&config.checkpoint.dir).with_context(|| {
        format!(
            "cannot use checkpoint directory {}",
            config.checkpoint.dir.display()
        )
    })?;
    Ok(Reconciler::new(
        client,
        ProcfsLocator::new(),
        store,
        ReconcilerSettings::from_config(config),
    ))
}

async fn run(config: ResurrectConfig) -> anyhow::Result<()> {
    let interval = config.watchdog.interval()?;
    let mut watchdog = build_watchdog(&config)?;
    info!(
        daemon = watchdog.client().authority(),
        interval = %format_duration(interval),
        checkpoint = %watchdog.store().path().display(),
        "resurrectd starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    watchdog.run(interval, shutdown_rx).await;

    info!("resurrectd stopped");
    Ok(())
}

async fn once(config: ResurrectConfig) -> anyhow::Result<()> {
    let mut watchdog = build_watchdog(&config)?;
    let report = watchdog.run_once().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn status(config: ResurrectConfig) -> anyhow::Result<()> {
    let client = DaemonClient::from_config(&config.daemon)?;

    let health = client.probe_health().await;
    let configs = client.get_configs().await;
    let proxies = client.list_proxies().await;

    let selections: Option<BTreeMap<&str, &str>> = proxies
        .as_ref()
        .ok()
        .map(|p| p.selector_selections().collect());

    let report = serde_json::json!({
        "daemon": client.authority(),
        "healthy": health.is_ok(),
        "error": health.as_ref().err().map(|e| e.to_string()),
        "configs": configs.as_ref().ok(),
        "selections": selections,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Err(e) = &configs {
        warn!(error = %e, "cannot read daemon configs");
    }
    if let Err(e) = &proxies {
        warn!(error = %e, "cannot list proxies");
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
