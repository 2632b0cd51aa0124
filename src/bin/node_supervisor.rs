//! Standalone node supervisor
//!
//! Runs the node supervision loop outside the wallet UI. The config file
//! path is the first argument (defaults to the per-user config location);
//! `--force` ignores the startup retry limit.

use anyhow::Context;
use node_supervisor::logging::init_logger;
use node_supervisor::node::{
    launcher_for, JsonFileStore, NodeState, NodeSupervisor, StateTransitions, SupervisorActions,
    SupervisorConfig, TlsConfig,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Reports broadcasts to the log
struct LogBroadcaster;

impl SupervisorActions for LogBroadcaster {
    fn broadcast_state_change(&self, state: NodeState) {
        log::info!("Node state: {}", state);
    }

    fn broadcast_tls_config(&self, config: Option<&TlsConfig>) {
        match config {
            Some(config) => log::info!(
                "Node API available at https://{}:{}",
                config.hostname,
                config.port
            ),
            None => log::info!("Node API not available"),
        }
    }
}

struct LogTransitions;

impl StateTransitions for LogTransitions {
    fn on_crashed(&self, code: Option<i32>, signal: Option<i32>) {
        log::warn!("Node crashed: code={:?}, signal={:?}", code, signal);
    }

    fn on_error(&self, code: Option<i32>, signal: Option<i32>) {
        log::warn!("Node failed to start: code={:?}, signal={:?}", code, signal);
    }

    fn on_unrecoverable(&self) {
        log::error!("Node is unrecoverable, giving up");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config_path = None;
    let mut is_forced = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--force" => is_forced = true,
            path => config_path = Some(PathBuf::from(path)),
        }
    }
    let config_path = config_path.unwrap_or_else(SupervisorConfig::default_path);

    let config = SupervisorConfig::load(&config_path)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let _logger = init_logger(config.log_directory())?;
    log::info!("Using config {}", config_path.display());

    let mut supervisor = NodeSupervisor::new(
        config.clone(),
        launcher_for(&config),
        Arc::new(JsonFileStore::default_location()),
        Arc::new(LogBroadcaster),
        Arc::new(LogTransitions),
    );

    supervisor.start(config, is_forced).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
        }
        log::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    supervisor.supervise(shutdown_rx).await;
    supervisor.stop().await?;
    Ok(())
}
