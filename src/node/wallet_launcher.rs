//! Full launcher: node plus TLS-secured wallet backend
//!
//! The wallet backend talks to the node over its local socket and serves
//! the wallet API on a free local port, which becomes the reply port.

use super::config::{Network, SupervisorConfig};
use super::error::SupervisorError;
use super::launcher::{pick_free_port, spawn_piped, LaunchRequest, Launcher, NodeProcess, SpawnedNode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Launches the node and the wallet backend
#[derive(Debug, Default)]
pub struct WalletLauncher;

/// Path of the node's local socket (a named pipe on Windows)
fn node_socket_path(config: &SupervisorConfig, state_dir: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let _ = state_dir;
        PathBuf::from(format!(r"\\.\pipe\bcc-node-{}", config.network.as_str()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let _ = config;
        state_dir.join("node.socket")
    }
}

/// Resolve a node file relative to the config directory
fn config_file(config: &SupervisorConfig, file: &str) -> PathBuf {
    let file = PathBuf::from(crate::expand_path(file));
    if file.is_absolute() || config.config_path.is_empty() {
        file
    } else {
        PathBuf::from(crate::expand_path(&config.config_path)).join(file)
    }
}

/// Arguments for the node process
pub fn node_args(config: &SupervisorConfig, state_dir: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "--config".to_string(),
        config_file(config, &config.node.config_file).display().to_string(),
        "--topology".to_string(),
        config_file(config, &config.node.topology_file).display().to_string(),
        "--database-path".to_string(),
        state_dir.join("chain").display().to_string(),
        "--socket-path".to_string(),
        node_socket_path(config, state_dir).display().to_string(),
    ]
}

/// Arguments for the wallet backend serving on `port`
pub fn wallet_args(config: &SupervisorConfig, state_dir: &Path, port: u16) -> Vec<String> {
    let mut args = vec![
        "serve".to_string(),
        "--node-socket".to_string(),
        node_socket_path(config, state_dir).display().to_string(),
        "--database".to_string(),
        state_dir.join("wallets").display().to_string(),
        "--listen-address".to_string(),
        "127.0.0.1".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--sync-tolerance".to_string(),
        config.sync_tolerance.clone(),
    ];

    match (&config.network, &config.node.genesis_file) {
        (Network::Mainnet, _) => args.push("--mainnet".to_string()),
        (_, Some(genesis)) => {
            args.push("--testnet".to_string());
            args.push(config_file(config, genesis).display().to_string());
        }
        (_, None) => {}
    }

    let tls_server = PathBuf::from(crate::expand_path(&config.tls_path)).join("server");
    args.extend([
        "--tls-ca-cert".to_string(),
        tls_server.join("ca.crt").display().to_string(),
        "--tls-sv-cert".to_string(),
        tls_server.join("server.crt").display().to_string(),
        "--tls-sv-key".to_string(),
        tls_server.join("server.key").display().to_string(),
    ]);

    if let Some(url) = &config.metadata_url {
        args.push("--token-metadata-server".to_string());
        args.push(url.clone());
    }

    args
}

#[async_trait]
impl Launcher for WalletLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn NodeProcess>, SupervisorError> {
        let config = &request.config;
        let state_dir = config.state_directory();
        std::fs::create_dir_all(&state_dir).map_err(|e| {
            SupervisorError::launch(format!(
                "Failed to create state directory {}: {}",
                state_dir.display(),
                e
            ))
        })?;

        let port = pick_free_port()
            .map_err(|e| SupervisorError::launch(format!("Failed to find a free port: {}", e)))?;

        log::info!(
            "Launching node on {} (cluster: {}, staging: {})",
            config.network.as_str(),
            config.cluster,
            config.is_staging
        );

        let node_bin = crate::expand_path(&config.node.node_bin);
        let mut node_cmd = Command::new(&node_bin);
        node_cmd.args(node_args(config, &state_dir)).current_dir(&state_dir);
        if !config.cli_bin.is_empty() {
            node_cmd.env("BCC_CLI", crate::expand_path(&config.cli_bin));
        }
        let node = spawn_piped(node_cmd, &node_bin)?;
        log::info!("Node process spawned with PID {:?}", node.id());

        let wallet_bin = crate::expand_path(&config.node.wallet_bin);
        let mut wallet_cmd = Command::new(&wallet_bin);
        wallet_cmd
            .args(wallet_args(config, &state_dir, port))
            .current_dir(&state_dir);
        let wallet = match spawn_piped(wallet_cmd, &wallet_bin) {
            Ok(wallet) => wallet,
            Err(e) => {
                // The node is killed when its handle drops
                drop(node);
                return Err(e);
            }
        };
        log::info!("Wallet backend process spawned with PID {:?}", wallet.id());

        Ok(Box::new(SpawnedNode::new(
            node,
            Some(wallet),
            true,
            port,
            &request,
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::node::launcher::EventSender;
    use crate::node::log_sink::LogSink;
    use std::sync::Arc;

    fn config() -> SupervisorConfig {
        let mut config = SupervisorConfig::default();
        config.config_path = "/etc/node".to_string();
        config.node.config_file = "config.yaml".to_string();
        config.node.topology_file = "/abs/topology.json".to_string();
        config.tls_path = "/var/tls".to_string();
        config
    }

    #[test]
    fn test_node_args_resolve_config_dir() {
        let args = node_args(&config(), Path::new("/state"));
        let config_idx = args.iter().position(|a| a == "--config").unwrap();
        assert_eq!(args[config_idx + 1], "/etc/node/config.yaml");
        let topology_idx = args.iter().position(|a| a == "--topology").unwrap();
        assert_eq!(args[topology_idx + 1], "/abs/topology.json");
        assert!(args.contains(&"/state/chain".to_string()));
    }

    #[test]
    fn test_wallet_args_mainnet() {
        let mut config = config();
        config.network = Network::Mainnet;
        config.metadata_url = Some("https://tokens.example".to_string());

        let args = wallet_args(&config, Path::new("/state"), 43210);
        assert!(args.contains(&"--mainnet".to_string()));
        assert!(!args.contains(&"--testnet".to_string()));
        assert!(args.contains(&"43210".to_string()));
        assert!(args.contains(&"https://tokens.example".to_string()));
        assert!(args.contains(&"/var/tls/server/ca.crt".to_string()));
    }

    #[test]
    fn test_wallet_args_testnet_genesis() {
        let mut config = config();
        config.network = Network::Testnet;
        config.node.genesis_file = Some("genesis.json".to_string());

        let args = wallet_args(&config, Path::new("/state"), 1);
        let idx = args.iter().position(|a| a == "--testnet").unwrap();
        assert_eq!(args[idx + 1], "/etc/node/genesis.json");
        assert!(!args.contains(&"--token-metadata-server".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.state_dir = dir.path().join("state").display().to_string();
        config.node.node_bin = dir.path().join("no-such-node").display().to_string();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let request = LaunchRequest {
            config,
            node_log: Arc::new(LogSink::open(dir.path(), "node.log").unwrap()),
            wallet_log: Arc::new(LogSink::open(dir.path(), "wallet.log").unwrap()),
            events: EventSender::new(1, tx),
        };

        let result = WalletLauncher.launch(request).await;
        assert!(matches!(result, Err(SupervisorError::LaunchFailed { .. })));
    }
}
