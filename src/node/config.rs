//! Supervisor configuration types and persistence
//!
//! Handles loading and saving the supervisor configuration from disk and
//! deriving the platform-specific names used for process inspection and
//! PID persistence.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which launcher drives the managed node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeImplementation {
    /// Full node plus wallet backend, TLS secured
    #[default]
    Bcc,
    /// Self-contained local cluster for offline and test deployments
    Selfnode,
}

impl NodeImplementation {
    /// Get the implementation name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeImplementation::Bcc => "bcc",
            NodeImplementation::Selfnode => "selfnode",
        }
    }
}

/// Network the node connects to
///
/// Known networks are matched case-insensitively; any other name is kept
/// as given so its store keys stay distinct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Network {
    /// Main network
    Mainnet,
    /// Public test network
    #[default]
    Testnet,
    /// Staging network
    Staging,
    /// Local self-contained cluster
    Selfnode,
    /// Any other named network
    Other(String),
}

impl Network {
    /// Get the network name as a string
    pub fn as_str(&self) -> &str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Staging => "staging",
            Network::Selfnode => "selfnode",
            Network::Other(name) => name,
        }
    }
}

impl FromStr for Network {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Network::from(s.to_string()))
    }
}

impl From<String> for Network {
    fn from(name: String) -> Self {
        match name.to_lowercase().as_str() {
            "mainnet" => Network::Mainnet,
            "testnet" => Network::Testnet,
            "staging" => Network::Staging,
            "selfnode" => Network::Selfnode,
            _ => Network::Other(name),
        }
    }
}

impl From<Network> for String {
    fn from(network: Network) -> Self {
        match network {
            Network::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Binaries and files used to launch the node and wallet backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeBinaries {
    /// Path to the node executable
    #[serde(default = "default_node_bin")]
    pub node_bin: String,

    /// Path to the wallet backend executable
    #[serde(default = "default_wallet_bin")]
    pub wallet_bin: String,

    /// Node configuration file
    #[serde(default)]
    pub config_file: String,

    /// Node topology file
    #[serde(default)]
    pub topology_file: String,

    /// Genesis file, required by the wallet backend on non-mainnet networks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis_file: Option<String>,
}

fn default_node_bin() -> String {
    "bcc-node".to_string()
}

fn default_wallet_bin() -> String {
    "bcc-wallet".to_string()
}

impl Default for NodeBinaries {
    fn default() -> Self {
        Self {
            node_bin: default_node_bin(),
            wallet_bin: default_wallet_bin(),
            config_file: String::new(),
            topology_file: String::new(),
            genesis_file: None,
        }
    }
}

/// Binaries used by the self-contained local cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelfnodeConfig {
    /// Path to the local cluster executable
    pub selfnode_bin: String,

    /// Optional mock token metadata server started alongside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_token_metadata_server_bin: Option<String>,

    /// Port the local cluster's wallet API listens on
    #[serde(default = "default_selfnode_port")]
    pub port: u16,
}

fn default_selfnode_port() -> u16 {
    8088
}

/// Supervisor configuration stored as camelCase JSON
///
/// All timeouts are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Path to the state directory
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Launcher variant
    #[serde(default)]
    pub node_implementation: NodeImplementation,

    /// Node and wallet backend binaries
    #[serde(default)]
    pub node: NodeBinaries,

    /// Directory for node and wallet backend log files
    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,

    /// Path to the node TLS folder
    #[serde(default = "default_tls_path")]
    pub tls_path: String,

    /// Time to wait for the node to start up
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,

    /// Maximum number of start attempts without reaching RUNNING
    #[serde(default = "default_startup_max_retries")]
    pub startup_max_retries: u32,

    /// Time to wait for the node to shut down gracefully
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Time to wait for the node to be killed
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: u64,

    /// Time to wait for the node to update itself
    #[serde(default = "default_update_timeout")]
    pub update_timeout: u64,

    /// Cluster name
    #[serde(default)]
    pub cluster: String,

    /// Network the node connects to
    #[serde(default)]
    pub network: Network,

    /// Node configuration directory
    #[serde(default)]
    pub config_path: String,

    /// Sync tolerance passed to the wallet backend, e.g. "300s"
    #[serde(default = "default_sync_tolerance")]
    pub sync_tolerance: String,

    /// Path to the node CLI executable
    #[serde(default)]
    pub cli_bin: String,

    /// Whether the application runs against staging infrastructure
    #[serde(default)]
    pub is_staging: bool,

    /// Token metadata server URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,

    /// Local cluster binaries (selfnode implementation only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selfnode: Option<SelfnodeConfig>,

    /// Interval between re-checks of a polled condition
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Ceiling for polled conditions without their own timeout
    #[serde(default = "default_condition_timeout")]
    pub condition_timeout: u64,

    /// Delay before restarting after a crash of a running node
    #[serde(default = "default_crash_restart_delay")]
    pub crash_restart_delay: u64,

    /// Delay before restarting after a crash while startup retries are pending
    #[serde(default = "default_crash_restart_backoff")]
    pub crash_restart_backoff: u64,
}

fn default_state_dir() -> String {
    app_data_dir().join("state").to_string_lossy().to_string()
}

fn default_log_file_path() -> String {
    app_data_dir().join("logs").to_string_lossy().to_string()
}

fn default_tls_path() -> String {
    app_data_dir().join("tls").to_string_lossy().to_string()
}

fn default_startup_timeout() -> u64 {
    5 * 60 * 1000
}

fn default_startup_max_retries() -> u32 {
    5
}

fn default_shutdown_timeout() -> u64 {
    60 * 1000
}

fn default_kill_timeout() -> u64 {
    10 * 1000
}

fn default_update_timeout() -> u64 {
    60 * 1000
}

fn default_sync_tolerance() -> String {
    "300s".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_condition_timeout() -> u64 {
    5000
}

fn default_crash_restart_delay() -> u64 {
    1000
}

fn default_crash_restart_backoff() -> u64 {
    30 * 1000
}

/// Base directory for supervisor data
fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Phoenix-Node")
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            node_implementation: NodeImplementation::default(),
            node: NodeBinaries::default(),
            log_file_path: default_log_file_path(),
            tls_path: default_tls_path(),
            startup_timeout: default_startup_timeout(),
            startup_max_retries: default_startup_max_retries(),
            shutdown_timeout: default_shutdown_timeout(),
            kill_timeout: default_kill_timeout(),
            update_timeout: default_update_timeout(),
            cluster: String::new(),
            network: Network::default(),
            config_path: String::new(),
            sync_tolerance: default_sync_tolerance(),
            cli_bin: String::new(),
            is_staging: false,
            metadata_url: None,
            selfnode: None,
            poll_interval: default_poll_interval(),
            condition_timeout: default_condition_timeout(),
            crash_restart_delay: default_crash_restart_delay(),
            crash_restart_backoff: default_crash_restart_backoff(),
        }
    }
}

impl SupervisorConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Phoenix-Node")
            .join("supervisor.json")
    }

    /// Load config from disk, or return default if not found
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent fallback, so a typo cannot launch the node with defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("Failed to read config {}: {}", path.display(), e)),
        };

        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, contents).map_err(|e| format!("Failed to write config: {}", e))?;

        log::info!("Supervisor config saved to {}", path.display());
        Ok(())
    }

    /// Whether the self-contained local launcher is used
    pub fn is_selfnode(&self) -> bool {
        self.node_implementation == NodeImplementation::Selfnode
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn condition_timeout(&self) -> Duration {
        Duration::from_millis(self.condition_timeout)
    }

    pub fn crash_restart_delay(&self) -> Duration {
        Duration::from_millis(self.crash_restart_delay)
    }

    pub fn crash_restart_backoff(&self) -> Duration {
        Duration::from_millis(self.crash_restart_backoff)
    }

    /// State directory with `~` and environment variables expanded
    pub fn state_directory(&self) -> PathBuf {
        PathBuf::from(crate::expand_path(&self.state_dir))
    }

    /// Log directory with `~` and environment variables expanded
    pub fn log_directory(&self) -> PathBuf {
        PathBuf::from(crate::expand_path(&self.log_file_path))
    }

    /// Directory holding the client certificates
    pub fn tls_client_dir(&self) -> PathBuf {
        PathBuf::from(crate::expand_path(&self.tls_path)).join("client")
    }

    /// Name of the node process as reported by the OS
    pub fn process_name(&self) -> &'static str {
        node_process_name(self.node_implementation)
    }

    /// Durable store key of the last known node PID
    pub fn previous_pid_key(&self) -> String {
        previous_pid_key(&self.network)
    }
}

/// Name of the managed node process on the current platform
pub fn node_process_name(implementation: NodeImplementation) -> &'static str {
    #[cfg(target_os = "windows")]
    {
        match implementation {
            NodeImplementation::Bcc => "bcc-node.exe",
            NodeImplementation::Selfnode => "local-cluster.exe",
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        match implementation {
            NodeImplementation::Bcc => "bcc-node",
            NodeImplementation::Selfnode => "local-cluster",
        }
    }
}

/// Durable store key of the last node PID, scoped per network
pub fn previous_pid_key(network: &Network) -> String {
    format!("{}-PREVIOUS-NODE-PID", network.as_str().to_uppercase())
}
