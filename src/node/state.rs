//! Supervisor state types
//!
//! The lifecycle state machine values, the TLS client configuration handed
//! to the rest of the application, and the cached status snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code the node uses to signal that it exited to apply a self-update
pub const NODE_UPDATE_EXIT_CODE: i32 = 20;

/// Lifecycle state of the managed node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Process exited while running, not yet classified
    Exiting,
    Updating,
    Updated,
    Crashed,
    Errored,
    /// Startup retries exhausted, no automatic restart
    Unrecoverable,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Stopped => "stopped",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Exiting => "exiting",
            NodeState::Updating => "updating",
            NodeState::Updated => "updated",
            NodeState::Crashed => "crashed",
            NodeState::Errored => "errored",
            NodeState::Unrecoverable => "unrecoverable",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS client configuration for talking to the wallet backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Certificate authority (PEM bytes)
    pub ca: Vec<u8>,
    /// Client private key (PEM bytes)
    pub key: Vec<u8>,
    /// Client certificate (PEM bytes)
    pub cert: Vec<u8>,
    pub hostname: String,
    pub port: u16,
}

impl TlsConfig {
    /// Config for a local cluster, which serves plain HTTP on localhost
    pub fn local(port: u16) -> Self {
        Self {
            ca: Vec::new(),
            key: Vec::new(),
            cert: Vec::new(),
            hostname: "localhost".to_string(),
            port,
        }
    }
}

/// Cached node status, merged with the live process ids
///
/// Pure cache for faster page reloads, nothing reads it for decisions.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Last status saved by the application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Node process id (0 when no process)
    pub node_pid: u32,

    /// Wallet backend process id (0 when no process)
    pub wallet_pid: u32,
}
