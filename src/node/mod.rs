//! Node supervision for the desktop wallet
//!
//! This module launches the blockchain node as a child process and keeps
//! it alive: it detects orphans of a previous session, retries failed
//! starts, classifies exits and hands the TLS client config to the UI.
//!
//! ## Features
//!
//! - **Full Mode**: Node plus TLS-secured wallet backend
//! - **Selfnode Mode**: Self-contained local cluster for offline use
//! - **Lifecycle**: Start, stop, kill, restart and self-update handling
//! - **Recovery**: Bounded startup retries, crash restarts, orphan cleanup
//! - **Fault Injection**: Toggle node test faults over IPC
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       node module                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  supervisor.rs        - State machine (start/stop/restart)  │
//! │  config.rs            - Configuration types and persistence │
//! │  state.rs             - Node states, TLS config, status     │
//! │  launcher.rs          - Launcher traits, child monitoring   │
//! │  wallet_launcher.rs   - Node + wallet backend variant       │
//! │  selfnode_launcher.rs - Local cluster variant               │
//! │  ipc.rs               - JSON line messages to/from node     │
//! │  process.rs           - OS process inspection and signals   │
//! │  store.rs             - Durable previous-PID store          │
//! │  log_sink.rs          - Rotated node/wallet output files    │
//! │  condition.rs         - Bounded polling                     │
//! │  callbacks.rs         - Broadcast and transition hooks      │
//! │  error.rs             - Error types                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod callbacks;
pub mod condition;
pub mod config;
pub mod error;
pub mod ipc;
pub mod launcher;
pub mod log_sink;
pub mod process;
pub mod selfnode_launcher;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod wallet_launcher;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use callbacks::{StateTransitions, SupervisorActions};
pub use config::{Network, NodeImplementation, SupervisorConfig};
pub use error::SupervisorError;
pub use launcher::{launcher_for, Launcher, NodeProcess};
pub use state::{NodeState, NodeStatus, TlsConfig, NODE_UPDATE_EXIT_CODE};
pub use store::{JsonFileStore, PidStore};
pub use supervisor::NodeSupervisor;
