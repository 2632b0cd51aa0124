//! Collaborator interfaces called by the supervisor
//!
//! [`SupervisorActions`] carries the broadcasts every transition emits and
//! the few side effects the supervisor cannot perform itself.
//! [`StateTransitions`] has one hook per named state; the supervisor calls
//! exactly one of them per transition.

use super::state::{NodeState, TlsConfig};
use std::io;
use std::path::Path;

/// Broadcasts and side effects supplied by the application
pub trait SupervisorActions: Send + Sync {
    /// Called on every transition, including states without a hook
    fn broadcast_state_change(&self, state: NodeState);

    /// Current TLS config, `None` once the node is reset
    fn broadcast_tls_config(&self, config: Option<&TlsConfig>);

    /// Read certificate material
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// Terminate the whole application after the node stopped
    fn exit_application(&self, code: i32) {
        log::info!("Exiting application with code {}", code);
        std::process::exit(code);
    }
}

/// Per-state transition hooks
#[allow(unused_variables)]
pub trait StateTransitions: Send + Sync {
    fn on_starting(&self) {}
    fn on_running(&self) {}
    fn on_stopping(&self) {}
    fn on_stopped(&self) {}
    fn on_updating(&self) {}
    fn on_updated(&self) {}
    fn on_crashed(&self, code: Option<i32>, signal: Option<i32>) {}
    fn on_error(&self, code: Option<i32>, signal: Option<i32>) {}
    fn on_unrecoverable(&self) {}
}
