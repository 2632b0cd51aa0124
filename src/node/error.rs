//! Error types for node supervision

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by [`crate::node::NodeSupervisor`] operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A process is already connected, or an orphan from a previous
    /// session could not be confirmed stopped
    #[error("node cannot be started")]
    CannotBeStarted,

    /// Consecutive start attempts reached the configured maximum
    #[error("too many startup retries ({tries})")]
    TooManyRetries { tries: u32 },

    /// The launcher could not create or start the process
    #[error("unable to launch node: {reason}")]
    LaunchFailed {
        reason: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("node did not shut down within {}ms", .timeout.as_millis())]
    ShutdownTimeout { timeout: Duration },

    #[error("could not kill node process (PID: {pid:?})")]
    KillFailed { pid: Option<u32> },

    #[error("node did not apply the update within {}ms", .timeout.as_millis())]
    UpdateTimeout { timeout: Duration },

    #[error("node did not inject the fault \"{fault}\" correctly")]
    FaultInjectionFailed { fault: String },

    #[error("failed to send message to node: {0}")]
    Ipc(String),

    #[error("pid store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to read TLS material {}: {source}", .path.display())]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    /// Launch failure without an exit status
    pub fn launch(reason: impl Into<String>) -> Self {
        SupervisorError::LaunchFailed {
            reason: reason.into(),
            code: None,
            signal: None,
        }
    }
}

/// Durable PID store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A polled condition did not become true before its deadline
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("condition not met within {}ms", .0.as_millis())]
pub struct ConditionTimeout(pub Duration);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_context() {
        let err = SupervisorError::ShutdownTimeout {
            timeout: Duration::from_millis(2000),
        };
        assert_eq!(err.to_string(), "node did not shut down within 2000ms");

        let err = SupervisorError::KillFailed { pid: Some(42) };
        assert!(err.to_string().contains("42"));

        let err = SupervisorError::launch("spawn failed");
        assert_eq!(err.to_string(), "unable to launch node: spawn failed");
    }
}
