//! Lightweight launcher for a self-contained local cluster
//!
//! Used for offline and test deployments. The local cluster bundles node
//! and wallet backend in one process and serves plain HTTP on a fixed port;
//! an optional mock token metadata server runs next to it.

use super::error::SupervisorError;
use super::launcher::{spawn_piped, LaunchRequest, Launcher, NodeProcess, SpawnedNode};
use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, Default)]
pub struct SelfnodeLauncher;

#[async_trait]
impl Launcher for SelfnodeLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn NodeProcess>, SupervisorError> {
        let config = &request.config;
        let selfnode = config
            .selfnode
            .as_ref()
            .ok_or_else(|| SupervisorError::launch("Selfnode binaries are not configured"))?;

        let state_dir = config.state_directory();
        std::fs::create_dir_all(&state_dir).map_err(|e| {
            SupervisorError::launch(format!(
                "Failed to create state directory {}: {}",
                state_dir.display(),
                e
            ))
        })?;

        let selfnode_bin = crate::expand_path(&selfnode.selfnode_bin);
        let mut cmd = Command::new(&selfnode_bin);
        cmd.arg("--port")
            .arg(selfnode.port.to_string())
            .arg("--state-dir")
            .arg(&state_dir)
            .current_dir(&state_dir);
        let node = spawn_piped(cmd, &selfnode_bin)?;
        log::info!("Local cluster process spawned with PID {:?}", node.id());

        let metadata_server = match &selfnode.mock_token_metadata_server_bin {
            Some(bin) => {
                let bin = crate::expand_path(bin);
                match spawn_piped(Command::new(&bin), &bin) {
                    Ok(child) => {
                        log::info!("Mock token metadata server spawned with PID {:?}", child.id());
                        Some(child)
                    }
                    Err(e) => {
                        drop(node);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(Box::new(SpawnedNode::new(
            node,
            metadata_server,
            false,
            selfnode.port,
            &request,
        )))
    }
}
