//! Launching the managed node processes
//!
//! A [`Launcher`] turns a configuration into a running [`NodeProcess`]: the
//! node plus a companion process (wallet backend, or the mock metadata
//! server for a local cluster). The process reports IPC messages and its
//! exit through an [`EventSender`] owned by the supervisor.

use super::config::SupervisorConfig;
use super::error::SupervisorError;
use super::ipc::{NodeIpcMessage, NodeMessage, OutgoingIpcMessage};
use super::log_sink::LogSink;
use super::process::{default_terminator, ProcessTerminator};
use super::selfnode_launcher::SelfnodeLauncher;
use super::wallet_launcher::WalletLauncher;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// How a managed process ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    /// Terminating signal (POSIX only)
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Something the managed process reported
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Message(NodeMessage),
    Exited(ExitStatus),
}

/// Event channel handed to one launched process
///
/// Every event is stamped with the generation of the process it came from,
/// so the supervisor can drop events of a process it already let go.
#[derive(Debug, Clone)]
pub struct EventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, NodeEvent)>,
}

impl EventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, NodeEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Returns false once the supervisor is gone
    pub fn send(&self, event: NodeEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Everything a launcher needs for one start attempt
pub struct LaunchRequest {
    pub config: SupervisorConfig,
    pub node_log: Arc<LogSink>,
    pub wallet_log: Arc<LogSink>,
    pub events: EventSender,
}

/// Handle to a launched node
#[async_trait]
pub trait NodeProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Wallet backend PID, if this variant runs one
    fn wallet_pid(&self) -> Option<u32>;

    /// Started and not yet exited
    fn is_connected(&self) -> bool;

    /// Wait until the node serves its API, returning the reply port
    async fn start(&mut self) -> Result<u16, ExitStatus>;

    /// Ask the processes to shut down and wait up to `timeout`
    async fn stop(&mut self, timeout: Duration) -> Result<(), SupervisorError>;

    /// Forcefully end the processes without waiting
    fn kill(&mut self);

    async fn send(&mut self, message: &OutgoingIpcMessage) -> Result<(), SupervisorError>;
}

/// Creates node processes
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn NodeProcess>, SupervisorError>;
}

/// Launcher variant for a configuration
pub fn launcher_for(config: &SupervisorConfig) -> Arc<dyn Launcher> {
    if config.is_selfnode() {
        Arc::new(SelfnodeLauncher)
    } else {
        Arc::new(WalletLauncher)
    }
}

// ============================================================================
// Child Monitoring
// ============================================================================

/// Owns a child process in a background task and reports its exit
///
/// Dropping the monitor kills a child that is still running.
#[derive(Debug)]
pub struct ChildMonitor {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

impl ChildMonitor {
    pub fn spawn(mut child: Child, label: &'static str) -> Self {
        let pid = child.id();
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                // An explicit kill, or the monitor was dropped
                _ = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        log::warn!("Failed to kill {} (PID {:?}): {}", label, pid, e);
                    }
                    child.wait().await
                }
            };

            let status = match status {
                Ok(status) => ExitStatus::from(status),
                Err(e) => {
                    log::error!("Failed to wait for {} (PID {:?}): {}", label, pid, e);
                    ExitStatus::default()
                }
            };
            log::info!(
                "{} (PID {:?}) exited: code={:?}, signal={:?}",
                label,
                pid,
                status.code,
                status.signal
            );
            let _ = exit_tx.send(Some(status));
        });

        Self {
            pid,
            kill_tx: Some(kill_tx),
            exit_rx,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Resolves once the child has exited
    pub fn exited(&self) -> impl std::future::Future<Output = ExitStatus> + Send + 'static {
        let mut rx = self.exit_rx.clone();
        async move {
            let status = rx
                .wait_for(|status| status.is_some())
                .await
                .map(|status| *status)
                .unwrap_or_default();
            status.unwrap_or_default()
        }
    }
}

/// Forward output lines to a sink, routing IPC messages to `events`
pub fn pipe_output<R>(reader: R, sink: Arc<LogSink>, events: Option<EventSender>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let ipc = events
                        .as_ref()
                        .and_then(|events| NodeIpcMessage::decode_line(&line).map(|m| (events, m)));
                    match ipc {
                        Some((events, message)) => {
                            for message in message.into_messages() {
                                events.send(NodeEvent::Message(message));
                            }
                        }
                        None => sink.write_line(&line),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read output for {}: {}", sink.name(), e);
                    break;
                }
            }
        }
    });
}

/// Ask the OS for an unused local port
pub fn pick_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Spawn a command with piped stdio and no console window
pub fn spawn_piped(mut cmd: Command, program: &str) -> Result<Child, SupervisorError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // On Windows, prevent console window from appearing
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    log::info!("Starting {}: {:?}", program, cmd);
    cmd.spawn()
        .map_err(|e| SupervisorError::launch(format!("Failed to start {}: {}", program, e)))
}

// ============================================================================
// Spawned Node
// ============================================================================

/// Node plus companion process, shared by both launcher variants
pub struct SpawnedNode {
    node: ChildMonitor,
    companion: Option<ChildMonitor>,
    companion_is_wallet: bool,
    stdin: Option<ChildStdin>,
    port: u16,
    connected: bool,
    startup_timeout: Duration,
    poll_interval: Duration,
    terminator: Box<dyn ProcessTerminator>,
}

impl SpawnedNode {
    /// Take ownership of the spawned children and start watching them
    ///
    /// The node's stdout carries IPC messages; the first exit of either
    /// process is reported as the exit of the whole node.
    pub fn new(
        mut node: Child,
        companion: Option<Child>,
        companion_is_wallet: bool,
        port: u16,
        request: &LaunchRequest,
    ) -> Self {
        let stdin = node.stdin.take();
        if let Some(stdout) = node.stdout.take() {
            pipe_output(stdout, request.node_log.clone(), Some(request.events.clone()));
        }
        if let Some(stderr) = node.stderr.take() {
            pipe_output(stderr, request.node_log.clone(), None);
        }
        let node = ChildMonitor::spawn(node, "node");

        let companion = companion.map(|mut child| {
            if let Some(stdout) = child.stdout.take() {
                pipe_output(stdout, request.wallet_log.clone(), None);
            }
            if let Some(stderr) = child.stderr.take() {
                pipe_output(stderr, request.wallet_log.clone(), None);
            }
            let label = if companion_is_wallet {
                "wallet backend"
            } else {
                "companion"
            };
            ChildMonitor::spawn(child, label)
        });

        let node_exit = node.exited();
        let companion_exit = companion.as_ref().map(|c| c.exited());
        let events = request.events.clone();
        tokio::spawn(async move {
            let status = match companion_exit {
                Some(companion_exit) => tokio::select! {
                    status = node_exit => status,
                    status = companion_exit => status,
                },
                None => node_exit.await,
            };
            events.send(NodeEvent::Exited(status));
        });

        Self {
            node,
            companion,
            companion_is_wallet,
            stdin,
            port,
            connected: false,
            startup_timeout: request.config.startup_timeout(),
            poll_interval: request.config.poll_interval(),
            terminator: default_terminator(),
        }
    }

    fn first_exit(&self) -> Option<ExitStatus> {
        self.node
            .exit_status()
            .or_else(|| self.companion.as_ref().and_then(|c| c.exit_status()))
    }

    fn all_exited(&self) -> bool {
        self.node.has_exited() && self.companion.as_ref().map_or(true, |c| c.has_exited())
    }
}

#[async_trait]
impl NodeProcess for SpawnedNode {
    fn pid(&self) -> Option<u32> {
        self.node.pid()
    }

    fn wallet_pid(&self) -> Option<u32> {
        if self.companion_is_wallet {
            self.companion.as_ref().and_then(|c| c.pid())
        } else {
            None
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.first_exit().is_none()
    }

    async fn start(&mut self) -> Result<u16, ExitStatus> {
        let deadline = Instant::now() + self.startup_timeout;
        log::info!(
            "Waiting for node API on port {} (timeout: {}ms)...",
            self.port,
            self.startup_timeout.as_millis()
        );

        loop {
            if let Some(status) = self.first_exit() {
                log::error!("Node exited during startup: {:?}", status);
                return Err(status);
            }
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                self.connected = true;
                return Ok(self.port);
            }
            if Instant::now() >= deadline {
                log::error!(
                    "Node API did not come up within {}ms",
                    self.startup_timeout.as_millis()
                );
                return Err(ExitStatus::default());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn stop(&mut self, timeout: Duration) -> Result<(), SupervisorError> {
        self.connected = false;

        // Companion first, it depends on the node
        let mut targets: Vec<&ChildMonitor> = Vec::new();
        if let Some(companion) = self.companion.as_ref() {
            targets.push(companion);
        }
        targets.push(&self.node);

        for monitor in targets {
            if monitor.has_exited() {
                continue;
            }
            if let Some(pid) = monitor.pid() {
                if let Err(e) = self.terminator.terminate(pid) {
                    log::warn!("Failed to request shutdown of PID {}: {}", pid, e);
                }
            }
        }

        let deadline = Instant::now() + timeout;
        while !self.all_exited() {
            if Instant::now() >= deadline {
                return Err(SupervisorError::ShutdownTimeout { timeout });
            }
            tokio::time::sleep(self.poll_interval.min(Duration::from_millis(100))).await;
        }
        Ok(())
    }

    fn kill(&mut self) {
        self.connected = false;
        if let Some(companion) = self.companion.as_mut() {
            companion.kill();
        }
        self.node.kill();
    }

    async fn send(&mut self, message: &OutgoingIpcMessage) -> Result<(), SupervisorError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SupervisorError::Ipc("node has no IPC channel".to_string()))?;

        let mut line = message
            .encode()
            .map_err(|e| SupervisorError::Ipc(e.to_string()))?;
        line.push('\n');

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SupervisorError::Ipc(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SupervisorError::Ipc(e.to_string()))
    }
}
