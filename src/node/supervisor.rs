//! Node process lifecycle supervision
//!
//! [`NodeSupervisor`] owns at most one managed node at a time and drives it
//! through the [`NodeState`] machine:
//!
//! ```text
//! STOPPED ──start──▶ STARTING ──reply port──▶ RUNNING ──stop──▶ STOPPING ──exit──▶ STOPPED
//!                       │                        │  └──expect update──▶ UPDATING ──exit 20──▶ UPDATED
//!                       │ launch failure         │ unexpected exit
//!                       ▼                        ▼
//!                    ERRORED ──restart       EXITING ──▶ CRASHED | UNRECOVERABLE
//! ```
//!
//! All methods take `&mut self`: one control flow owns the supervisor and
//! calls are serialized. Events from the managed process (IPC messages,
//! exit) queue on a channel and are handled by [`NodeSupervisor::next_event`],
//! [`NodeSupervisor::supervise`], or while an operation polls for a state.

use super::callbacks::{StateTransitions, SupervisorActions};
use super::condition::poll_until;
use super::config::SupervisorConfig;
use super::error::{ConditionTimeout, SupervisorError};
use super::ipc::{NodeMessage, OutgoingIpcMessage};
use super::launcher::{EventSender, ExitStatus, LaunchRequest, Launcher, NodeEvent, NodeProcess};
use super::log_sink::LogSink;
use super::process::{default_terminator, ProcessInspector, ProcessTerminator, SysinfoInspector};
use super::state::{NodeState, NodeStatus, TlsConfig, NODE_UPDATE_EXIT_CODE};
use super::store::PidStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// The launched node and the generation its events are stamped with
struct ManagedProcess {
    handle: Box<dyn NodeProcess>,
    generation: u64,
}

/// What an error classification decided
enum ErrorOutcome {
    Retry,
    Unrecoverable,
}

/// What to do once the previous node is gone
enum RestartAction {
    Start,
    ExitApplication,
}

/// Supervises the external node process
pub struct NodeSupervisor {
    /// Config of the last start attempt, reused on restart
    config: SupervisorConfig,

    launcher: Arc<dyn Launcher>,
    store: Arc<dyn PidStore>,
    inspector: Arc<dyn ProcessInspector>,
    terminator: Arc<dyn ProcessTerminator>,
    actions: Arc<dyn SupervisorActions>,
    transitions: Arc<dyn StateTransitions>,

    node: Option<ManagedProcess>,
    node_log: Option<Arc<LogSink>>,
    wallet_log: Option<Arc<LogSink>>,

    /// Set once the node reported its reply port, cleared on reset
    tls_config: Option<TlsConfig>,

    state: NodeState,

    /// Last status saved by the application
    status: Option<serde_json::Value>,

    /// Start attempts since the node last reached RUNNING
    startup_tries: u32,

    /// Exit the application instead of restarting
    exit_on_stop: bool,

    /// Faults the node confirmed as active
    injected_faults: Vec<String>,

    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, NodeEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, NodeEvent)>,
}

impl NodeSupervisor {
    /// Create a supervisor inspecting and terminating real OS processes
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn Launcher>,
        store: Arc<dyn PidStore>,
        actions: Arc<dyn SupervisorActions>,
        transitions: Arc<dyn StateTransitions>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            launcher,
            store,
            inspector: Arc::new(SysinfoInspector::new()),
            terminator: Arc::from(default_terminator()),
            actions,
            transitions,
            node: None,
            node_log: None,
            wallet_log: None,
            tls_config: None,
            state: NodeState::Stopped,
            status: None,
            startup_tries: 0,
            exit_on_stop: false,
            injected_faults: Vec::new(),
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Replace process inspection and termination
    pub fn with_process_control(
        mut self,
        inspector: Arc<dyn ProcessInspector>,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> Self {
        self.inspector = inspector;
        self.terminator = terminator;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn tls_config(&self) -> Option<&TlsConfig> {
        self.tls_config.as_ref()
    }

    /// PID of the node process, if one is managed
    pub fn pid(&self) -> Option<u32> {
        self.node.as_ref().and_then(|node| node.handle.pid())
    }

    /// Cached status merged with the live process ids
    pub fn status(&self) -> NodeStatus {
        let wallet_pid = self.node.as_ref().and_then(|node| node.handle.wallet_pid());
        NodeStatus {
            payload: self.status.clone(),
            node_pid: self.pid().unwrap_or(0),
            wallet_pid: wallet_pid.unwrap_or(0),
        }
    }

    pub fn startup_tries(&self) -> u32 {
        self.startup_tries
    }

    pub fn injected_faults(&self) -> &[String] {
        &self.injected_faults
    }

    /// Whether a started node is alive and can be interacted with
    ///
    /// Reflects the launched process handle (started and no exit observed),
    /// not a fixed flag.
    pub fn is_connected(&self) -> bool {
        self.node
            .as_ref()
            .map_or(false, |node| node.handle.is_connected())
    }

    pub fn save_status(&mut self, status: Option<serde_json::Value>) {
        self.status = status;
    }

    pub fn broadcast_tls_config(&self) {
        self.actions.broadcast_tls_config(self.tls_config.as_ref());
    }

    /// Exit the application the next time the node would be restarted
    pub fn exit_on_stop(&mut self) {
        self.exit_on_stop = true;
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Start the node with `config`
    ///
    /// Resolves once the node reached RUNNING. A failed attempt moves to
    /// ERRORED and is retried with the same config until an attempt
    /// succeeds or the startup tries reach `startup_max_retries`, which ends
    /// in UNRECOVERABLE and returns the last launch error.
    pub async fn start(
        &mut self,
        config: SupervisorConfig,
        is_forced: bool,
    ) -> Result<(), SupervisorError> {
        self.drain_events().await;
        if !self.can_be_started(&config).await {
            log::error!(
                "Node cannot be started (startup tries: {})",
                self.startup_tries
            );
            return Err(SupervisorError::CannotBeStarted);
        }
        if self.startup_tries >= config.startup_max_retries && !is_forced {
            log::error!(
                "Too many startup retries (startup tries: {})",
                self.startup_tries
            );
            return Err(SupervisorError::TooManyRetries {
                tries: self.startup_tries,
            });
        }

        self.config = config;

        loop {
            let error = match self.start_attempt().await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            log::error!("Unable to start node: {}", error);

            let (code, signal) = match &error {
                SupervisorError::LaunchFailed { code, signal, .. } => (*code, *signal),
                _ => (None, None),
            };
            let outcome = self.handle_error(code, signal);
            self.abandon_node().await;
            if let ErrorOutcome::Unrecoverable = outcome {
                return Err(error);
            }

            match self.prepare_restart().await {
                Ok(RestartAction::Start) => {}
                Ok(RestartAction::ExitApplication) => return Ok(()),
                Err(e) => {
                    self.fail_restart(&e);
                    return Err(e);
                }
            }

            if !self.can_be_started(&self.config).await {
                let e = SupervisorError::CannotBeStarted;
                self.fail_restart(&e);
                return Err(e);
            }
        }
    }

    /// Stop the node gracefully, killing it if it does not exit within
    /// `shutdown_timeout`
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        self.drain_events().await;
        if self.is_dead() {
            log::info!("Node stop: process is not running anymore");
            return Ok(());
        }

        log::info!("Stopping node process (PID {:?})", self.pid());
        self.change_to_state(NodeState::Stopping, None);

        let timeout = self.config.shutdown_timeout();
        match self.stop_gracefully(timeout).await {
            Ok(()) => {
                self.store_process_states();
                self.reset();
                self.change_to_state(NodeState::Stopped, None);
                Ok(())
            }
            Err(e) => {
                log::error!("Node did not stop correctly: {}", e);
                self.kill().await
            }
        }
    }

    /// Kill the node and wait up to `kill_timeout` for it to be gone
    pub async fn kill(&mut self) -> Result<(), SupervisorError> {
        self.drain_events().await;
        if self.is_dead() {
            log::info!("Node kill: process is already dead");
            return Ok(());
        }

        let pid = self.pid();
        log::info!("Killing node process (PID {:?})", pid);
        if let Some(node) = self.node.as_mut() {
            node.handle.kill();
        }

        let result = self.wait_for_exit_or_kill(self.config.kill_timeout()).await;
        self.store_process_states();
        match result {
            Ok(()) => {
                self.reset();
                self.change_to_state(NodeState::Stopped, None);
                Ok(())
            }
            Err(e) => {
                log::error!("Could not kill node (PID {:?}): {}", pid, e);
                self.reset();
                Err(SupervisorError::KillFailed { pid })
            }
        }
    }

    /// Stop the node if needed and start it again with the previous config
    ///
    /// With `is_forced` the start ignores the startup retry limit.
    pub async fn restart(&mut self, is_forced: bool) -> Result<(), SupervisorError> {
        self.drain_events().await;
        let result = match self.prepare_restart().await {
            Ok(RestartAction::Start) => {
                let config = self.config.clone();
                self.start(config, is_forced).await
            }
            Ok(RestartAction::ExitApplication) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.fail_restart(e);
        }
        result
    }

    /// Expect the node to exit for a self-update within `update_timeout`,
    /// killing it otherwise
    pub async fn expect_node_update(&mut self) -> Result<(), SupervisorError> {
        self.change_to_state(NodeState::Updating, None);
        log::info!("Waiting for node to apply update");

        let timeout = self.config.update_timeout();
        let updated = match self.wait_for_state(NodeState::Updated, timeout).await {
            Ok(()) => self.wait_for_node_process_to_exit(timeout).await,
            Err(e) => Err(e),
        };

        if updated.is_err() {
            let error = SupervisorError::UpdateTimeout { timeout };
            log::info!("Node did not apply update as expected ({}), killing it...", error);
            return self.kill().await;
        }
        Ok(())
    }

    /// Ask the node to enable or disable a fault and wait for confirmation
    pub async fn set_fault(&mut self, fault: &str, enabled: bool) -> Result<(), SupervisorError> {
        let Some(node) = self.node.as_mut() else {
            log::warn!("Cannot inject fault \"{}\": no node process", fault);
            return Ok(());
        };
        node.handle
            .send(&OutgoingIpcMessage::set_fault(fault, enabled))
            .await?;

        let deadline = Instant::now() + self.config.condition_timeout();
        loop {
            let has_fault = self.injected_faults.iter().any(|f| f == fault);
            if has_fault == enabled {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SupervisorError::FaultInjectionFailed {
                    fault: fault.to_string(),
                });
            }
            self.pump_events(self.config.poll_interval().min(deadline - now))
                .await;
        }
    }

    // ========================================================================
    // Event Handling
    // ========================================================================

    /// Wait for the next event from the managed node and handle it
    pub async fn next_event(&mut self) -> NodeState {
        if let Some((generation, event)) = self.events_rx.recv().await {
            self.handle_event(generation, event).await;
        }
        self.state
    }

    /// Handle node events until `shutdown` turns true
    ///
    /// A node that crashed or errored while running is restarted after
    /// `crash_restart_delay`, or after `crash_restart_backoff` when it
    /// failed before reaching RUNNING.
    pub async fn supervise(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let previous = self.state;

            tokio::select! {
                event = self.events_rx.recv() => {
                    if let Some((generation, event)) = event {
                        self.handle_event(generation, event).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let failed = matches!(self.state, NodeState::Crashed | NodeState::Errored);
            if !failed || self.state == previous {
                continue;
            }

            let delay = if self.startup_tries > 0 {
                self.config.crash_restart_backoff()
            } else {
                self.config.crash_restart_delay()
            };
            log::info!("Restarting {} node in {}ms", self.state, delay.as_millis());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if let Err(e) = self.restart(false).await {
                log::error!("Automatic restart failed: {}", e);
            }
        }
        log::info!("Node supervision stopped");
    }

    async fn handle_event(&mut self, generation: u64, event: NodeEvent) {
        let current = self.node.as_ref().map(|node| node.generation);
        if current != Some(generation) {
            log::debug!(
                "Ignoring event of a previous node process (generation {}): {:?}",
                generation,
                event
            );
            return;
        }

        match event {
            NodeEvent::Message(message) => self.handle_node_message(message).await,
            NodeEvent::Exited(status) => self.handle_exit(status).await,
        }
    }

    async fn handle_node_message(&mut self, message: NodeMessage) {
        log::info!("Node: received message {:?}", message);
        match message {
            NodeMessage::Started => {}
            NodeMessage::ReplyPort(port) => {
                if let Err(e) = self.handle_reply_port(port) {
                    log::error!("Failed to handle reply port {}: {}", port, e);
                    self.handle_error(None, None);
                    self.abandon_node().await;
                }
            }
            NodeMessage::FaultInjections(faults) => {
                log::info!("Node: the following injected faults are active: {:?}", faults);
                self.injected_faults = faults;
            }
        }
    }

    /// Build the TLS config for `port` and move from STARTING to RUNNING
    fn handle_reply_port(&mut self, port: u16) -> Result<(), SupervisorError> {
        let tls_config = if self.config.is_selfnode() {
            TlsConfig::local(port)
        } else {
            let dir = self.config.tls_client_dir();
            let read = |name: &str| {
                let path = dir.join(name);
                self.actions
                    .read_file(&path)
                    .map_err(|source| SupervisorError::Tls { path, source })
            };
            TlsConfig {
                ca: read("ca.crt")?,
                key: read("client.key")?,
                cert: read("client.pem")?,
                hostname: "localhost".to_string(),
                port,
            }
        };
        self.tls_config = Some(tls_config);

        if self.state == NodeState::Starting {
            self.change_to_state(NodeState::Running, None);
            self.broadcast_tls_config();
            self.startup_tries = 0;
        }
        Ok(())
    }

    /// Classify an exit once the process is really gone
    async fn handle_exit(&mut self, status: ExitStatus) {
        log::info!(
            "Node exited: code={:?}, signal={:?}",
            status.code,
            status.signal
        );
        if self.state == NodeState::Running {
            self.change_to_state(NodeState::Exiting, None);
        }

        let timeout = self.config.shutdown_timeout();
        if self.wait_for_node_process_to_exit(timeout).await.is_err() {
            log::error!(
                "Node sent exit code {:?} but was still running after {}ms. Killing it now.",
                status.code,
                timeout.as_millis()
            );
            if let Some(pid) = self.pid() {
                if let Err(e) = self.ensure_process_is_not_running(pid, &self.config).await {
                    log::info!("Node did not exit correctly: {}", e);
                }
            }
        }
        log::info!(
            "Node process really exited: code={:?}, signal={:?}",
            status.code,
            status.signal
        );

        let next = if self.state == NodeState::Stopping {
            NodeState::Stopped
        } else if self.state == NodeState::Updating && status.code == Some(NODE_UPDATE_EXIT_CODE) {
            NodeState::Updated
        } else if self.is_unrecoverable() {
            NodeState::Unrecoverable
        } else {
            NodeState::Crashed
        };

        self.store_process_states();
        self.reset();
        self.change_to_state(next, Some(status));
    }

    /// ERRORED while retries remain, UNRECOVERABLE otherwise
    fn handle_error(&mut self, code: Option<i32>, signal: Option<i32>) -> ErrorOutcome {
        log::error!("Node error: code={:?}, signal={:?}", code, signal);
        if self.is_unrecoverable() {
            self.change_to_state(NodeState::Unrecoverable, None);
            ErrorOutcome::Unrecoverable
        } else {
            self.change_to_state(NodeState::Errored, Some(ExitStatus { code, signal }));
            ErrorOutcome::Retry
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// One start attempt: STARTING, launch, wait for the reply port
    async fn start_attempt(&mut self) -> Result<(), SupervisorError> {
        // Leftovers of a failed previous attempt
        self.store_process_states();
        self.reset();

        self.startup_tries += 1;
        self.change_to_state(NodeState::Starting, None);
        log::info!(
            "Trying to start node for the {} time",
            self.startup_tries
        );

        let log_dir = self.config.log_directory();
        let node_log = LogSink::open(&log_dir, "node.log")
            .map_err(|e| SupervisorError::launch(format!("Failed to open node log: {}", e)))?;
        let wallet_log = LogSink::open(&log_dir, "wallet.log")
            .map_err(|e| SupervisorError::launch(format!("Failed to open wallet log: {}", e)))?;
        let node_log = Arc::new(node_log);
        let wallet_log = Arc::new(wallet_log);
        self.node_log = Some(node_log.clone());
        self.wallet_log = Some(wallet_log.clone());

        self.generation += 1;
        let generation = self.generation;
        let request = LaunchRequest {
            config: self.config.clone(),
            node_log,
            wallet_log,
            events: EventSender::new(generation, self.events_tx.clone()),
        };

        let mut handle = self.launcher.launch(request).await?;
        log::info!("Starting node now (PID {:?})...", handle.pid());
        let started = handle.start().await;
        let pid = handle.pid();
        let wallet_pid = handle.wallet_pid();
        self.node = Some(ManagedProcess { handle, generation });

        match started {
            Ok(port) => {
                log::info!("Node child process spawned with PID {:?}", pid);
                if let Some(wallet_pid) = wallet_pid {
                    log::info!("Wallet backend child process spawned with PID {}", wallet_pid);
                }
                self.handle_reply_port(port)
            }
            Err(status) => Err(SupervisorError::LaunchFailed {
                reason: "Error while spawning node".to_string(),
                code: status.code,
                signal: status.signal,
            }),
        }
    }

    /// Request a graceful stop and wait for the process to be gone
    async fn stop_gracefully(&mut self, timeout: Duration) -> Result<(), SupervisorError> {
        if let Some(node) = self.node.as_mut() {
            match tokio::time::timeout(timeout, node.handle.stop(timeout)).await {
                Ok(result) => result?,
                Err(_) => return Err(SupervisorError::ShutdownTimeout { timeout }),
            }
        }
        self.wait_for_node_process_to_exit(timeout)
            .await
            .map_err(|_| SupervisorError::ShutdownTimeout { timeout })
    }

    /// Stop a connected node and make sure it is gone before a restart
    async fn prepare_restart(&mut self) -> Result<RestartAction, SupervisorError> {
        if self.is_connected() {
            log::info!("Node restart: stopping current node");
            self.stop().await?;
        }
        log::info!("Node restart: restarting node with previous config");
        self.wait_for_exit_or_kill(self.config.shutdown_timeout())
            .await?;

        if self.exit_on_stop {
            log::info!("Node restart: exiting application with code 0");
            self.actions.exit_application(0);
            return Ok(RestartAction::ExitApplication);
        }
        Ok(RestartAction::Start)
    }

    /// Kill whatever is left of a failed attempt without changing state
    async fn abandon_node(&mut self) {
        let Some(node) = self.node.as_mut() else {
            return;
        };
        node.handle.kill();
        if let Err(e) = self.wait_for_exit_or_kill(self.config.kill_timeout()).await {
            log::error!("Failed to kill node of failed start attempt: {}", e);
        }
        self.store_process_states();
        self.reset();
    }

    /// ERRORED unless the failure was already reported
    fn fail_restart(&mut self, error: &SupervisorError) {
        log::error!("Could not restart node: {}", error);
        if !matches!(self.state, NodeState::Errored | NodeState::Unrecoverable) {
            self.change_to_state(NodeState::Errored, None);
        }
    }

    /// Refuse while connected; kill an orphan from a previous session
    async fn can_be_started(&self, config: &SupervisorConfig) -> bool {
        if self.is_connected() {
            return false;
        }
        match self.ensure_previous_node_is_not_running(config).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Previous node could not be verified stopped: {}", e);
                false
            }
        }
    }

    async fn ensure_previous_node_is_not_running(
        &self,
        config: &SupervisorConfig,
    ) -> Result<(), SupervisorError> {
        let key = config.previous_pid_key();
        let previous_pid = self.store.get(&key)?;
        log::info!(
            "Checking if previous node process is still running (PID: {:?})",
            previous_pid
        );
        match previous_pid {
            Some(pid) => self.ensure_process_is_not_running(pid, config).await,
            None => Ok(()),
        }
    }

    async fn ensure_process_is_not_running(
        &self,
        pid: u32,
        config: &SupervisorConfig,
    ) -> Result<(), SupervisorError> {
        let name = config.process_name();
        log::info!("Checking if {} process (PID: {}) is still running", name, pid);

        if !self.inspector.is_process_running(pid, name) {
            log::info!("No {} process (PID: {}) is running", name, pid);
            return Ok(());
        }

        log::info!("Killing {} process (PID: {})", name, pid);
        self.kill_process_with_name(pid, config).await.map_err(|e| {
            log::error!("Could not kill {} process (PID: {}): {}", name, pid, e);
            SupervisorError::KillFailed { pid: Some(pid) }
        })
    }

    async fn kill_process_with_name(
        &self,
        pid: u32,
        config: &SupervisorConfig,
    ) -> Result<(), ConditionTimeout> {
        let name = config.process_name();
        if let Err(e) = self.terminator.kill(pid) {
            log::error!("Kill request for {} process (PID: {}) failed: {}", name, pid, e);
        }

        let inspector = &self.inspector;
        poll_until(
            move || async move { !inspector.is_process_running(pid, name) },
            config.kill_timeout(),
            config.poll_interval(),
        )
        .await?;

        log::info!("Successfully killed {} process (PID: {})", name, pid);
        Ok(())
    }

    fn is_node_process_still_running(&self) -> bool {
        match self.pid() {
            Some(pid) => self
                .inspector
                .is_process_running(pid, self.config.process_name()),
            None => false,
        }
    }

    fn is_dead(&self) -> bool {
        !self.is_connected() && !self.is_node_process_still_running()
    }

    fn is_unrecoverable(&self) -> bool {
        self.startup_tries >= self.config.startup_max_retries
    }

    async fn wait_for_node_process_to_exit(&self, timeout: Duration) -> Result<(), ConditionTimeout> {
        let this = self;
        poll_until(
            move || async move { !this.is_node_process_still_running() },
            timeout,
            self.config.poll_interval(),
        )
        .await
    }

    /// Wait up to `timeout` for the current node to exit, then kill it by PID
    async fn wait_for_exit_or_kill(&self, timeout: Duration) -> Result<(), SupervisorError> {
        if !self.is_node_process_still_running() {
            return Ok(());
        }
        if self.wait_for_node_process_to_exit(timeout).await.is_ok() {
            return Ok(());
        }
        log::info!("Checking if current node process is still running");
        match self.pid() {
            Some(pid) => self.ensure_process_is_not_running(pid, &self.config).await,
            None => Ok(()),
        }
    }

    /// Handle events until the state is `target` or `timeout` elapses
    async fn wait_for_state(
        &mut self,
        target: NodeState,
        timeout: Duration,
    ) -> Result<(), ConditionTimeout> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state == target {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ConditionTimeout(timeout));
            }
            self.pump_events(self.config.poll_interval().min(deadline - now))
                .await;
        }
    }

    /// Handle every queued event, returning whether there was any
    async fn drain_events(&mut self) -> bool {
        let mut handled = false;
        while let Ok((generation, event)) = self.events_rx.try_recv() {
            self.handle_event(generation, event).await;
            handled = true;
        }
        handled
    }

    /// Handle queued events, waiting up to `wait` for one if none is queued
    async fn pump_events(&mut self, wait: Duration) {
        if self.drain_events().await {
            return;
        }

        let event = tokio::time::timeout(wait, self.events_rx.recv()).await;
        if let Ok(Some((generation, event))) = event {
            self.handle_event(generation, event).await;
        }
    }

    /// Persist the node PID for orphan detection after a restart
    fn store_process_states(&self) {
        let Some(pid) = self.pid() else {
            return;
        };
        let key = self.config.previous_pid_key();
        log::info!("Storing last node PID {}", pid);
        match self.store.set(&key, pid) {
            Ok(()) => log::info!("{} stored successfully", key),
            Err(e) => log::error!("Failed to store {}: {}", key, e),
        }
    }

    /// Drop the process handle, close the log sinks and clear the TLS config
    fn reset(&mut self) {
        if let Some(sink) = self.node_log.take() {
            sink.close();
        }
        if let Some(sink) = self.wallet_log.take() {
            sink.close();
        }
        self.node = None;
        if self.tls_config.take().is_some() {
            self.actions.broadcast_tls_config(None);
        }
    }

    fn change_to_state(&mut self, state: NodeState, exit: Option<ExitStatus>) {
        log::info!("Node transitions to <{}>", state);
        self.state = state;
        self.actions.broadcast_state_change(state);

        let ExitStatus { code, signal } = exit.unwrap_or_default();
        let transitions = &self.transitions;
        match state {
            NodeState::Starting => transitions.on_starting(),
            NodeState::Running => transitions.on_running(),
            NodeState::Stopping => transitions.on_stopping(),
            NodeState::Stopped => transitions.on_stopped(),
            NodeState::Updating => transitions.on_updating(),
            NodeState::Updated => transitions.on_updated(),
            NodeState::Crashed => transitions.on_crashed(code, signal),
            NodeState::Errored => transitions.on_error(code, signal),
            NodeState::Unrecoverable => transitions.on_unrecoverable(),
            NodeState::Exiting => {}
        }
    }
}
