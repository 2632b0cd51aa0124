//! In-memory collaborators for supervisor tests

use super::callbacks::{StateTransitions, SupervisorActions};
use super::error::SupervisorError;
use super::ipc::{FaultInjectionRequest, NodeMessage, OutgoingIpcMessage};
use super::launcher::{EventSender, ExitStatus, LaunchRequest, Launcher, NodeEvent, NodeProcess};
use super::process::{ProcessInspector, ProcessTerminator};
use super::state::{NodeState, TlsConfig};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MOCK_PORT: u16 = 8090;

/// Fake OS process table shared by launcher, inspector and terminator
#[derive(Debug, Clone, Default)]
pub struct ProcessTable(Arc<Mutex<HashSet<u32>>>);

impl ProcessTable {
    pub fn insert(&self, pid: u32) {
        self.0.lock().unwrap().insert(pid);
    }

    pub fn remove(&self, pid: u32) {
        self.0.lock().unwrap().remove(&pid);
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.0.lock().unwrap().contains(&pid)
    }
}

pub struct MockInspector {
    table: ProcessTable,
}

impl MockInspector {
    pub fn new(table: ProcessTable) -> Self {
        Self { table }
    }
}

impl ProcessInspector for MockInspector {
    fn is_process_running(&self, pid: u32, _name: &str) -> bool {
        self.table.contains(pid)
    }
}

pub struct MockTerminator {
    table: ProcessTable,
    effective: AtomicBool,
    kills: Mutex<Vec<u32>>,
}

impl MockTerminator {
    pub fn new(table: ProcessTable) -> Self {
        Self {
            table,
            effective: AtomicBool::new(true),
            kills: Mutex::new(Vec::new()),
        }
    }

    /// When false, signals are accepted but processes keep running
    pub fn set_effective(&self, effective: bool) {
        self.effective.store(effective, Ordering::SeqCst);
    }

    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }
}

impl ProcessTerminator for MockTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        if self.effective.load(Ordering::SeqCst) {
            self.table.remove(pid);
        }
        Ok(())
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        self.kills.lock().unwrap().push(pid);
        if self.effective.load(Ordering::SeqCst) {
            self.table.remove(pid);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingActions {
    /// States and TLS broadcasts in emission order
    timeline: Mutex<Vec<String>>,
    states: Mutex<Vec<NodeState>>,
    tls: Mutex<Vec<Option<TlsConfig>>>,
    exits: Mutex<Vec<i32>>,
}

impl RecordingActions {
    pub fn states(&self) -> Vec<NodeState> {
        self.states.lock().unwrap().clone()
    }

    pub fn tls_broadcasts(&self) -> Vec<Option<TlsConfig>> {
        self.tls.lock().unwrap().clone()
    }

    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    pub fn exit_codes(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }
}

impl SupervisorActions for RecordingActions {
    fn broadcast_state_change(&self, state: NodeState) {
        self.states.lock().unwrap().push(state);
        self.timeline.lock().unwrap().push(format!("state:{}", state));
    }

    fn broadcast_tls_config(&self, config: Option<&TlsConfig>) {
        self.tls.lock().unwrap().push(config.cloned());
        let entry = if config.is_some() { "tls:some" } else { "tls:none" };
        self.timeline.lock().unwrap().push(entry.to_string());
    }

    fn exit_application(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

type ExitInfo = (Option<i32>, Option<i32>);

#[derive(Default)]
pub struct RecordingTransitions {
    calls: Mutex<Vec<&'static str>>,
    crashes: Mutex<Vec<ExitInfo>>,
    errors: Mutex<Vec<ExitInfo>>,
}

impl RecordingTransitions {
    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn crash_codes(&self) -> Vec<ExitInfo> {
        self.crashes.lock().unwrap().clone()
    }

    pub fn error_codes(&self) -> Vec<ExitInfo> {
        self.errors.lock().unwrap().clone()
    }
}

impl StateTransitions for RecordingTransitions {
    fn on_starting(&self) {
        self.record("starting");
    }
    fn on_running(&self) {
        self.record("running");
    }
    fn on_stopping(&self) {
        self.record("stopping");
    }
    fn on_stopped(&self) {
        self.record("stopped");
    }
    fn on_updating(&self) {
        self.record("updating");
    }
    fn on_updated(&self) {
        self.record("updated");
    }
    fn on_crashed(&self, code: Option<i32>, signal: Option<i32>) {
        self.record("crashed");
        self.crashes.lock().unwrap().push((code, signal));
    }
    fn on_error(&self, code: Option<i32>, signal: Option<i32>) {
        self.record("error");
        self.errors.lock().unwrap().push((code, signal));
    }
    fn on_unrecoverable(&self) {
        self.record("unrecoverable");
    }
}

/// How a running mock node reacts to requests
#[derive(Debug, Clone)]
pub struct MockNodeOptions {
    pub stop_hangs: bool,
    pub stop_fails: bool,
    pub ignore_kill: bool,
    pub confirm_faults: bool,
}

impl Default for MockNodeOptions {
    fn default() -> Self {
        Self {
            stop_hangs: false,
            stop_fails: false,
            ignore_kill: false,
            confirm_faults: true,
        }
    }
}

/// How the next launched mock node behaves
#[derive(Debug, Clone)]
pub enum LaunchBehavior {
    SpawnFails,
    /// Node and wallet exit during startup
    StartFails { code: Option<i32> },
    /// Node and wallet keep running but never become ready
    StartTimesOut,
    Succeed(MockNodeOptions),
}

impl LaunchBehavior {
    fn healthy() -> Self {
        LaunchBehavior::Succeed(MockNodeOptions::default())
    }
}

#[derive(Default)]
struct MockStats {
    stop_calls: AtomicU32,
    kill_calls: AtomicU32,
}

/// Launcher handing out scripted mock nodes; healthy once the script is empty
pub struct MockLauncher {
    table: ProcessTable,
    script: Mutex<VecDeque<LaunchBehavior>>,
    next_pid: AtomicU32,
    launches: AtomicU32,
    stats: Arc<MockStats>,
    last: Mutex<Option<(u32, EventSender)>>,
    spawned: Mutex<Vec<u32>>,
}

impl MockLauncher {
    pub fn new(table: ProcessTable) -> Self {
        Self {
            table,
            script: Mutex::new(VecDeque::new()),
            next_pid: AtomicU32::new(1000),
            launches: AtomicU32::new(0),
            stats: Arc::new(MockStats::default()),
            last: Mutex::new(None),
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// Node and wallet PIDs of every launch
    pub fn spawned_pids(&self) -> Vec<u32> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn script(&self, behaviors: Vec<LaunchBehavior>) {
        self.script.lock().unwrap().extend(behaviors);
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stats.stop_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> u32 {
        self.stats.kill_calls.load(Ordering::SeqCst)
    }

    /// Make the last launched node exit on its own
    pub fn crash_last(&self, code: Option<i32>, signal: Option<i32>) {
        if let Some((pid, events)) = self.last.lock().unwrap().as_ref() {
            self.table.remove(*pid);
            self.table.remove(*pid + 1);
            events.send(NodeEvent::Exited(ExitStatus { code, signal }));
        }
    }

    /// The last launched node is gone without reporting it
    pub fn remove_last_from_table(&self) {
        if let Some((pid, _)) = self.last.lock().unwrap().as_ref() {
            self.table.remove(*pid);
            self.table.remove(*pid + 1);
        }
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn NodeProcess>, SupervisorError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(LaunchBehavior::healthy);
        if let LaunchBehavior::SpawnFails = behavior {
            return Err(SupervisorError::launch("mock spawn failure"));
        }

        let pid = self.next_pid.fetch_add(2, Ordering::SeqCst);
        let wallet_pid = pid + 1;
        self.table.insert(pid);
        self.table.insert(wallet_pid);
        self.spawned.lock().unwrap().extend([pid, wallet_pid]);
        *self.last.lock().unwrap() = Some((pid, request.events.clone()));

        Ok(Box::new(MockNode {
            pid,
            wallet_pid,
            table: self.table.clone(),
            events: request.events,
            behavior,
            connected: false,
            faults: Vec::new(),
            stats: self.stats.clone(),
        }))
    }
}

struct MockNode {
    pid: u32,
    wallet_pid: u32,
    table: ProcessTable,
    events: EventSender,
    behavior: LaunchBehavior,
    connected: bool,
    faults: Vec<String>,
    stats: Arc<MockStats>,
}

impl MockNode {
    fn options(&self) -> MockNodeOptions {
        match &self.behavior {
            LaunchBehavior::Succeed(options) => options.clone(),
            _ => MockNodeOptions::default(),
        }
    }

    fn exit(&self, status: ExitStatus) {
        self.table.remove(self.pid);
        self.table.remove(self.wallet_pid);
        self.events.send(NodeEvent::Exited(status));
    }
}

#[async_trait]
impl NodeProcess for MockNode {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn wallet_pid(&self) -> Option<u32> {
        Some(self.wallet_pid)
    }

    fn is_connected(&self) -> bool {
        self.connected && self.table.contains(self.pid)
    }

    async fn start(&mut self) -> Result<u16, ExitStatus> {
        match self.behavior {
            LaunchBehavior::StartFails { code } => {
                let status = ExitStatus { code, signal: None };
                self.exit(status);
                Err(status)
            }
            LaunchBehavior::StartTimesOut => Err(ExitStatus::default()),
            _ => {
                self.connected = true;
                Ok(MOCK_PORT)
            }
        }
    }

    async fn stop(&mut self, _timeout: Duration) -> Result<(), SupervisorError> {
        self.stats.stop_calls.fetch_add(1, Ordering::SeqCst);
        let options = self.options();
        if options.stop_hangs {
            std::future::pending::<()>().await;
        }
        if options.stop_fails {
            return Err(SupervisorError::Ipc("mock stop request failed".to_string()));
        }
        self.connected = false;
        self.exit(ExitStatus {
            code: Some(0),
            signal: None,
        });
        Ok(())
    }

    fn kill(&mut self) {
        self.stats.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        if self.options().ignore_kill {
            return;
        }
        self.exit(ExitStatus {
            code: None,
            signal: Some(9),
        });
    }

    async fn send(&mut self, message: &OutgoingIpcMessage) -> Result<(), SupervisorError> {
        let OutgoingIpcMessage::SetFInject(FaultInjectionRequest(fault, enabled)) = message;
        if !self.options().confirm_faults {
            return Ok(());
        }

        self.faults.retain(|f| f != fault);
        if *enabled {
            self.faults.push(fault.clone());
        }
        self.events
            .send(NodeEvent::Message(NodeMessage::FaultInjections(self.faults.clone())));
        Ok(())
    }
}
