//! OS process inspection and termination
//!
//! Used to detect orphaned nodes from a previous session and to confirm
//! that a process is really gone after it reported its exit.

use std::io;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Linux truncates process names to 15 bytes
const MAX_KERNEL_NAME_LEN: usize = 15;

/// Answers whether a process with a given PID and name is alive
pub trait ProcessInspector: Send + Sync {
    fn is_process_running(&self, pid: u32, name: &str) -> bool;
}

/// Process inspector backed by sysinfo
#[derive(Debug, Default)]
pub struct SysinfoInspector;

impl SysinfoInspector {
    pub fn new() -> Self {
        Self
    }
}

/// Compare an OS-reported process name with the expected one
fn name_matches(actual: &str, expected: &str) -> bool {
    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    if actual == expected {
        return true;
    }
    actual.len() >= MAX_KERNEL_NAME_LEN && expected.starts_with(&actual)
}

impl ProcessInspector for SysinfoInspector {
    fn is_process_running(&self, pid: u32, name: &str) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new(),
        );

        match sys.process(pid) {
            Some(process) => {
                // An unreaped child is dead for our purposes
                if process.status() == ProcessStatus::Zombie {
                    return false;
                }
                name_matches(&process.name().to_string_lossy(), name)
            }
            None => false,
        }
    }
}

/// Platform capability to end a process by PID
pub trait ProcessTerminator: Send + Sync {
    /// Ask the process to shut down
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forcefully end the process
    fn kill(&self, pid: u32) -> io::Result<()>;
}

/// POSIX signal based terminator
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct SignalTerminator;

#[cfg(unix)]
impl SignalTerminator {
    fn signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PID out of range"))?;
        // SAFETY: kill(2) has no memory safety preconditions
        let result = unsafe { libc::kill(pid, signal) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(unix)]
impl ProcessTerminator for SignalTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        log::info!("Sending SIGTERM to PID {}", pid);
        Self::signal(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        log::info!("Sending SIGKILL to PID {}", pid);
        Self::signal(pid, libc::SIGKILL)
    }
}

/// Windows terminator using `taskkill` on the whole process tree
#[derive(Debug, Default)]
pub struct TaskkillTerminator;

impl TaskkillTerminator {
    /// Arguments passed to `taskkill`
    fn args(pid: u32, force: bool) -> Vec<String> {
        let mut args = vec!["/pid".to_string(), pid.to_string(), "/t".to_string()];
        if force {
            args.push("/f".to_string());
        }
        args
    }

    fn run(pid: u32, force: bool) -> io::Result<()> {
        let args = Self::args(pid, force);
        log::info!("Using kill command: taskkill {}", args.join(" "));

        let mut cmd = std::process::Command::new("taskkill");
        cmd.args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {}", status),
            ))
        }
    }
}

impl ProcessTerminator for TaskkillTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        Self::run(pid, false)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        Self::run(pid, true)
    }
}

/// Terminator for the current target OS
pub fn default_terminator() -> Box<dyn ProcessTerminator> {
    #[cfg(unix)]
    {
        Box::new(SignalTerminator)
    }

    #[cfg(not(unix))]
    {
        Box::new(TaskkillTerminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches() {
        assert!(name_matches("bcc-node", "bcc-node"));
        assert!(name_matches("BCC-NODE.EXE", "bcc-node.exe"));
        assert!(!name_matches("bcc-wallet", "bcc-node"));
        // kernel-truncated comm name
        assert!(name_matches("local-cluster-n", "local-cluster-node"));
        assert!(!name_matches("local", "local-cluster"));
    }

    #[test]
    fn test_current_process_is_running() {
        let inspector = SysinfoInspector::new();
        let pid = std::process::id();

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::new(),
        );
        let name = sys
            .process(Pid::from_u32(pid))
            .map(|p| p.name().to_string_lossy().to_string())
            .unwrap();

        assert!(inspector.is_process_running(pid, &name));
        assert!(!inspector.is_process_running(pid, "definitely-not-this-process"));
    }

    #[test]
    fn test_taskkill_args() {
        assert_eq!(TaskkillTerminator::args(42, true), vec!["/pid", "42", "/t", "/f"]);
        assert_eq!(TaskkillTerminator::args(42, false), vec!["/pid", "42", "/t"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_unknown_pid_fails() {
        // PIDs near the i32 limit are never allocated
        assert!(SignalTerminator.terminate(i32::MAX as u32 - 1).is_err());
    }
}
