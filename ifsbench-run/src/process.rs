//! Process Control
//!
//! A launched run is a child process leading its own process group, so MPI
//! launchers and everything they fork can be signalled together.

use ifsbench_spec::LaunchCommand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured standard output of a run
pub const STDOUT_FILE: &str = "stdout.log";

/// Captured standard error of a run
pub const STDERR_FILE: &str = "stderr.log";

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, when the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, when killed
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Send `signal` to every process in group `pgid`
fn signal_group(pgid: u32, signal: libc::c_int) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Running child process
pub struct ProcessHandle {
    child: Child,
    started: Instant,
}

impl ProcessHandle {
    /// Spawn `command` in `workdir`, redirecting output to the log files there
    pub fn spawn(command: &LaunchCommand, workdir: &Path) -> Result<Self, std::io::Error> {
        let stdout = File::create(workdir.join(STDOUT_FILE))?;
        let stderr = File::create(workdir.join(STDERR_FILE))?;

        let child = Command::new(&command.program)
            .args(&command.args)
            .env_clear()
            .envs(&command.env)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()?;

        debug!(pid = child.id(), program = %command.program, "Spawned run process");
        Ok(Self {
            child,
            started: Instant::now(),
        })
    }

    /// Process id (also the process group id)
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Time since spawn
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Exit status if the process has finished
    pub fn try_wait(&mut self) -> Result<Option<ExitInfo>, std::io::Error> {
        Ok(self.child.try_wait()?.map(ExitInfo::from))
    }

    /// Check if the process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM the group, wait up to `grace`, then SIGKILL.
    ///
    /// Returns the exit status of the lead process.
    pub fn terminate(&mut self, grace: Duration, poll_interval: Duration) -> ExitInfo {
        let pid = self.id();
        if let Err(e) = signal_group(pid, libc::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM not delivered");
        }

        // A grace period too long to represent never runs out
        let deadline = Instant::now().checked_add(grace);
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    // Stragglers in the group may outlive the leader
                    let _ = signal_group(pid, libc::SIGKILL);
                    return status.into();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pid, error = %e, "Failed to poll process");
                    break;
                }
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => poll_interval,
            };
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(poll_interval));
        }

        debug!(pid, "Grace period over, sending SIGKILL");
        if signal_group(pid, libc::SIGKILL).is_err() {
            let _ = self.child.kill();
        }
        match self.child.wait() {
            Ok(status) => status.into(),
            Err(e) => {
                warn!(pid, error = %e, "Failed to reap process");
                ExitInfo {
                    code: None,
                    signal: Some(libc::SIGKILL),
                }
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let pid = self.id();
            let _ = signal_group(pid, libc::SIGTERM);
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = signal_group(pid, libc::SIGKILL);
            }
            let _ = self.child.wait();
        }
    }
}

/// Last `lines` lines of a text file (empty if unreadable, invalid UTF-8 replaced)
pub fn tail(path: &Path, lines: usize) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsbench_spec::EnvMap;

    fn shell(script: &str) -> LaunchCommand {
        LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: EnvMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
        }
    }

    fn wait(handle: &mut ProcessHandle) -> ExitInfo {
        loop {
            if let Some(exit) = handle.try_wait().unwrap() {
                return exit;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_output_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = ProcessHandle::spawn(&shell("echo out; echo err >&2; exit 3"), dir.path()).unwrap();
        let exit = wait(&mut handle);
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        assert_eq!(std::fs::read_to_string(dir.path().join(STDOUT_FILE)).unwrap(), "out\n");
        assert_eq!(tail(&dir.path().join(STDERR_FILE), 5), "err");
    }

    #[test]
    fn test_environment_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = shell("echo \"$ONLY_THIS:${HOME:-unset}\"");
        cmd.env.insert("ONLY_THIS".to_string(), "yes".to_string());
        let mut handle = ProcessHandle::spawn(&cmd, dir.path()).unwrap();
        assert!(wait(&mut handle).success());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(STDOUT_FILE)).unwrap(),
            "yes:unset\n"
        );
    }

    #[test]
    fn test_terminate_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = ProcessHandle::spawn(&shell("trap '' TERM; sleep 30"), dir.path()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let exit = handle.terminate(Duration::from_millis(200), Duration::from_millis(20));
        assert_eq!(exit.signal, Some(libc::SIGKILL));
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();
        assert_eq!(tail(&path, 2), "c\nd");
        assert_eq!(tail(&dir.path().join("missing"), 2), "");
    }

    #[test]
    fn test_tail_of_binary_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, b"header\n\xff\xfe ABORT\nMPI_ABORT called\n").unwrap();
        assert_eq!(tail(&path, 2), "\u{fffd}\u{fffd} ABORT\nMPI_ABORT called");
    }

    #[test]
    fn test_terminate_with_unbounded_grace() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = ProcessHandle::spawn(&shell("sleep 30"), dir.path()).unwrap();
        let exit = handle.terminate(Duration::MAX, Duration::from_millis(20));
        assert_eq!(exit.signal, Some(libc::SIGTERM));
    }
}
