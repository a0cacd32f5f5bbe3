//! Local process launcher
//!
//! Runs node binaries as detached local processes with output redirected
//! to a per-node log file. Termination is delivered with POSIX signals so
//! nodes survive the orchestrating process and can be stopped by a later
//! invocation holding only the recorded pid.

use crate::error::{HydraError, HydraResult};
use crate::launcher::{NodeHandle, NodeLauncher, NodeSpec};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Node launcher using direct local processes
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Create a new process launcher
    pub fn new() -> Self {
        Self
    }

    fn pid_of(handle: &NodeHandle) -> HydraResult<i32> {
        match handle {
            NodeHandle::Pid(pid) => Ok(*pid as i32),
            NodeHandle::Container(id) => Err(HydraError::Internal(format!(
                "process launcher got container handle {id}"
            ))),
        }
    }

    /// Deliver a signal, treating an already-exited process as success
    fn send_signal(pid: i32, signal: libc::c_int) -> HydraResult<()> {
        // SAFETY: kill with a valid signal number has no memory effects
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!("Process {pid} already gone");
            return Ok(());
        }
        Err(HydraError::io(format!("signaling pid {pid}"), err))
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeLauncher for ProcessLauncher {
    async fn is_available(&self) -> HydraResult<bool> {
        Ok(cfg!(unix))
    }

    async fn start(&self, spec: &NodeSpec) -> HydraResult<NodeHandle> {
        let log_file = std::fs::File::create(&spec.log_path)
            .map_err(|e| HydraError::io(format!("creating {}", spec.log_path.display()), e))?;
        let log_clone = log_file
            .try_clone()
            .map_err(|e| HydraError::io("cloning log handle", e))?;

        let child = Command::new(&spec.binary)
            .arg("start")
            .arg("--home")
            .arg(&spec.home)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_clone))
            .spawn()
            .map_err(|e| {
                HydraError::NodeStart(format!("spawning {}: {e}", spec.binary.display()))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| HydraError::NodeStart("child exited before pid was read".to_string()))?;

        info!(
            "Started node {} for {} (pid {pid})",
            spec.index, spec.chain_id
        );

        // The child is intentionally left unawaited: the node outlives
        // this call and is managed through its pid from here on.
        drop(child);

        Ok(NodeHandle::Pid(pid))
    }

    async fn signal_stop(&self, handle: &NodeHandle) -> HydraResult<()> {
        let pid = Self::pid_of(handle)?;
        debug!("Sending SIGTERM to pid {pid}");
        Self::send_signal(pid, libc::SIGTERM)
    }

    async fn kill(&self, handle: &NodeHandle) -> HydraResult<()> {
        let pid = Self::pid_of(handle)?;
        debug!("Sending SIGKILL to pid {pid}");
        Self::send_signal(pid, libc::SIGKILL)
    }

    async fn is_running(&self, handle: &NodeHandle) -> HydraResult<bool> {
        let pid = Self::pid_of(handle)?;
        // Signal 0 probes existence without delivering anything
        let rc = unsafe { libc::kill(pid, 0) };
        if rc != 0 {
            return Ok(false);
        }

        // A zombie answers the probe but is already dead
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => Ok(!is_zombie_stat(&stat)),
            Err(_) => Ok(true),
        }
    }

    async fn log_tail(
        &self,
        spec: &NodeSpec,
        _handle: Option<&NodeHandle>,
        lines: usize,
    ) -> HydraResult<String> {
        let content = match tokio::fs::read_to_string(&spec.log_path).await {
            Ok(content) => content,
            Err(_) => return Ok(String::new()),
        };
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].join("\n"))
    }

    fn launcher_name(&self) -> &'static str {
        "process"
    }
}

/// Parse the state field out of `/proc/<pid>/stat`.
///
/// The comm field is parenthesized and may itself contain spaces, so the
/// state is the first token after the last `)`.
fn is_zombie_stat(stat: &str) -> bool {
    stat.rsplit_once(')')
        .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        .unwrap_or(false)
}
