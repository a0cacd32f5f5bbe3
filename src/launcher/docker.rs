//! Docker container launcher
//!
//! Implements the NodeLauncher trait by shelling out to the docker CLI.
//! The node home directory is bind-mounted into the container and the
//! RPC/EVM ports are published to the host so health checks work the
//! same way in both execution modes.

use crate::error::{HydraError, HydraResult};
use crate::launcher::{NodeHandle, NodeLauncher, NodeSpec};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Mount point of the node home inside the container
const CONTAINER_HOME: &str = "/node";

/// Node launcher using the docker CLI
pub struct DockerLauncher;

impl DockerLauncher {
    /// Create a new docker launcher
    pub fn new() -> Self {
        Self
    }

    /// Deterministic container name for a node
    pub fn container_name(spec: &NodeSpec) -> String {
        format!("hydra-{}-node{}", spec.chain_id, spec.index)
    }

    /// Execute a docker command and return the output
    async fn exec(&self, args: &[&str]) -> HydraResult<std::process::Output> {
        debug!("Executing: docker {:?}", args);

        Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HydraError::command_failed(format!("docker {:?}", args), e))
    }

    fn container_of(handle: &NodeHandle) -> HydraResult<&str> {
        match handle {
            NodeHandle::Container(id) => Ok(id),
            NodeHandle::Pid(pid) => Err(HydraError::Internal(format!(
                "docker launcher got process handle {pid}"
            ))),
        }
    }
}

impl Default for DockerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeLauncher for DockerLauncher {
    async fn is_available(&self) -> HydraResult<bool> {
        Ok(Command::new("docker")
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false))
    }

    async fn start(&self, spec: &NodeSpec) -> HydraResult<NodeHandle> {
        let image = spec.image.as_deref().ok_or_else(|| {
            HydraError::NodeStart(format!(
                "container mode requires an image for node {}",
                spec.index
            ))
        })?;

        let name = Self::container_name(spec);
        let home_mount = format!("{}:{}", spec.home.display(), CONTAINER_HOME);
        let rpc_publish = format!("127.0.0.1:{0}:{0}", spec.rpc_port);
        let evm_publish = format!("127.0.0.1:{0}:{0}", spec.evm_port);

        let output = self
            .exec(&[
                "run",
                "-d",
                "--name",
                &name,
                "-v",
                &home_mount,
                "-p",
                &rpc_publish,
                "-p",
                &evm_publish,
                image,
                "start",
                "--home",
                CONTAINER_HOME,
            ])
            .await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!(
                "Started node {} for {} (container {})",
                spec.index,
                spec.chain_id,
                &container_id[..12.min(container_id.len())]
            );
            Ok(NodeHandle::Container(container_id))
        } else {
            Err(HydraError::NodeStart(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn signal_stop(&self, handle: &NodeHandle) -> HydraResult<()> {
        let container = Self::container_of(handle)?;
        debug!("Signaling container {container}");

        // Plain `docker stop` force-kills after its own grace period;
        // the orchestrator owns that deadline, so only deliver the signal.
        let output = self.exec(&["kill", "--signal", "TERM", container]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") || stderr.contains("is not running") {
                Ok(())
            } else {
                Err(HydraError::command_exec("docker kill --signal TERM", stderr))
            }
        }
    }

    async fn kill(&self, handle: &NodeHandle) -> HydraResult<()> {
        let container = Self::container_of(handle)?;
        debug!("Killing container {container}");

        let output = self.exec(&["rm", "-f", container]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") {
                Ok(())
            } else {
                Err(HydraError::command_exec("docker rm -f", stderr))
            }
        }
    }

    async fn is_running(&self, handle: &NodeHandle) -> HydraResult<bool> {
        let container = Self::container_of(handle)?;

        let output = self
            .exec(&["inspect", "-f", "{{.State.Running}}", container])
            .await?;

        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn log_tail(
        &self,
        _spec: &NodeSpec,
        handle: Option<&NodeHandle>,
        lines: usize,
    ) -> HydraResult<String> {
        let Some(handle) = handle else {
            return Ok(String::new());
        };
        let container = Self::container_of(handle)?;

        let output = self
            .exec(&["logs", "--tail", &lines.to_string(), container])
            .await?;

        // docker writes node output to both streams
        let mut tail = String::from_utf8_lossy(&output.stdout).into_owned();
        tail.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(tail.trim_end().to_string())
    }

    fn launcher_name(&self) -> &'static str {
        "docker"
    }
}
