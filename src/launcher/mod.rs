//! Node launcher abstraction
//!
//! Provides a trait for node lifecycle operations implemented by two
//! backends: direct local processes and docker containers. The
//! orchestrator only talks to the trait.

mod docker;
mod process;

pub use docker::DockerLauncher;
pub use process::ProcessLauncher;

use crate::error::HydraResult;
use crate::plugin::ExecutionMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Handle to a started node, persisted in devnet metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHandle {
    /// Local process id
    Pid(u32),
    /// Container id or name
    Container(String),
}

/// Everything a launcher needs to start one node.
///
/// Port values are informational here: the node's own listen config is
/// written into its home directory during genesis; container mode uses
/// them for port publishing.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub index: u8,
    pub chain_id: String,
    /// Node home directory (config, keys, data)
    pub home: PathBuf,
    /// Node binary to exec (process mode)
    pub binary: PathBuf,
    /// Container image (container mode)
    pub image: Option<String>,
    pub rpc_port: u16,
    pub evm_port: u16,
    /// Where the node's output is written
    pub log_path: PathBuf,
}

/// Abstract node lifecycle interface
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    /// Check if the backend is usable on this system
    async fn is_available(&self) -> HydraResult<bool>;

    /// Start a node and return its handle
    async fn start(&self, spec: &NodeSpec) -> HydraResult<NodeHandle>;

    /// Request graceful termination
    async fn signal_stop(&self, handle: &NodeHandle) -> HydraResult<()>;

    /// Terminate immediately
    async fn kill(&self, handle: &NodeHandle) -> HydraResult<()>;

    /// Whether the node is still alive
    async fn is_running(&self, handle: &NodeHandle) -> HydraResult<bool>;

    /// Last `lines` lines of the node's output
    async fn log_tail(
        &self,
        spec: &NodeSpec,
        handle: Option<&NodeHandle>,
        lines: usize,
    ) -> HydraResult<String>;

    /// Human-readable backend name
    fn launcher_name(&self) -> &'static str;
}

/// Create the launcher for an execution mode
pub fn create_launcher(mode: ExecutionMode) -> Box<dyn NodeLauncher> {
    match mode {
        ExecutionMode::Process => Box::new(ProcessLauncher::new()),
        ExecutionMode::Container => Box::new(DockerLauncher::new()),
    }
}
