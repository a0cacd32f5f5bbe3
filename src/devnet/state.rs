//! Devnet metadata persistence
//!
//! The devnet record lives at a fixed path under the devnet home and is
//! the source of truth across invocations. Loading and saving are
//! idempotent; optional fields default so older records keep loading.

use crate::error::{HydraError, HydraResult};
use crate::launcher::NodeHandle;
use crate::plugin::ExecutionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Metadata file name under the devnet home
pub const METADATA_FILE: &str = "devnet.json";

/// Network sources accepted when a plugin does not narrow the set
pub const ALLOWED_NETWORKS: &[&str] = &["mainnet", "testnet", "localnet"];

/// Validator count bounds
pub const MIN_VALIDATORS: u8 = 1;
pub const MAX_VALIDATORS: u8 = 4;

/// Devnet lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevnetStatus {
    Uninitialized,
    Provisioned,
    Running,
    Stopped,
    Destroyed,
}

/// Per-node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Failed,
    Stopped,
}

/// One validator node within a devnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Position within the devnet; node homes are `node<index>`
    pub index: u8,

    /// RPC (status endpoint) port on localhost
    pub rpc_port: u16,

    /// Secondary (EVM) port on localhost
    pub evm_port: u16,

    /// Process or container handle once started
    #[serde(default)]
    pub handle: Option<NodeHandle>,

    /// Current status
    pub status: NodeStatus,

    /// Node output log
    pub log_path: PathBuf,
}

/// A locally managed multi-node test network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Devnet {
    /// Chain identifier baked into the genesis state
    pub chain_id: String,

    /// Plugin that provisioned the devnet
    pub plugin: String,

    /// Network source the genesis derives from
    pub network: String,

    /// How nodes are executed
    pub mode: ExecutionMode,

    /// Number of validators
    pub validators: u8,

    /// Container image (container mode)
    #[serde(default)]
    pub image: Option<String>,

    /// Node binary path (process mode)
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Current status
    pub status: DevnetStatus,

    /// When the devnet was provisioned
    pub created_at: DateTime<Utc>,

    /// When the record last changed
    pub updated_at: DateTime<Utc>,

    /// The devnet's nodes, ordered by index
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Home directory; derived from the load path, not persisted
    #[serde(skip)]
    home: PathBuf,
}

impl Devnet {
    /// Create a new record in `provisioned` state
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        home: PathBuf,
        chain_id: String,
        plugin: String,
        network: String,
        mode: ExecutionMode,
        validators: u8,
        image: Option<String>,
        binary: Option<PathBuf>,
        nodes: Vec<Node>,
    ) -> Self {
        let now = Utc::now();
        Self {
            chain_id,
            plugin,
            network,
            mode,
            validators,
            image,
            binary,
            status: DevnetStatus::Provisioned,
            created_at: now,
            updated_at: now,
            nodes,
            home,
        }
    }

    /// Metadata file path for a devnet home
    pub fn metadata_path(home: &Path) -> PathBuf {
        home.join(METADATA_FILE)
    }

    /// Whether a devnet exists at `home`. Pure read.
    pub fn exists(home: &Path) -> bool {
        Self::metadata_path(home).is_file()
    }

    /// Devnet home directory
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Home directory of one node
    pub fn node_dir(&self, index: u8) -> PathBuf {
        self.home.join(format!("node{index}"))
    }

    /// Load the record from a devnet home. Pure read.
    pub async fn load(home: &Path) -> HydraResult<Self> {
        let path = Self::metadata_path(home);
        if !path.is_file() {
            return Err(HydraError::DevnetNotFound(home.to_path_buf()));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| HydraError::io(format!("reading {}", path.display()), e))?;

        let mut devnet: Devnet =
            serde_json::from_str(&content).map_err(|e| HydraError::MetadataInvalid {
                path,
                reason: e.to_string(),
            })?;
        devnet.home = home.to_path_buf();
        Ok(devnet)
    }

    /// Persist the record under the devnet home
    pub async fn save(&self) -> HydraResult<()> {
        fs::create_dir_all(&self.home)
            .await
            .map_err(|e| HydraError::io("creating devnet home", e))?;

        let path = Self::metadata_path(&self.home);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| HydraError::io(format!("writing {}", path.display()), e))?;

        Ok(())
    }

    /// Update status and bump the modified timestamp
    pub fn set_status(&mut self, status: DevnetStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
