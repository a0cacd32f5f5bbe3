//! Configuration schema for Hydra
//!
//! Configuration is stored at `~/.config/hydra/config.toml`. The loaded
//! `Config` value is constructed once by the caller and passed into the
//! orchestrator; nothing in this crate reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Devnet defaults
    pub devnet: DevnetConfig,

    /// Binary cache settings
    pub cache: CacheConfig,

    /// Plugin discovery settings
    pub plugins: PluginConfig,

    /// Per-node port allocation
    pub ports: PortConfig,

    /// Node health checking
    pub health: HealthConfig,

    /// Graceful stop behavior
    pub stop: StopConfig,
}

/// Devnet defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Root directory for devnet homes (defaults to the state dir)
    pub home_root: Option<PathBuf>,

    /// Default validator count
    pub validators: u8,

    /// Default network source
    pub network: String,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            home_root: None,
            validators: 1,
            network: "localnet".to_string(),
        }
    }
}

/// Binary cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (defaults to the state dir)
    pub dir: Option<PathBuf>,
}

/// Plugin discovery settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory scanned for plugin executables (defaults to the data dir)
    pub dir: Option<PathBuf>,
}

/// Per-node port allocation
///
/// Node `i` listens on `rpc_base + i * rpc_stride` for RPC and
/// `evm_base + i` for the secondary (EVM) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Base RPC port
    pub rpc_base: u16,

    /// Port spacing between nodes' RPC endpoints
    pub rpc_stride: u16,

    /// Base secondary (EVM) port
    pub evm_base: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            rpc_base: 26657,
            rpc_stride: 10,
            evm_base: 8545,
        }
    }
}

/// Node health checking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Path of the node status endpoint
    pub endpoint: String,

    /// Overall deadline for a node to become healthy, in seconds
    pub timeout_secs: u64,

    /// Delay between poll attempts, in milliseconds
    pub poll_interval_ms: u64,

    /// Per-attempt HTTP timeout, in seconds
    pub attempt_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            endpoint: "/status".to_string(),
            timeout_secs: 30,
            poll_interval_ms: 500,
            attempt_timeout_secs: 2,
        }
    }
}

/// Graceful stop behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Grace period before a node is force-killed, in seconds
    pub grace_secs: u64,

    /// Delay between liveness polls while waiting, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            grace_secs: 30,
            poll_interval_ms: 200,
        }
    }
}
