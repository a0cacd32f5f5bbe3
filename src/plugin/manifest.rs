//! Plugin capability manifest
//!
//! The manifest is the JSON payload a plugin prints in response to the
//! `describe` handshake. It is the only thing the core knows about a
//! chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How node processes for a chain are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Spawn the node binary as a local process
    #[default]
    Process,
    /// Run the node inside a container
    Container,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Container => write!(f, "container"),
        }
    }
}

/// How to turn a source checkout into a node binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInstructions {
    /// Git repository holding the node source
    pub repo: String,

    /// Shell command run at the checkout root
    pub command: String,

    /// Path of the produced binary, relative to the checkout root
    pub artifact: PathBuf,
}

/// Capability manifest returned by a plugin's `describe` handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name; must match the discovered executable suffix
    pub name: String,

    /// File name of the node binary this plugin manages
    pub binary_name: String,

    /// Build instructions for the node source
    pub build: BuildInstructions,

    /// Preferred execution mode for devnets of this chain
    #[serde(default)]
    pub default_mode: ExecutionMode,

    /// Whether the plugin ships container support
    #[serde(default)]
    pub supports_docker: bool,

    /// Container image to use in container mode
    #[serde(default)]
    pub default_image: Option<String>,

    /// Network sources the plugin accepts; empty means the built-in set
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Parameters handed to a plugin's genesis capability
#[derive(Debug, Clone)]
pub struct GenesisParams {
    /// Devnet home directory
    pub home: PathBuf,

    /// Chain identifier written into the genesis state
    pub chain_id: String,

    /// Network source the genesis derives from
    pub network: String,

    /// Number of validators
    pub validators: u8,
}
