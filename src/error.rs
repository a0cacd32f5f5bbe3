//! Error types for Hydra
//!
//! All modules use `HydraResult<T>` as their return type. Partial node
//! failures during `run`/`stop` are reported as structured data in the
//! operation reports, never through this enum.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Hydra operations
pub type HydraResult<T> = Result<T, HydraError>;

/// All errors that can occur in Hydra
#[derive(Error, Debug)]
pub enum HydraError {
    // Input validation
    #[error("Invalid input: {0}")]
    Validation(String),

    // Devnet lifecycle errors
    #[error("A devnet already exists at {0}")]
    DevnetExists(PathBuf),

    #[error("No devnet found at {0}")]
    DevnetNotFound(PathBuf),

    #[error("Devnet metadata at {path} is invalid: {reason}")]
    MetadataInvalid { path: PathBuf, reason: String },

    // Cache errors
    #[error("Commit {0} is not in the binary cache")]
    CacheEntryNotFound(String),

    #[error("No binary has been activated for {0}")]
    NotActivated(String),

    // Build pipeline errors
    #[error("Failed to fetch source for {reference}: {reason}")]
    CloneFailed { reference: String, reason: String },

    #[error("Build tool not found: {tool}. Install it and retry.")]
    BuildToolMissing { tool: String },

    #[error("Build of {reference} failed:\n{log_tail}")]
    BuildFailed { reference: String, log_tail: String },

    #[error("Build succeeded but no artifact found at {0}")]
    ArtifactNotFound(PathBuf),

    // Plugin errors
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {plugin} handshake failed: {reason}")]
    PluginHandshake { plugin: String, reason: String },

    #[error("Plugin {plugin} failed to generate genesis: {reason}")]
    GenesisFailed { plugin: String, reason: String },

    // Node/process errors
    #[error("Node failed to start: {0}")]
    NodeStart(String),

    #[error("Container runtime not available: {0}")]
    DockerNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Deadline errors
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HydraError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the failed operation left no state behind and can be
    /// retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CloneFailed { .. }
                | Self::BuildToolMissing { .. }
                | Self::BuildFailed { .. }
                | Self::DockerNotFound(_)
                | Self::Timeout { .. }
                | Self::CacheEntryNotFound(_)
                | Self::NotActivated(_)
                | Self::PluginNotFound(_)
                | Self::DevnetNotFound(_)
        )
    }

    /// Whether recovering from this error requires tearing down
    /// partially-applied state (`destroy`) before retrying.
    pub fn requires_cleanup(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::GenesisFailed { .. }
                | Self::NodeStart(_)
                | Self::MetadataInvalid { .. }
        )
    }
}
