//! Devnet lifecycle management
//!
//! A devnet moves through `provisioned -> running -> stopped` (and back
//! to running); `destroy` is reachable from any state and removes all
//! on-disk state.

pub mod health;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    DevnetOrchestrator, NodeFailure, ProvisionOptions, RunReport, StopReport, VersionSource,
};
pub use state::{
    Devnet, DevnetStatus, Node, NodeStatus, ALLOWED_NETWORKS, MAX_VALIDATORS, METADATA_FILE,
    MIN_VALIDATORS,
};
