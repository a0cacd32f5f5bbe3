//! Hydra - Local Validator Devnet Orchestrator
//!
//! Provisions, runs, health-checks, and tears down small multi-node test
//! networks, backed by a content-addressed cache of built node binaries
//! with atomic activation.

pub mod builder;
pub mod cache;
pub mod config;
pub mod devnet;
pub mod error;
pub mod launcher;
pub mod passthrough;
pub mod plugin;

pub use error::{HydraError, HydraResult};
