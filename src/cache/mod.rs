//! Content-addressed cache of built node binaries
//!
//! Binaries are stored under their source commit hash and are immutable
//! once stored. The currently live binary is a symlink under `bin/` that
//! is swapped with a single atomic rename, so a concurrent exec never
//! observes a missing or half-written link.
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   bin/<binary-name>         -> ../<commit>/<binary-name>   (active link)
//!   <commit>/<binary-name>    built artifact
//!   <commit>/meta.json        sidecar metadata
//! ```
//!
//! # Cache States
//!
//! | State | Meaning |
//! |-------|---------|
//! | no entry dir | commit never built |
//! | entry dir without `meta.json` | interrupted store, treated as absent |
//! | entry dir with `meta.json` | finalized, immutable |

pub mod activation;
pub mod store;

pub use activation::SymlinkInfo;
pub use store::{format_bytes, BinaryCache, CacheStats, CachedBinary, CleanReport};
