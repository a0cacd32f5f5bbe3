//! Atomic activation of cached binaries
//!
//! The active binary for a plugin is a symlink under `bin/`. Switching
//! targets builds a fresh link at a temporary name and renames it over
//! the old one, so a process exec'ing through the link during the switch
//! sees either the old or the new target, never an absent or partial one.

use crate::cache::store::{BinaryCache, CachedBinary, META_FILE};
use crate::error::{HydraError, HydraResult};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// What the active link for a binary currently points at
#[derive(Debug, Clone)]
pub struct SymlinkInfo {
    /// Whether anything exists at the link path
    pub exists: bool,

    /// Resolved link target, if the path is a symlink
    pub target: Option<PathBuf>,

    /// Commit of the cache entry the target resolves into, if any
    pub commit: Option<String>,

    /// A regular file sits at the link path (present but not cache-managed)
    pub is_regular_file: bool,
}

impl BinaryCache {
    /// Path of the active link for a binary name
    pub fn active_link_path(&self, binary_name: &str) -> PathBuf {
        self.bin_dir().join(binary_name)
    }

    /// Make a cached commit the active binary.
    ///
    /// Fails with [`HydraError::CacheEntryNotFound`] when the commit is not
    /// cached. The swap itself is a single rename; the check-then-swap
    /// sequence is serialized against concurrent `store`/`activate` calls.
    pub async fn activate(&self, commit: &str) -> HydraResult<CachedBinary> {
        let _guard = self.swap_lock.lock().await;

        let entry = self
            .lookup(commit)
            .await?
            .ok_or_else(|| HydraError::CacheEntryNotFound(commit.to_string()))?;

        let bin_dir = self.bin_dir();
        fs::create_dir_all(&bin_dir)
            .await
            .map_err(|e| HydraError::io("creating cache bin dir", e))?;

        let link = self.active_link_path(&entry.binary_name);
        let staged = bin_dir.join(format!(".{}.{}", entry.binary_name, Uuid::new_v4().simple()));

        fs::symlink(&entry.path, &staged)
            .await
            .map_err(|e| HydraError::io(format!("staging link {}", staged.display()), e))?;

        if let Err(e) = fs::rename(&staged, &link).await {
            let _ = fs::remove_file(&staged).await;
            return Err(HydraError::io(
                format!("swapping active link {}", link.display()),
                e,
            ));
        }

        info!(
            "Activated {} at commit {}",
            entry.binary_name,
            &entry.commit[..12.min(entry.commit.len())]
        );
        Ok(entry)
    }

    /// Resolve the active binary path for a binary name.
    ///
    /// Used by the passthrough executor; fails with
    /// [`HydraError::NotActivated`] when no activation has happened.
    pub async fn resolve_active(&self, binary_name: &str) -> HydraResult<PathBuf> {
        let link = self.active_link_path(binary_name);
        match fs::symlink_metadata(&link).await {
            Ok(_) => Ok(link),
            Err(_) => Err(HydraError::NotActivated(binary_name.to_string())),
        }
    }

    /// Describe what the active link for `binary_name` points at,
    /// distinguishing "never activated", "points at a cache entry", and
    /// "regular file present but not cache-managed".
    pub async fn symlink_info(&self, binary_name: &str) -> HydraResult<SymlinkInfo> {
        let link = self.active_link_path(binary_name);

        let meta = match fs::symlink_metadata(&link).await {
            Ok(meta) => meta,
            Err(_) => {
                return Ok(SymlinkInfo {
                    exists: false,
                    target: None,
                    commit: None,
                    is_regular_file: false,
                })
            }
        };

        if !meta.file_type().is_symlink() {
            return Ok(SymlinkInfo {
                exists: true,
                target: None,
                commit: None,
                is_regular_file: meta.is_file(),
            });
        }

        let target = fs::read_link(&link)
            .await
            .map_err(|e| HydraError::io(format!("reading link {}", link.display()), e))?;
        let commit = self.commit_for_target(&target);

        Ok(SymlinkInfo {
            exists: true,
            target: Some(target),
            commit,
            is_regular_file: false,
        })
    }

    /// Commits currently referenced by any active link
    pub(crate) async fn active_commits(&self) -> HydraResult<Vec<String>> {
        let bin_dir = self.bin_dir();
        if !bin_dir.exists() {
            return Ok(vec![]);
        }

        let mut commits = vec![];
        let mut dir = fs::read_dir(&bin_dir)
            .await
            .map_err(|e| HydraError::io("reading cache bin dir", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| HydraError::io("reading cache bin entry", e))?
        {
            if let Ok(target) = fs::read_link(item.path()).await {
                if let Some(commit) = self.commit_for_target(&target) {
                    debug!("Active link {} -> {}", item.path().display(), commit);
                    commits.push(commit);
                }
            }
        }

        Ok(commits)
    }

    /// Map a link target back to the cache entry it resolves into
    fn commit_for_target(&self, target: &std::path::Path) -> Option<String> {
        let entry_dir = target.parent()?;
        if entry_dir.parent() != Some(self.root()) {
            return None;
        }
        if !entry_dir.join(META_FILE).exists() {
            return None;
        }
        entry_dir.file_name()?.to_str().map(String::from)
    }
}
