//! Binary cache storage
//!
//! Stores built binaries keyed by commit hash with a JSON sidecar per
//! entry. Storing the same commit twice is a no-op on content.

use crate::error::{HydraError, HydraResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Sidecar file name inside each entry directory
pub(crate) const META_FILE: &str = "meta.json";

/// Directory holding the active symlinks
pub(crate) const BIN_DIR: &str = "bin";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// A cached build artifact, immutable once stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedBinary {
    /// Source commit hash (the content address)
    pub commit: String,

    /// The ref the commit was resolved from (branch, tag, or the commit itself)
    pub ref_label: String,

    /// Target network the binary was built for
    pub network: String,

    /// File name of the binary inside the entry directory
    pub binary_name: String,

    /// When the build finished
    pub built_at: DateTime<Utc>,

    /// Artifact size in bytes
    pub size_bytes: u64,

    /// SHA256 of the artifact contents
    pub sha256: String,

    /// Absolute path of the stored artifact
    pub path: PathBuf,
}

/// Aggregate cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Outcome of a bulk clean
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    /// Commits whose entries were removed
    pub removed: Vec<String>,

    /// Entries that could not be removed, with the IO error text
    pub failed: Vec<(String, String)>,

    /// Bytes reclaimed by the removals
    pub bytes_freed: u64,
}

/// Content-addressed store of built node binaries
pub struct BinaryCache {
    root: PathBuf,
    /// Serializes store/activate: each checks existing state before its
    /// terminal filesystem operation.
    pub(crate) swap_lock: Mutex<()>,
}

impl BinaryCache {
    /// Create a cache rooted at `root`. Call [`BinaryCache::init`] before use.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            swap_lock: Mutex::new(()),
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the active symlinks
    pub(crate) fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    /// Entry directory for a commit
    pub(crate) fn entry_dir(&self, commit: &str) -> PathBuf {
        self.root.join(commit)
    }

    /// Idempotently create the on-disk cache structure
    pub async fn init(&self) -> HydraResult<()> {
        for dir in [self.root.clone(), self.bin_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| HydraError::io(format!("creating cache dir {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Look up a commit. No side effects.
    pub async fn lookup(&self, commit: &str) -> HydraResult<Option<CachedBinary>> {
        let meta_path = self.entry_dir(commit).join(META_FILE);
        if !meta_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&meta_path)
            .await
            .map_err(|e| HydraError::io(format!("reading {}", meta_path.display()), e))?;
        let entry: CachedBinary = serde_json::from_str(&content)?;
        Ok(Some(entry))
    }

    /// Register a built artifact under its commit hash.
    ///
    /// If the commit is already cached the existing entry is returned
    /// unchanged, even when `ref_label` differs: dedupe is by content,
    /// not by ref.
    pub async fn store(
        &self,
        artifact: &Path,
        commit: &str,
        ref_label: &str,
        network: &str,
    ) -> HydraResult<CachedBinary> {
        let _guard = self.swap_lock.lock().await;

        if let Some(existing) = self.lookup(commit).await? {
            debug!("Cache hit for commit {commit}, not re-storing");
            return Ok(existing);
        }

        let binary_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HydraError::ArtifactNotFound(artifact.to_path_buf()))?
            .to_string();

        let entry_dir = self.entry_dir(commit);
        fs::create_dir_all(&entry_dir).await.map_err(|e| {
            HydraError::io(format!("creating cache entry {}", entry_dir.display()), e)
        })?;

        let dest = entry_dir.join(&binary_name);
        let size_bytes = fs::copy(artifact, &dest)
            .await
            .map_err(|e| HydraError::io(format!("copying artifact to {}", dest.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            std::fs::set_permissions(&dest, perms)
                .map_err(|e| HydraError::io("setting artifact permissions", e))?;
        }

        let contents = fs::read(&dest)
            .await
            .map_err(|e| HydraError::io(format!("reading back {}", dest.display()), e))?;
        let sha256 = hex::encode(Sha256::digest(&contents));

        let entry = CachedBinary {
            commit: commit.to_string(),
            ref_label: ref_label.to_string(),
            network: network.to_string(),
            binary_name,
            built_at: Utc::now(),
            size_bytes,
            sha256,
            path: dest,
        };

        // The sidecar is written last: its presence marks the entry valid.
        let meta_path = entry_dir.join(META_FILE);
        let json = serde_json::to_string_pretty(&entry)?;
        fs::write(&meta_path, json)
            .await
            .map_err(|e| HydraError::io(format!("writing {}", meta_path.display()), e))?;

        info!(
            "Cached {} ({}) for {}: {}",
            entry.ref_label,
            &entry.commit[..12.min(entry.commit.len())],
            entry.network,
            format_bytes(entry.size_bytes)
        );
        Ok(entry)
    }

    /// List all cache entries, newest build first. Ordering is for display
    /// only.
    pub async fn list(&self) -> HydraResult<Vec<CachedBinary>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut entries = vec![];
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| HydraError::io("reading cache root", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| HydraError::io("reading cache entry", e))?
        {
            let path = item.path();
            if !path.is_dir() || path.file_name().is_some_and(|n| n == BIN_DIR) {
                continue;
            }

            let meta_path = path.join(META_FILE);
            match fs::read_to_string(&meta_path).await {
                Ok(content) => match serde_json::from_str::<CachedBinary>(&content) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping corrupt sidecar {}: {}", meta_path.display(), e),
                },
                // Entry dir without sidecar: interrupted store, not listed
                Err(_) => debug!("No sidecar in {}, skipping", path.display()),
            }
        }

        entries.sort_by(|a, b| b.built_at.cmp(&a.built_at));
        Ok(entries)
    }

    /// Aggregate entry count and size
    pub async fn stats(&self) -> HydraResult<CacheStats> {
        let entries = self.list().await?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
        })
    }

    /// Best-effort bulk delete of cache entries.
    ///
    /// With `keep_active`, any entry an active symlink currently resolves
    /// into is preserved. Per-entry IO errors are reported in the result
    /// rather than aborting the sweep.
    pub async fn clean(&self, keep_active: bool) -> HydraResult<CleanReport> {
        let _guard = self.swap_lock.lock().await;

        let active: Vec<String> = if keep_active {
            self.active_commits().await?
        } else {
            vec![]
        };

        let mut report = CleanReport::default();
        for entry in self.list().await? {
            if active.contains(&entry.commit) {
                debug!("Keeping active entry {}", entry.commit);
                continue;
            }

            let dir = self.entry_dir(&entry.commit);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    report.bytes_freed += entry.size_bytes;
                    report.removed.push(entry.commit);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", dir.display(), e);
                    report.failed.push((entry.commit, e.to_string()));
                }
            }
        }

        info!(
            "Cache clean removed {} entries ({})",
            report.removed.len(),
            format_bytes(report.bytes_freed)
        );
        Ok(report)
    }
}
