//! Plugin registry
//!
//! Scans a fixed plugin directory for executables matching the naming
//! convention and loads each one at most once per registry lifetime.

use crate::error::{HydraError, HydraResult};
use crate::plugin::manifest::{GenesisParams, PluginManifest};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Naming convention for plugin executables
pub const PLUGIN_PREFIX: &str = "hydra-plugin-";

/// A loaded plugin: the capability interface the core depends on
#[derive(Debug)]
pub struct PluginHandle {
    /// Path of the plugin executable
    path: PathBuf,

    /// Capability manifest from the `describe` handshake
    pub manifest: PluginManifest,
}

impl PluginHandle {
    /// File name of the node binary this plugin manages
    pub fn binary_name(&self) -> &str {
        &self.manifest.binary_name
    }

    /// Whether the plugin ships container support
    pub fn supports_docker(&self) -> bool {
        self.manifest.supports_docker
    }

    /// Delegate genesis construction to the plugin process.
    ///
    /// The chain's genesis data model is entirely the plugin's; the core
    /// only observes success or failure.
    pub async fn generate_genesis(&self, params: &GenesisParams) -> HydraResult<()> {
        debug!(
            "Generating genesis via {} for chain {}",
            self.manifest.name, params.chain_id
        );

        let output = Command::new(&self.path)
            .arg("genesis")
            .arg("--home")
            .arg(&params.home)
            .args(["--chain-id", &params.chain_id])
            .args(["--network", &params.network])
            .args(["--validators", &params.validators.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HydraError::command_failed(format!("{} genesis", self.manifest.name), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(HydraError::GenesisFailed {
                plugin: self.manifest.name.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Discovers and loads network plugins
pub struct PluginRegistry {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<PluginHandle>>>,
}

impl PluginRegistry {
    /// Create a registry scanning `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// List installed plugin names. Pure read; nothing is loaded.
    pub async fn discover(&self) -> HydraResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| HydraError::io("reading plugin directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HydraError::io("reading plugin entry", e))?
        {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_prefix(PLUGIN_PREFIX) else {
                continue;
            };
            if !name.is_empty() && is_executable(&path) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load a plugin by name, spawning it for the `describe` handshake.
    ///
    /// The handle is cached; repeated loads return the same instance.
    pub async fn load(&self, name: &str) -> HydraResult<Arc<PluginHandle>> {
        let mut loaded = self.loaded.lock().await;
        if let Some(handle) = loaded.get(name) {
            return Ok(handle.clone());
        }

        let path = self.dir.join(format!("{PLUGIN_PREFIX}{name}"));
        if !path.is_file() {
            return Err(HydraError::PluginNotFound(name.to_string()));
        }

        let manifest = describe(&path, name).await?;
        info!("Loaded plugin {} ({})", name, manifest.binary_name);

        let handle = Arc::new(PluginHandle { path, manifest });
        loaded.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

/// Run the `describe` handshake against a plugin executable
async fn describe(path: &Path, name: &str) -> HydraResult<PluginManifest> {
    let output = Command::new(path)
        .arg("describe")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| HydraError::command_failed(format!("{} describe", path.display()), e))?;

    if !output.status.success() {
        return Err(HydraError::PluginHandshake {
            plugin: name.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let manifest: PluginManifest =
        serde_json::from_slice(&output.stdout).map_err(|e| HydraError::PluginHandshake {
            plugin: name.to_string(),
            reason: format!("invalid manifest: {e}"),
        })?;

    if manifest.name != name {
        return Err(HydraError::PluginHandshake {
            plugin: name.to_string(),
            reason: format!("manifest names itself {:?}", manifest.name),
        });
    }

    Ok(manifest)
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn install_stub(dir: &Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(format!("{PLUGIN_PREFIX}{name}"));
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn demo_manifest_script(name: &str) -> String {
        format!(
            "#!/bin/sh\n\
             if [ \"$1\" = describe ]; then\n\
             printf '{{\"name\":\"{name}\",\"binary_name\":\"{name}d\",\
             \"build\":{{\"repo\":\"https://example.com/{name}.git\",\
             \"command\":\"make build\",\"artifact\":\"build/{name}d\"}}}}'\n\
             fi\n"
        )
    }

    #[tokio::test]
    async fn discover_empty_dir() {
        let temp = TempDir::new().unwrap();
        let registry = PluginRegistry::new(temp.path().to_path_buf());
        assert!(registry.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn discover_missing_dir() {
        let registry = PluginRegistry::new(PathBuf::from("/nonexistent/plugins"));
        assert!(registry.discover().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn discover_matches_naming_convention() {
        let temp = TempDir::new().unwrap();
        install_stub(temp.path(), "gaia", &demo_manifest_script("gaia"));
        install_stub(temp.path(), "evmos", &demo_manifest_script("evmos"));
        // Not a plugin: wrong prefix
        std::fs::write(temp.path().join("README"), "docs").unwrap();

        let registry = PluginRegistry::new(temp.path().to_path_buf());
        let names = registry.discover().await.unwrap();
        assert_eq!(names, vec!["evmos", "gaia"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_runs_handshake_and_caches() {
        let temp = TempDir::new().unwrap();
        install_stub(temp.path(), "gaia", &demo_manifest_script("gaia"));

        let registry = PluginRegistry::new(temp.path().to_path_buf());
        let handle = registry.load("gaia").await.unwrap();
        assert_eq!(handle.binary_name(), "gaiad");

        let again = registry.load("gaia").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
    }

    #[tokio::test]
    async fn load_unknown_plugin_fails() {
        let temp = TempDir::new().unwrap();
        let registry = PluginRegistry::new(temp.path().to_path_buf());
        let err = registry.load("ghost").await.unwrap_err();
        assert!(matches!(err, HydraError::PluginNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_rejects_mismatched_manifest() {
        let temp = TempDir::new().unwrap();
        // Plugin claims a different name than its file suffix
        install_stub(temp.path(), "gaia", &demo_manifest_script("other"));

        let registry = PluginRegistry::new(temp.path().to_path_buf());
        let err = registry.load("gaia").await.unwrap_err();
        assert!(matches!(err, HydraError::PluginHandshake { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn genesis_failure_surfaces_stderr() {
        let temp = TempDir::new().unwrap();
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = describe ]; then\n\
             printf '{{\"name\":\"gaia\",\"binary_name\":\"gaiad\",\
             \"build\":{{\"repo\":\"r\",\"command\":\"c\",\"artifact\":\"a\"}}}}'\n\
             elif [ \"$1\" = genesis ]; then\n\
             echo 'staking module exploded' >&2; exit 1\n\
             fi\n"
        );
        install_stub(temp.path(), "gaia", &script);

        let registry = PluginRegistry::new(temp.path().to_path_buf());
        let handle = registry.load("gaia").await.unwrap();

        let params = GenesisParams {
            home: temp.path().join("devnet"),
            chain_id: "hydra-1".to_string(),
            network: "localnet".to_string(),
            validators: 2,
        };
        let err = handle.generate_genesis(&params).await.unwrap_err();
        match err {
            HydraError::GenesisFailed { reason, .. } => {
                assert!(reason.contains("staking module exploded"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
