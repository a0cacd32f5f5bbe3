//! Devnet orchestration
//!
//! Provision creates node directories, key seeds, and genesis state and
//! persists the devnet record without starting anything. Run and stop
//! fan out one task per node and aggregate per-node outcomes; a failing
//! node never blocks or fails its siblings.

use crate::builder::SourceBuilder;
use crate::cache::BinaryCache;
use crate::config::Config;
use crate::devnet::health;
use crate::devnet::state::{
    Devnet, DevnetStatus, Node, NodeStatus, ALLOWED_NETWORKS, MAX_VALIDATORS, MIN_VALIDATORS,
};
use crate::error::{HydraError, HydraResult};
use crate::launcher::{create_launcher, NodeHandle, NodeLauncher, NodeSpec};
use crate::plugin::{ExecutionMode, GenesisParams, PluginHandle, PluginRegistry};
use chrono::Utc;
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lines of node output attached to a failure report
const LOG_TAIL_LINES: usize = 50;

/// Where the node binary comes from
#[derive(Debug, Clone)]
pub enum VersionSource {
    /// Branch, tag, or commit to build (or reuse from the cache)
    Reference(String),
    /// Externally supplied binary path, used as-is
    LocalBinary(PathBuf),
}

/// Validated parameters for provisioning a devnet
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Devnet home directory
    pub home: PathBuf,

    /// Network plugin name
    pub plugin: String,

    /// Network source for the genesis state
    pub network: String,

    /// Number of validators
    pub validators: u8,

    /// Node binary source
    pub version: VersionSource,

    /// Chain id; defaults to `<plugin>-<network>-1`
    pub chain_id: Option<String>,

    /// Execution mode; defaults to the plugin's preference
    pub mode: Option<ExecutionMode>,

    /// Container image override (container mode)
    pub image: Option<String>,
}

/// One node that did not reach the desired state
#[derive(Debug, Clone)]
pub struct NodeFailure {
    pub index: u8,
    pub error: String,
    pub log_tail: String,
}

/// Aggregate outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Nodes that started and reported healthy
    pub successful: Vec<u8>,

    /// Nodes that failed to start or to become healthy
    pub failed: Vec<NodeFailure>,

    /// Every node is healthy
    pub all_healthy: bool,
}

/// Aggregate outcome of a stop
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Nodes that exited on the graceful signal (or were already down)
    pub stopped: Vec<u8>,

    /// Nodes force-killed after the deadline
    pub forced: Vec<u8>,

    /// Nodes whose termination errored
    pub failed: Vec<NodeFailure>,
}

enum StartOutcome {
    Healthy(NodeHandle),
    Unhealthy {
        handle: Option<NodeHandle>,
        error: String,
        log_tail: String,
    },
}

enum StopOutcome {
    AlreadyStopped,
    Graceful,
    Forced,
    Error(String),
}

/// The devnet lifecycle state machine
pub struct DevnetOrchestrator {
    config: Config,
    cache: Arc<BinaryCache>,
    builder: SourceBuilder,
    plugins: PluginRegistry,
}

impl DevnetOrchestrator {
    /// Create an orchestrator from an explicit configuration value
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(BinaryCache::new(config.cache_dir()));
        let builder = SourceBuilder::new(cache.clone(), config.cache_dir().join("workspaces"));
        let plugins = PluginRegistry::new(config.plugin_dir());
        Self {
            config,
            cache,
            builder,
            plugins,
        }
    }

    /// The binary cache this orchestrator registers builds in
    pub fn cache(&self) -> &BinaryCache {
        &self.cache
    }

    /// The plugin registry this orchestrator loads chains from
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Whether a devnet exists at `home`. Pure read.
    pub fn devnet_exists(&self, home: &Path) -> bool {
        Devnet::exists(home)
    }

    /// Load the devnet record at `home`. Pure read.
    pub async fn load_metadata(&self, home: &Path) -> HydraResult<Devnet> {
        Devnet::load(home).await
    }

    /// Create node directories, key seeds, genesis state, and metadata.
    ///
    /// Validation happens before any side effect; a failure during
    /// materialization rolls the partial home back so the devnet is
    /// never left half-provisioned.
    pub async fn provision(&self, opts: ProvisionOptions) -> HydraResult<Devnet> {
        if !(MIN_VALIDATORS..=MAX_VALIDATORS).contains(&opts.validators) {
            return Err(HydraError::Validation(format!(
                "validator count must be between {MIN_VALIDATORS} and {MAX_VALIDATORS}, got {}",
                opts.validators
            )));
        }

        let plugin = self.plugins.load(&opts.plugin).await?;

        let allowed: Vec<&str> = if plugin.manifest.networks.is_empty() {
            ALLOWED_NETWORKS.to_vec()
        } else {
            plugin.manifest.networks.iter().map(String::as_str).collect()
        };
        if !allowed.contains(&opts.network.as_str()) {
            return Err(HydraError::Validation(format!(
                "network {:?} is not one of {}",
                opts.network,
                allowed.join(", ")
            )));
        }

        if Devnet::exists(&opts.home) {
            return Err(HydraError::DevnetExists(opts.home));
        }

        let mode = opts.mode.unwrap_or(plugin.manifest.default_mode);

        let image = match mode {
            ExecutionMode::Container => {
                if !plugin.supports_docker() {
                    return Err(HydraError::Validation(format!(
                        "plugin {} does not support container mode",
                        opts.plugin
                    )));
                }
                let image = opts
                    .image
                    .clone()
                    .or_else(|| plugin.manifest.default_image.clone())
                    .ok_or_else(|| {
                        HydraError::Validation("container mode requires an image".to_string())
                    })?;
                Some(image)
            }
            ExecutionMode::Process => None,
        };

        let binary = match mode {
            ExecutionMode::Process => Some(self.resolve_binary(&opts, &plugin).await?),
            ExecutionMode::Container => None,
        };

        let chain_id = opts
            .chain_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}-1", opts.plugin, opts.network));

        let nodes = (0..opts.validators)
            .map(|i| Node {
                index: i,
                rpc_port: self.config.ports.rpc_base + u16::from(i) * self.config.ports.rpc_stride,
                evm_port: self.config.ports.evm_base + u16::from(i),
                handle: None,
                status: NodeStatus::Pending,
                log_path: opts.home.join(format!("node{i}")).join("node.log"),
            })
            .collect();

        let devnet = Devnet::new(
            opts.home.clone(),
            chain_id,
            opts.plugin.clone(),
            opts.network.clone(),
            mode,
            opts.validators,
            image,
            binary,
            nodes,
        );

        let home_preexisted = opts.home.exists();
        match self.materialize(&devnet, &plugin).await {
            Ok(()) => {
                info!(
                    "Provisioned devnet {} with {} validator(s) at {}",
                    devnet.chain_id,
                    devnet.validators,
                    devnet.home().display()
                );
                Ok(devnet)
            }
            Err(e) => {
                warn!("Provision failed, rolling back partial state: {e}");
                self.rollback_provision(&devnet, home_preexisted).await;
                Err(e)
            }
        }
    }

    /// Resolve the node binary for process mode
    async fn resolve_binary(
        &self,
        opts: &ProvisionOptions,
        plugin: &PluginHandle,
    ) -> HydraResult<PathBuf> {
        match &opts.version {
            VersionSource::LocalBinary(path) => {
                if !path.is_file() {
                    return Err(HydraError::Validation(format!(
                        "binary {} does not exist",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
            VersionSource::Reference(reference) => {
                self.cache.init().await?;
                let result = self
                    .builder
                    .build(reference, &opts.network, &plugin.manifest.build, None)
                    .await?;
                // Newly resolved version becomes the live one
                self.cache.activate(&result.binary.commit).await?;
                Ok(result.binary.path.clone())
            }
        }
    }

    /// Side-effect phase of provision
    async fn materialize(&self, devnet: &Devnet, plugin: &PluginHandle) -> HydraResult<()> {
        fs::create_dir_all(devnet.home())
            .await
            .map_err(|e| HydraError::io("creating devnet home", e))?;

        for node in &devnet.nodes {
            let dir = devnet.node_dir(node.index);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| HydraError::io(format!("creating {}", dir.display()), e))?;

            let seed_path = dir.join("node_seed");
            if !seed_path.exists() {
                let mut hasher = Sha256::new();
                hasher.update(Uuid::new_v4().as_bytes());
                hasher.update([node.index]);
                let seed = hex::encode(hasher.finalize());
                fs::write(&seed_path, format!("{seed}\n"))
                    .await
                    .map_err(|e| HydraError::io(format!("writing {}", seed_path.display()), e))?;
            }
        }

        plugin
            .generate_genesis(&GenesisParams {
                home: devnet.home().to_path_buf(),
                chain_id: devnet.chain_id.clone(),
                network: devnet.network.clone(),
                validators: devnet.validators,
            })
            .await?;

        devnet.save().await
    }

    /// Undo a partially-applied provision
    async fn rollback_provision(&self, devnet: &Devnet, home_preexisted: bool) {
        if home_preexisted {
            let _ = fs::remove_file(Devnet::metadata_path(devnet.home())).await;
            for node in &devnet.nodes {
                let _ = fs::remove_dir_all(devnet.node_dir(node.index)).await;
            }
        } else {
            let _ = fs::remove_dir_all(devnet.home()).await;
        }
    }

    /// Start every node concurrently and wait for each to become
    /// healthy, with per-node failure isolation.
    ///
    /// A top-level error is returned only for conditions that prevent
    /// any node from being attempted; per-node failures are data in the
    /// report. The devnet becomes `running` when at least one node is
    /// healthy; with zero healthy nodes the status is left unchanged.
    pub async fn run(&self, home: &Path) -> HydraResult<RunReport> {
        let mut devnet = Devnet::load(home).await?;

        match devnet.status {
            DevnetStatus::Running => {
                return Err(HydraError::Validation(
                    "devnet is already running; stop it first".to_string(),
                ))
            }
            DevnetStatus::Uninitialized | DevnetStatus::Destroyed => {
                return Err(HydraError::Validation(format!(
                    "devnet cannot be run from status {:?}",
                    devnet.status
                )))
            }
            DevnetStatus::Provisioned | DevnetStatus::Stopped => {}
        }

        let launcher: Arc<dyn NodeLauncher> = Arc::from(create_launcher(devnet.mode));
        if !launcher.is_available().await? {
            return Err(HydraError::DockerNotFound(format!(
                "{} backend is not available",
                launcher.launcher_name()
            )));
        }

        let binary = match devnet.mode {
            ExecutionMode::Process => {
                let binary = devnet.binary.clone().ok_or_else(|| {
                    HydraError::Validation("devnet record has no binary path".to_string())
                })?;
                if !binary.is_file() {
                    return Err(HydraError::ArtifactNotFound(binary));
                }
                binary
            }
            ExecutionMode::Container => PathBuf::new(),
        };

        let health_config = self.config.health.clone();
        let tasks = devnet.nodes.iter().map(|node| {
            let spec = NodeSpec {
                index: node.index,
                chain_id: devnet.chain_id.clone(),
                home: devnet.node_dir(node.index),
                binary: binary.clone(),
                image: devnet.image.clone(),
                rpc_port: node.rpc_port,
                evm_port: node.evm_port,
                log_path: node.log_path.clone(),
            };
            let launcher = launcher.clone();
            let health_config = health_config.clone();

            async move {
                let handle = match launcher.start(&spec).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        let log_tail = launcher
                            .log_tail(&spec, None, LOG_TAIL_LINES)
                            .await
                            .unwrap_or_default();
                        return (
                            spec.index,
                            StartOutcome::Unhealthy {
                                handle: None,
                                error: e.to_string(),
                                log_tail,
                            },
                        );
                    }
                };

                match health::wait_healthy(spec.rpc_port, &health_config).await {
                    Ok(()) => (spec.index, StartOutcome::Healthy(handle)),
                    Err(e) => {
                        let log_tail = launcher
                            .log_tail(&spec, Some(&handle), LOG_TAIL_LINES)
                            .await
                            .unwrap_or_default();
                        (
                            spec.index,
                            StartOutcome::Unhealthy {
                                handle: Some(handle),
                                error: e.to_string(),
                                log_tail,
                            },
                        )
                    }
                }
            }
        });

        let outcomes = join_all(tasks).await;

        let mut report = RunReport {
            successful: vec![],
            failed: vec![],
            all_healthy: true,
        };
        for (index, outcome) in outcomes {
            let Some(node) = devnet.nodes.iter_mut().find(|n| n.index == index) else {
                continue;
            };
            match outcome {
                StartOutcome::Healthy(handle) => {
                    node.handle = Some(handle);
                    node.status = NodeStatus::Running;
                    report.successful.push(index);
                }
                StartOutcome::Unhealthy {
                    handle,
                    error,
                    log_tail,
                } => {
                    node.handle = handle;
                    node.status = NodeStatus::Failed;
                    report.all_healthy = false;
                    report.failed.push(NodeFailure {
                        index,
                        error,
                        log_tail,
                    });
                }
            }
        }
        report.successful.sort_unstable();
        report.failed.sort_by_key(|f| f.index);

        if report.successful.is_empty() {
            // No healthy node: the devnet is not running. Status stays
            // as it was; the report carries the failures.
            devnet.updated_at = Utc::now();
        } else {
            devnet.set_status(DevnetStatus::Running);
        }
        devnet.save().await?;

        info!(
            "Run finished for {}: {}/{} nodes healthy",
            devnet.chain_id,
            report.successful.len(),
            devnet.nodes.len()
        );
        Ok(report)
    }

    /// Signal graceful termination to all nodes, force-killing any node
    /// still alive when the shared deadline passes. Idempotent when the
    /// devnet is already stopped.
    pub async fn stop(&self, home: &Path, timeout: Duration) -> HydraResult<StopReport> {
        let mut devnet = Devnet::load(home).await?;

        let launcher: Arc<dyn NodeLauncher> = Arc::from(create_launcher(devnet.mode));
        let poll_interval = Duration::from_millis(self.config.stop.poll_interval_ms);
        // One deadline for the whole devnet; a deaf node never extends
        // the wait for its siblings.
        let deadline = Instant::now() + timeout;

        let tasks = devnet.nodes.iter().map(|node| {
            let launcher = launcher.clone();
            let handle = node.handle.clone();
            let index = node.index;

            async move {
                let Some(handle) = handle else {
                    return (index, StopOutcome::AlreadyStopped);
                };

                match launcher.is_running(&handle).await {
                    Ok(false) => return (index, StopOutcome::AlreadyStopped),
                    Ok(true) => {}
                    Err(e) => return (index, StopOutcome::Error(e.to_string())),
                }

                if let Err(e) = launcher.signal_stop(&handle).await {
                    return (index, StopOutcome::Error(e.to_string()));
                }
                debug!("Node {index} signaled, waiting for exit");

                while Instant::now() < deadline {
                    match launcher.is_running(&handle).await {
                        Ok(false) => return (index, StopOutcome::Graceful),
                        Ok(true) => tokio::time::sleep(poll_interval).await,
                        Err(e) => return (index, StopOutcome::Error(e.to_string())),
                    }
                }

                warn!("Node {index} missed the stop deadline, force-killing");
                match launcher.kill(&handle).await {
                    Ok(()) => (index, StopOutcome::Forced),
                    Err(e) => (index, StopOutcome::Error(e.to_string())),
                }
            }
        });

        let outcomes = join_all(tasks).await;

        let mut report = StopReport {
            stopped: vec![],
            forced: vec![],
            failed: vec![],
        };
        for (index, outcome) in outcomes {
            let Some(node) = devnet.nodes.iter_mut().find(|n| n.index == index) else {
                continue;
            };
            match outcome {
                StopOutcome::AlreadyStopped | StopOutcome::Graceful => {
                    node.handle = None;
                    node.status = NodeStatus::Stopped;
                    report.stopped.push(index);
                }
                StopOutcome::Forced => {
                    node.handle = None;
                    node.status = NodeStatus::Stopped;
                    report.forced.push(index);
                }
                StopOutcome::Error(error) => {
                    report.failed.push(NodeFailure {
                        index,
                        error,
                        log_tail: String::new(),
                    });
                }
            }
        }
        report.stopped.sort_unstable();
        report.forced.sort_unstable();
        report.failed.sort_by_key(|f| f.index);

        if devnet.status == DevnetStatus::Running {
            devnet.set_status(DevnetStatus::Stopped);
        }
        devnet.save().await?;

        info!(
            "Stop finished for {}: {} graceful/idle, {} forced, {} failed",
            devnet.chain_id,
            report.stopped.len(),
            report.forced.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Best-effort stop, then remove the devnet's entire on-disk
    /// subtree. Irreversible.
    pub async fn destroy(&self, home: &Path) -> HydraResult<()> {
        if !Devnet::exists(home) {
            return Err(HydraError::DevnetNotFound(home.to_path_buf()));
        }

        let grace = Duration::from_secs(self.config.stop.grace_secs);
        if let Err(e) = self.stop(home, grace).await {
            warn!("Best-effort stop before destroy failed: {e}");
        }

        fs::remove_dir_all(home)
            .await
            .map_err(|e| HydraError::io("removing devnet home", e))?;

        info!("Destroyed devnet at {}", home.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PLUGIN_PREFIX;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn install_plugin(dir: &Path, name: &str, genesis_ok: bool) {
        use std::os::unix::fs::PermissionsExt;

        let genesis = if genesis_ok {
            "shift; home=$2; mkdir -p \"$home\"; echo '{}' > \"$home/genesis.json\"; exit 0"
        } else {
            "echo 'genesis exploded' >&2; exit 1"
        };
        let script = format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
             describe)\n\
             printf '{{\"name\":\"{name}\",\"binary_name\":\"{name}d\",\
             \"build\":{{\"repo\":\"https://example.com/{name}.git\",\
             \"command\":\"make build\",\"artifact\":\"build/{name}d\"}}}}'\n\
             ;;\n\
             genesis)\n\
             {genesis}\n\
             ;;\n\
             esac\n"
        );

        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(format!("{PLUGIN_PREFIX}{name}"));
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn install_binary(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("demod");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn test_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().join("cache"));
        config.plugins.dir = Some(temp.path().join("plugins"));
        config.devnet.home_root = Some(temp.path().join("devnets"));
        config
    }

    #[cfg(unix)]
    fn provision_opts(temp: &TempDir, binary: PathBuf) -> ProvisionOptions {
        ProvisionOptions {
            home: temp.path().join("devnets").join("demo"),
            plugin: "demo".to_string(),
            network: "localnet".to_string(),
            validators: 2,
            version: VersionSource::LocalBinary(binary),
            chain_id: None,
            mode: None,
            image: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provision_validates_validator_count() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        for count in [0, 5, 200] {
            let mut opts = provision_opts(&temp, binary.clone());
            opts.validators = count;
            let err = orchestrator.provision(opts).await.unwrap_err();
            assert!(matches!(err, HydraError::Validation(_)), "count {count}");
        }

        // Zero side effects: home never created
        assert!(!temp.path().join("devnets").join("demo").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provision_validates_network() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let mut opts = provision_opts(&temp, binary);
        opts.network = "betanet".to_string();
        let err = orchestrator.provision(opts).await.unwrap_err();
        assert!(matches!(err, HydraError::Validation(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provision_creates_nodes_and_metadata() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let opts = provision_opts(&temp, binary);
        let devnet = orchestrator.provision(opts.clone()).await.unwrap();

        assert_eq!(devnet.status, DevnetStatus::Provisioned);
        assert_eq!(devnet.chain_id, "demo-localnet-1");
        assert_eq!(devnet.nodes.len(), 2);
        for node in &devnet.nodes {
            let dir = devnet.node_dir(node.index);
            assert!(dir.is_dir());
            assert!(dir.join("node_seed").is_file());
        }
        assert!(devnet.home().join("genesis.json").is_file());
        assert!(orchestrator.devnet_exists(devnet.home()));

        // Provisioning again at the same home fails fast
        let err = orchestrator.provision(opts).await.unwrap_err();
        assert!(matches!(err, HydraError::DevnetExists(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provision_rolls_back_on_genesis_failure() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", false);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let opts = provision_opts(&temp, binary);
        let home = opts.home.clone();
        let err = orchestrator.provision(opts).await.unwrap_err();
        assert!(matches!(err, HydraError::GenesisFailed { .. }));
        assert!(err.requires_cleanup());

        // Nothing half-provisioned is left behind
        assert!(!home.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_requires_existing_devnet() {
        let temp = TempDir::new().unwrap();
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));
        let err = orchestrator.run(&temp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, HydraError::DevnetNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_with_missing_binary_is_top_level_error() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let devnet = orchestrator
            .provision(provision_opts(&temp, binary.clone()))
            .await
            .unwrap();

        std::fs::remove_file(&binary).unwrap();
        let err = orchestrator.run(devnet.home()).await.unwrap_err();
        assert!(matches!(err, HydraError::ArtifactNotFound(_)));

        // Nothing was attempted; nodes remain pending
        let reloaded = orchestrator.load_metadata(devnet.home()).await.unwrap();
        assert!(reloaded
            .nodes
            .iter()
            .all(|n| n.status == NodeStatus::Pending));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_is_idempotent_before_any_run() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let devnet = orchestrator
            .provision(provision_opts(&temp, binary))
            .await
            .unwrap();

        let report = orchestrator
            .stop(devnet.home(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.stopped, vec![0, 1]);
        assert!(report.forced.is_empty());
        assert!(report.failed.is_empty());

        // Never ran, so the status is untouched
        let reloaded = orchestrator.load_metadata(devnet.home()).await.unwrap();
        assert_eq!(reloaded.status, DevnetStatus::Provisioned);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn destroy_removes_everything() {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"), "demo", true);
        let binary = install_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp));

        let devnet = orchestrator
            .provision(provision_opts(&temp, binary))
            .await
            .unwrap();
        let home = devnet.home().to_path_buf();

        orchestrator.destroy(&home).await.unwrap();
        assert!(!home.exists());

        let err = orchestrator.destroy(&home).await.unwrap_err();
        assert!(matches!(err, HydraError::DevnetNotFound(_)));
    }
}
