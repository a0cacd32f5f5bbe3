//! Source build pipeline
//!
//! Turns a version reference (branch, tag, or raw commit) into a cached
//! binary. Builds of the same (ref, network) pair are serialized so two
//! callers never race in one workspace; a second caller blocks, then
//! observes the cache hit.

use crate::cache::{BinaryCache, CachedBinary};
use crate::error::{HydraError, HydraResult};
use crate::plugin::BuildInstructions;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Callback invoked for each line of build output
pub type OutputSink = dyn Fn(String) + Send + Sync;

/// How a version reference was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A raw 40-hex commit hash
    Commit,
    /// A semver-looking release tag
    Tag,
    /// Anything else: assumed branch name
    Branch,
}

/// Classify a version reference.
///
/// Tags are recognized by parsing as semver (with an optional leading
/// `v`), which is what release tags in this ecosystem look like.
pub fn classify_ref(reference: &str) -> RefKind {
    if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
        return RefKind::Commit;
    }
    if semver::Version::parse(reference.trim_start_matches('v')).is_ok() {
        return RefKind::Tag;
    }
    RefKind::Branch
}

/// Result of a build request
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// The cached artifact, freshly built or reused
    pub binary: CachedBinary,

    /// Whether the commit was already cached
    pub cache_hit: bool,
}

/// Resolves version references and builds node binaries into the cache
pub struct SourceBuilder {
    cache: Arc<BinaryCache>,
    workspace_root: PathBuf,
    /// One in-flight lock per (ref, network) key
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SourceBuilder {
    /// Create a builder that registers results in `cache` and clones
    /// sources under `workspace_root`
    pub fn new(cache: Arc<BinaryCache>, workspace_root: PathBuf) -> Self {
        Self {
            cache,
            workspace_root,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Build `reference` for `network`, or return the cached entry.
    ///
    /// `on_output` receives each line of build output as it is produced.
    pub async fn build(
        &self,
        reference: &str,
        network: &str,
        instructions: &BuildInstructions,
        on_output: Option<&OutputSink>,
    ) -> HydraResult<BuildResult> {
        let key = format!("{reference}@{network}");
        let lock = {
            let mut map = self.in_flight.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let commit = self.resolve_commit(reference, &instructions.repo).await?;
        debug!("Resolved {reference} to {commit}");

        if let Some(existing) = self.cache.lookup(&commit).await? {
            info!("Cache hit for {reference} ({})", &commit[..12]);
            return Ok(BuildResult {
                binary: existing,
                cache_hit: true,
            });
        }

        // Unique per attempt: two refs can resolve to the same commit, and
        // their builds must not share a checkout.
        let workspace = self
            .workspace_root
            .join(format!("{}-{}", &commit[..12], Uuid::new_v4().simple()));

        let outcome = match self
            .checkout(reference, &commit, &instructions.repo, &workspace)
            .await
        {
            Ok(()) => {
                self.run_build(reference, &workspace, instructions, on_output)
                    .await
            }
            Err(e) => Err(e),
        };

        // The workspace is disposable either way; the artifact has been
        // copied into the cache on success.
        let binary = match outcome {
            Ok(artifact) => {
                let entry = self
                    .cache
                    .store(&artifact, &commit, reference, network)
                    .await?;
                let _ = tokio::fs::remove_dir_all(&workspace).await;
                entry
            }
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&workspace).await;
                return Err(e);
            }
        };

        Ok(BuildResult {
            binary,
            cache_hit: false,
        })
    }

    /// Resolve a reference to a commit hash without mutating anything
    async fn resolve_commit(&self, reference: &str, repo: &str) -> HydraResult<String> {
        if classify_ref(reference) == RefKind::Commit {
            return Ok(reference.to_ascii_lowercase());
        }

        // Annotated tags list both the tag object and the peeled commit
        // (`<ref>^{}`); the peeled line wins.
        let peeled = format!("{reference}^{{}}");
        let output = git(&["ls-remote", repo, reference, &peeled], None).await?;

        if !output.status.success() {
            return Err(HydraError::CloneFailed {
                reference: reference.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut resolved: Option<String> = None;
        for line in stdout.lines() {
            let Some((hash, name)) = line.split_once('\t') else {
                continue;
            };
            if name.ends_with("^{}") || resolved.is_none() {
                resolved = Some(hash.to_string());
            }
        }

        resolved.ok_or_else(|| HydraError::CloneFailed {
            reference: reference.to_string(),
            reason: format!("no ref named {reference} in {repo}"),
        })
    }

    /// Clone the repo into an isolated workspace and check out the commit
    async fn checkout(
        &self,
        reference: &str,
        commit: &str,
        repo: &str,
        workspace: &Path,
    ) -> HydraResult<()> {
        if let Some(parent) = workspace.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HydraError::io("creating build workspace root", e))?;
        }

        let workspace_str = workspace.to_string_lossy();
        let clone = git(&["clone", repo, &workspace_str], None).await?;
        if !clone.status.success() {
            return Err(HydraError::CloneFailed {
                reference: reference.to_string(),
                reason: String::from_utf8_lossy(&clone.stderr).trim().to_string(),
            });
        }

        let checkout = git(&["checkout", "--detach", commit], Some(workspace)).await?;
        if !checkout.status.success() {
            return Err(HydraError::CloneFailed {
                reference: reference.to_string(),
                reason: String::from_utf8_lossy(&checkout.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// Run the plugin's build command and locate the artifact
    async fn run_build(
        &self,
        reference: &str,
        workspace: &Path,
        instructions: &BuildInstructions,
        on_output: Option<&OutputSink>,
    ) -> HydraResult<PathBuf> {
        info!("Building {reference}: {}", instructions.command);

        let mut child = Command::new("sh")
            .args(["-c", &instructions.command])
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HydraError::BuildToolMissing {
                    tool: "sh".to_string(),
                },
                _ => HydraError::command_failed(instructions.command.clone(), e),
            })?;

        let output_lines = stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| HydraError::command_failed(instructions.command.clone(), e))?;

        if !status.success() {
            return Err(HydraError::BuildFailed {
                reference: reference.to_string(),
                log_tail: tail_lines(&output_lines),
            });
        }

        let artifact = workspace.join(&instructions.artifact);
        if !is_executable_file(&artifact) {
            return Err(HydraError::ArtifactNotFound(artifact));
        }

        Ok(artifact)
    }
}

/// Run git with the given args, mapping a missing binary to
/// `BuildToolMissing`
async fn git(args: &[&str], cwd: Option<&Path>) -> HydraResult<std::process::Output> {
    debug!("Executing: git {:?}", args);

    let mut cmd = Command::new("git");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    cmd.output().await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => HydraError::BuildToolMissing {
            tool: "git".to_string(),
        },
        _ => HydraError::command_failed(format!("git {:?}", args), e),
    })
}

/// Extract the useful tail of build output for error diagnostics
fn tail_lines(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

fn is_executable_file(path: &Path) -> bool {
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

/// Stream stdout+stderr from a build child, forwarding each line to the
/// sink. Returns all collected lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: Option<&OutputSink>,
) -> Vec<String> {
    let stderr = child.stderr.take().expect("stderr piped");
    let stdout = child.stdout.take().expect("stdout piped");

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(sink) = on_output {
                            sink(line.clone());
                        }
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(sink) = on_output {
                            sink(line.clone());
                        }
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
