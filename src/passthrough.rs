//! Passthrough execution
//!
//! Forwards arbitrary subcommands to the currently activated binary of a
//! plugin, proxying standard I/O and mirroring the child's exit code so
//! the caller can propagate it verbatim.

use crate::cache::BinaryCache;
use crate::error::{HydraError, HydraResult};
use crate::plugin::PluginRegistry;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run the active binary for `plugin` with `args`, returning the child's
/// exit code.
///
/// Fails with [`HydraError::NotActivated`] when no binary has been
/// activated for the plugin. With `interactive`, the caller's terminal
/// is handed to the child; otherwise stdin is closed.
pub async fn passthrough(
    cache: &BinaryCache,
    plugins: &PluginRegistry,
    plugin: &str,
    args: &[String],
    workdir: Option<&Path>,
    interactive: bool,
) -> HydraResult<i32> {
    let handle = plugins.load(plugin).await?;
    let binary = cache.resolve_active(handle.binary_name()).await?;

    debug!(
        "Passthrough: {} {:?} (interactive={interactive})",
        binary.display(),
        args
    );

    let mut cmd = Command::new(&binary);
    cmd.args(args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd.stdin(if interactive {
        Stdio::inherit()
    } else {
        Stdio::null()
    });
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    let status = cmd
        .status()
        .await
        .map_err(|e| HydraError::command_failed(format!("{} {:?}", binary.display(), args), e))?;

    Ok(status.code().unwrap_or(-1))
}
