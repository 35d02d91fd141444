//! Cross-compilation toolchain provisioning.

use crate::error::{BuildPhase, PipelineError, Result};
use crate::matrix::BuildTarget;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for installing the cross toolchain (10 minutes)
pub const TOOLCHAIN_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Ensure the `cross` front-end is available before a cross-compiled build.
///
/// A toolchain that is already on `PATH` is accepted as-is. Otherwise it is
/// installed with a locked `cargo install`; any failure here surfaces as the
/// `Toolchain` phase of the target's build, distinct from compile failures.
pub async fn ensure_cross_available(target: &BuildTarget) -> Result<()> {
    if which::which("cross").is_ok() {
        log::debug!("cross toolchain already on PATH");
        return Ok(());
    }

    log::info!(
        "installing cross toolchain for {} ({})",
        target.platform_id,
        target.compiler_triple
    );

    let output = timeout(
        TOOLCHAIN_INSTALL_TIMEOUT,
        Command::new("cargo")
            .args(["install", "cross", "--locked"])
            .stdin(Stdio::null())
            .output(),
    )
    .await
    .map_err(|_| PipelineError::BuildFailed {
        platform: target.platform_id.to_string(),
        phase: BuildPhase::Toolchain,
        reason: format!(
            "'cargo install cross' timed out after {} seconds",
            TOOLCHAIN_INSTALL_TIMEOUT.as_secs()
        ),
    })?
    .map_err(|e| PipelineError::BuildFailed {
        platform: target.platform_id.to_string(),
        phase: BuildPhase::Toolchain,
        reason: format!("failed to spawn 'cargo install cross': {}", e),
    })?;

    if !output.status.success() {
        return Err(PipelineError::BuildFailed {
            platform: target.platform_id.to_string(),
            phase: BuildPhase::Toolchain,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
