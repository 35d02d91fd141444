//! Per-target compilation of the relay binary.
//!
//! One executor runs per matrix entry. Entries are independent, share no
//! mutable state, and may run concurrently; a failure in one must not cancel
//! its siblings. Each executor either stages exactly one complete artifact or
//! stages nothing.

mod toolchain;

pub use toolchain::ensure_cross_available;

use crate::artifact::{ArtifactStore, BuildArtifact};
use crate::error::{BuildPhase, PipelineError, Result};
use crate::matrix::BuildTarget;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for a single compiler invocation (30 minutes)
///
/// Covers dependency compilation on a cold target directory; the host
/// environment may enforce tighter limits on top.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Process-wide compilation settings shared by every matrix entry.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Relay workspace to compile
    pub workspace_dir: PathBuf,
    /// Name of the relay binary target within the workspace
    pub binary_name: String,
    /// Require Cargo.lock to be up to date (`--locked`)
    pub locked: bool,
    /// Resolve dependencies without network access (`--offline`)
    pub offline: bool,
}

/// Builds one matrix entry into one staged artifact.
pub struct BuildExecutor {
    target: BuildTarget,
    config: BuildConfig,
}

impl BuildExecutor {
    /// Create an executor for one matrix entry.
    pub fn new(target: BuildTarget, config: BuildConfig) -> Self {
        Self { target, config }
    }

    /// Build the target and hand the resulting binary to `store`.
    ///
    /// Provisions the cross toolchain first when the target needs one; that
    /// step failing is reported as the `Toolchain` phase, distinct from
    /// compiler failures. A compiler run that reports success but leaves a
    /// missing or zero-byte binary is a contract violation and fails the
    /// build rather than passing downstream.
    pub async fn run(&self, store: &ArtifactStore) -> Result<BuildArtifact> {
        let platform = self.target.platform_id;

        if self.target.requires_cross_compile {
            ensure_cross_available(&self.target).await?;
        }

        log::info!(
            "compiling {} for {} ({})",
            self.config.binary_name,
            platform,
            self.target.compiler_triple
        );

        let program = compiler_program(&self.target);
        let args = compiler_args(&self.target, &self.config);
        let invocation = format!("{} {}", program, args.join(" "));

        let output = timeout(
            COMPILE_TIMEOUT,
            Command::new(program)
                .args(&args)
                .current_dir(&self.config.workspace_dir)
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| PipelineError::BuildFailed {
            platform: platform.to_string(),
            phase: BuildPhase::Compile,
            reason: format!(
                "'{}' timed out after {} seconds",
                invocation,
                COMPILE_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| PipelineError::BuildFailed {
            platform: platform.to_string(),
            phase: BuildPhase::Compile,
            reason: format!("failed to spawn '{}': {}", invocation, e),
        })?;

        if !output.status.success() {
            return Err(PipelineError::BuildFailed {
                platform: platform.to_string(),
                phase: BuildPhase::Compile,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let binary = artifact_output_path(&self.target, &self.config);
        match std::fs::metadata(&binary) {
            Ok(metadata) if metadata.len() > 0 => {}
            Ok(_) => {
                return Err(PipelineError::BuildFailed {
                    platform: platform.to_string(),
                    phase: BuildPhase::Compile,
                    reason: format!(
                        "compiler reported success but artifact is empty: {}",
                        binary.display()
                    ),
                });
            }
            Err(e) => {
                return Err(PipelineError::BuildFailed {
                    platform: platform.to_string(),
                    phase: BuildPhase::Compile,
                    reason: format!(
                        "compiler reported success but artifact is missing at {}: {}",
                        binary.display(),
                        e
                    ),
                });
            }
        }

        store.put(platform, &self.config.binary_name, &binary)
    }
}

/// Compiler front-end for the target: `cross` for cross targets, `cargo` otherwise.
pub(crate) fn compiler_program(target: &BuildTarget) -> &'static str {
    if target.requires_cross_compile {
        "cross"
    } else {
        "cargo"
    }
}

/// Argument list for the compiler invocation. Release optimization is always on.
pub(crate) fn compiler_args(target: &BuildTarget, config: &BuildConfig) -> Vec<String> {
    let mut args = vec!["build".to_string(), "--release".to_string()];
    if config.locked {
        args.push("--locked".to_string());
    }
    if config.offline {
        args.push("--offline".to_string());
    }
    args.push("--target".to_string());
    args.push(target.compiler_triple.to_string());
    args.push("--bin".to_string());
    args.push(config.binary_name.clone());
    args
}

/// Conventional output path the toolchain leaves the binary at.
pub fn artifact_output_path(target: &BuildTarget, config: &BuildConfig) -> PathBuf {
    config
        .workspace_dir
        .join("target")
        .join(target.compiler_triple)
        .join("release")
        .join(&config.binary_name)
}
