//! Relay workspace test execution between the build and publish phases.

use crate::build::BuildConfig;
use crate::error::{PipelineError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for the workspace test suite (30 minutes)
pub const TEST_TIMEOUT: Duration = Duration::from_secs(1800);

/// Runs the relay workspace's test suite once, natively, after the build
/// barrier and before any image work begins.
pub struct TestExecutor {
    config: BuildConfig,
}

impl TestExecutor {
    /// Create a test executor over the relay workspace.
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Run the suite; a failing suite is terminal for the invocation.
    pub async fn run(&self) -> Result<()> {
        let args = test_args(&self.config);
        log::info!("running workspace tests: cargo {}", args.join(" "));

        let output = timeout(
            TEST_TIMEOUT,
            Command::new("cargo")
                .args(&args)
                .current_dir(&self.config.workspace_dir)
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| PipelineError::TestsFailed {
            reason: format!("test suite timed out after {} seconds", TEST_TIMEOUT.as_secs()),
        })?
        .map_err(|e| PipelineError::TestsFailed {
            reason: format!("failed to spawn 'cargo test': {}", e),
        })?;

        if !output.status.success() {
            return Err(PipelineError::TestsFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Argument list for the test invocation, mirroring the build settings.
pub(crate) fn test_args(config: &BuildConfig) -> Vec<String> {
    let mut args = vec!["test".to_string(), "--release".to_string()];
    if config.locked {
        args.push("--locked".to_string());
    }
    if config.offline {
        args.push("--offline".to_string());
    }
    args
}
