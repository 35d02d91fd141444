//! Error types for relay_release operations.
//!
//! Every failure is terminal for the pipeline invocation: retries, if any,
//! belong to the external build and registry tooling, never to this crate.

use std::fmt;
use thiserror::Error;

/// Result type alias for relay_release operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Phase of a single-target build in which a failure occurred.
///
/// Toolchain provisioning failures are reported distinctly from compiler
/// failures so an operator can tell a broken cross environment apart from
/// broken relay code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Provisioning the cross-compilation toolchain.
    Toolchain,
    /// Invoking the compiler, or verifying the binary it claims to have produced.
    Compile,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Toolchain => write!(f, "Toolchain"),
            BuildPhase::Compile => write!(f, "Compile"),
        }
    }
}

/// Main error type for all relay_release operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The trigger carried neither an explicit version nor a release tag.
    #[error(
        "No version available: the trigger carried neither an explicit version nor a release tag"
    )]
    MissingVersion,

    /// A single build target failed during toolchain provisioning or compilation.
    #[error("Build failed for '{platform}' ({phase} phase): {reason}")]
    BuildFailed {
        /// Platform identifier of the failed target
        platform: String,
        /// Phase in which the failure occurred
        phase: BuildPhase,
        /// Underlying failure description
        reason: String,
    },

    /// The relay workspace test suite failed.
    #[error("Test suite failed: {reason}")]
    TestsFailed {
        /// Underlying failure description
        reason: String,
    },

    /// No build has stored an artifact under the requested platform key.
    #[error("No artifact stored for platform '{platform}'")]
    ArtifactMissing {
        /// Platform identifier that was requested
        platform: String,
    },

    /// A stored artifact is absent or empty at its expected location.
    #[error("Artifact for platform '{platform}' is invalid: {reason}")]
    ArtifactInvalid {
        /// Platform identifier of the bad artifact
        platform: String,
        /// What the validation found
        reason: String,
    },

    /// One or more architectures did not produce an image layer, so no
    /// manifest was pushed.
    #[error("Publish aborted, incomplete architectures: {failed_architectures:?}")]
    PublishAborted {
        /// Architecture tags that failed to produce a layer
        failed_architectures: Vec<String>,
    },

    /// The build and publish target sets do not describe the same platforms.
    #[error("Build and publish matrices do not agree: {reason}")]
    MatrixMismatch {
        /// What the join validation found
        reason: String,
    },

    /// A container registry or daemon operation failed.
    #[error("Registry operation failed: {operation} - {reason}")]
    Registry {
        /// Operation that failed
        operation: String,
        /// Underlying failure description
        reason: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl PipelineError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PipelineError::MissingVersion => vec![
                "Pass an explicit version: relay_release ... dispatch --version 1.2.3".to_string(),
                "Or run from a published release that carries a tag".to_string(),
            ],
            PipelineError::BuildFailed {
                phase: BuildPhase::Toolchain,
                ..
            } => vec![
                "Install the cross toolchain manually: cargo install cross --locked".to_string(),
                "Verify the container runtime cross depends on is available".to_string(),
            ],
            PipelineError::Registry { .. } => vec![
                "Check the Docker daemon is running: docker info".to_string(),
                "Verify REGISTRY_USERNAME / REGISTRY_PASSWORD are set for private registries"
                    .to_string(),
            ],
            PipelineError::PublishAborted { .. } => vec![
                "Fix the failed architectures and re-run; re-publishing the same version replaces the manifest"
                    .to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
