//! Build and publish target matrices.
//!
//! The target set is static configuration, reviewed by hand whenever a
//! platform is added, never discovered at runtime. Platform identity carries
//! two naming schemes that are not interchangeable: the compiler triple used
//! to build the binary and the registry architecture tag used to publish it.
//! The two views are joined by the canonical `platform_id` key, never by
//! list position.

use crate::error::{PipelineError, Result};

/// One entry of the build matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTarget {
    /// Canonical platform key, e.g. "linux-x64"
    pub platform_id: &'static str,
    /// Host runner class this target builds on, e.g. "ubuntu-22.04"
    pub os_runner: &'static str,
    /// Compiler target triple, e.g. "x86_64-unknown-linux-gnu"
    pub compiler_triple: &'static str,
    /// Whether the build host needs a cross-compilation toolchain
    pub requires_cross_compile: bool,
}

/// Registry-side view of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishTarget {
    /// Canonical platform key, matching a [`BuildTarget`]
    pub platform_id: &'static str,
    /// Registry/runtime architecture tag, e.g. "linux/arm64/v8"
    pub architecture_tag: &'static str,
}

impl PublishTarget {
    /// Suffix used for per-architecture layer tags, e.g. "arm64v8".
    pub fn arch_suffix(&self) -> String {
        self.architecture_tag
            .strip_prefix("linux/")
            .unwrap_or(self.architecture_tag)
            .replace('/', "")
    }
}

/// A build target paired with its registry view, joined by platform key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixEntry {
    /// Compiler-side view of the platform
    pub build: BuildTarget,
    /// Registry-side view of the platform
    pub publish: PublishTarget,
}

/// The fixed build-side matrix.
const BUILD_TARGETS: &[BuildTarget] = &[
    BuildTarget {
        platform_id: "linux-x64",
        os_runner: "ubuntu-22.04",
        compiler_triple: "x86_64-unknown-linux-gnu",
        requires_cross_compile: false,
    },
    BuildTarget {
        platform_id: "linux-arm64",
        os_runner: "ubuntu-22.04",
        compiler_triple: "aarch64-unknown-linux-gnu",
        requires_cross_compile: true,
    },
];

/// The fixed registry-side matrix.
const PUBLISH_TARGETS: &[PublishTarget] = &[
    PublishTarget {
        platform_id: "linux-x64",
        architecture_tag: "linux/amd64",
    },
    PublishTarget {
        platform_id: "linux-arm64",
        architecture_tag: "linux/arm64/v8",
    },
];

/// The ordered set of platforms a release builds and publishes.
#[derive(Debug, Clone)]
pub struct TargetMatrix {
    entries: Vec<MatrixEntry>,
}

impl TargetMatrix {
    /// The shipped release matrix, with the build/publish join validated.
    pub fn standard() -> Result<Self> {
        Self::join(BUILD_TARGETS, PUBLISH_TARGETS)
    }

    /// Join the two platform views by canonical key.
    ///
    /// Rejects mismatched pair counts, duplicate keys, and publish entries
    /// with no build counterpart, so an edit to one matrix cannot silently
    /// drop or mispair an architecture.
    pub fn join(builds: &[BuildTarget], publishes: &[PublishTarget]) -> Result<Self> {
        if builds.len() != publishes.len() {
            return Err(PipelineError::MatrixMismatch {
                reason: format!(
                    "{} build target(s) but {} publish target(s)",
                    builds.len(),
                    publishes.len()
                ),
            });
        }

        let mut entries = Vec::with_capacity(builds.len());
        for build in builds {
            if entries
                .iter()
                .any(|e: &MatrixEntry| e.build.platform_id == build.platform_id)
            {
                return Err(PipelineError::MatrixMismatch {
                    reason: format!("duplicate platform key '{}'", build.platform_id),
                });
            }

            let publish = publishes
                .iter()
                .find(|p| p.platform_id == build.platform_id)
                .ok_or_else(|| PipelineError::MatrixMismatch {
                    reason: format!(
                        "no publish target for build platform '{}'",
                        build.platform_id
                    ),
                })?;

            entries.push(MatrixEntry {
                build: *build,
                publish: *publish,
            });
        }

        Ok(Self { entries })
    }

    /// Joined entries, in build-matrix order.
    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Number of platforms in the matrix.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
