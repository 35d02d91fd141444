//! Multi-architecture image publishing.
//!
//! The orchestrator owns the publish protocol: fetch each platform's staged
//! binary, validate it, delegate the per-architecture layer build to the
//! image backend, and only once every declared architecture has a layer,
//! assemble and push a single manifest. A manifest is all-or-nothing across
//! declared architectures; consumers must never pull an image that silently
//! lacks one.

mod docker;

pub use docker::DockerBackend;

use crate::artifact::{ArtifactStore, BuildArtifact};
use crate::error::{PipelineError, Result};
use crate::matrix::MatrixEntry;
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Inputs for one per-architecture layer build.
#[derive(Debug, Clone)]
pub struct LayerRequest {
    /// Version the release publishes under
    pub version: String,
    /// Platform that produced the binary
    pub platform_id: String,
    /// Registry architecture tag, e.g. "linux/arm64/v8"
    pub architecture_tag: String,
    /// Flattened tag suffix, e.g. "arm64v8"
    pub arch_suffix: String,
    /// Staged binary to embed in the layer
    pub binary_path: PathBuf,
}

/// A pushed per-architecture image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerRef {
    /// Full image reference, e.g. "registry.example.com/relay:2.3.0-amd64"
    pub reference: String,
    /// Registry architecture tag the layer was built for
    pub architecture_tag: String,
}

/// Terminal artifact of a successful pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseImage {
    /// Version tag the manifest was pushed under
    pub version: String,
    /// Per-architecture layers the manifest references
    pub layers: Vec<LayerRef>,
    /// Digest reported by the registry for the pushed manifest
    pub manifest_digest: String,
}

/// Image-build collaborator the orchestrator delegates to.
///
/// The shipped implementation shells out to Docker; tests script a fake.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Verify the backend is usable and authenticate if credentials exist.
    async fn prepare(&self) -> Result<()>;

    /// Build and push one per-architecture layer embedding the binary.
    async fn build_layer(&self, request: &LayerRequest) -> Result<LayerRef>;

    /// Replace any manifest at the version tag with one referencing every
    /// given layer, push it, and return its digest.
    async fn push_manifest(&self, version: &str, layers: &[LayerRef]) -> Result<String>;
}

/// Fan-in publisher: one pass per architecture, then a single manifest push.
pub struct PublishOrchestrator<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn ImageBackend,
}

impl<'a> PublishOrchestrator<'a> {
    /// Create an orchestrator over a store and an image backend.
    pub fn new(store: &'a ArtifactStore, backend: &'a dyn ImageBackend) -> Self {
        Self { store, backend }
    }

    /// Publish a validated multi-architecture release under `version`.
    ///
    /// Every entry gets its fetch/validate/layer pass regardless of sibling
    /// failures, so the operator sees each architecture's own outcome. If any
    /// architecture fails, no manifest referencing the survivors is pushed;
    /// the invocation fails with [`PipelineError::PublishAborted`] listing
    /// exactly which architectures were incomplete.
    pub async fn publish(&self, version: &str, entries: &[MatrixEntry]) -> Result<ReleaseImage> {
        self.backend.prepare().await?;

        let mut layers = Vec::with_capacity(entries.len());
        let mut failed_architectures = Vec::new();

        for entry in entries {
            match self.stage_architecture(version, entry).await {
                Ok(layer) => {
                    log::info!(
                        "layer ready for {}: {}",
                        entry.publish.architecture_tag,
                        layer.reference
                    );
                    layers.push(layer);
                }
                Err(err) => {
                    log::error!(
                        "publish path failed for {} ({}): {}",
                        entry.build.platform_id,
                        entry.publish.architecture_tag,
                        err
                    );
                    failed_architectures.push(entry.publish.architecture_tag.to_string());
                }
            }
        }

        if !failed_architectures.is_empty() {
            return Err(PipelineError::PublishAborted {
                failed_architectures,
            });
        }

        let manifest_digest = self.backend.push_manifest(version, &layers).await?;

        Ok(ReleaseImage {
            version: version.to_string(),
            layers,
            manifest_digest,
        })
    }

    /// One architecture's publish path: fetch, validate, layer build.
    ///
    /// A missing or invalid artifact hard-stops this architecture before any
    /// image work happens for it.
    pub async fn stage_architecture(
        &self,
        version: &str,
        entry: &MatrixEntry,
    ) -> Result<LayerRef> {
        let artifact = self.store.get(entry.build.platform_id)?;
        validate_artifact(&artifact)?;

        self.backend
            .build_layer(&LayerRequest {
                version: version.to_string(),
                platform_id: entry.build.platform_id.to_string(),
                architecture_tag: entry.publish.architecture_tag.to_string(),
                arch_suffix: entry.publish.arch_suffix(),
                binary_path: artifact.path.clone(),
            })
            .await
    }
}

/// Mandatory pre-push check: the staged binary exists and is non-empty.
fn validate_artifact(artifact: &BuildArtifact) -> Result<()> {
    let metadata = fs::metadata(&artifact.path).map_err(|e| PipelineError::ArtifactInvalid {
        platform: artifact.platform_id.clone(),
        reason: format!("missing at {}: {}", artifact.path.display(), e),
    })?;

    if metadata.len() == 0 {
        return Err(PipelineError::ArtifactInvalid {
            platform: artifact.platform_id.clone(),
            reason: format!("empty (0 bytes) at {}", artifact.path.display()),
        });
    }

    Ok(())
}
