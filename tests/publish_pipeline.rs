//! Publish protocol tests against a scripted image backend.
//!
//! The backend fake records every layer build and manifest push so the tests
//! can assert what would have reached the registry.

use async_trait::async_trait;
use relay_release::{
    ArtifactStore, ImageBackend, LayerRef, LayerRequest, PipelineError, PublishOrchestrator,
    ReleaseTrigger, TargetMatrix, VersionResolver,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// Records registry traffic; fails layer builds for scripted architectures.
struct FakeBackend {
    repository: String,
    fail_architectures: HashSet<String>,
    layers_built: Mutex<Vec<LayerRequest>>,
    manifests_pushed: Mutex<Vec<(String, Vec<LayerRef>)>>,
}

impl FakeBackend {
    fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            fail_architectures: HashSet::new(),
            layers_built: Mutex::new(Vec::new()),
            manifests_pushed: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(repository: &str, architecture_tag: &str) -> Self {
        let mut backend = Self::new(repository);
        backend
            .fail_architectures
            .insert(architecture_tag.to_string());
        backend
    }

    fn built_architectures(&self) -> Vec<String> {
        self.layers_built
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.architecture_tag.clone())
            .collect()
    }

    fn pushed_manifests(&self) -> Vec<(String, Vec<LayerRef>)> {
        self.manifests_pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBackend for FakeBackend {
    async fn prepare(&self) -> relay_release::Result<()> {
        Ok(())
    }

    async fn build_layer(&self, request: &LayerRequest) -> relay_release::Result<LayerRef> {
        if self.fail_architectures.contains(&request.architecture_tag) {
            return Err(PipelineError::Registry {
                operation: "docker build".to_string(),
                reason: format!("scripted failure for {}", request.architecture_tag),
            });
        }

        self.layers_built.lock().unwrap().push(request.clone());
        Ok(LayerRef {
            reference: format!(
                "{}:{}-{}",
                self.repository, request.version, request.arch_suffix
            ),
            architecture_tag: request.architecture_tag.clone(),
        })
    }

    async fn push_manifest(
        &self,
        version: &str,
        layers: &[LayerRef],
    ) -> relay_release::Result<String> {
        self.manifests_pushed
            .lock()
            .unwrap()
            .push((format!("{}:{}", self.repository, version), layers.to_vec()));
        Ok("sha256:0000000000000000000000000000000000000000000000000000000000000000".to_string())
    }
}

fn stage(store: &ArtifactStore, platform_id: &str, contents: &[u8]) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("relay");
    std::fs::write(&source, contents).unwrap();
    store.put(platform_id, "relay", &source).unwrap();
}

fn open_store(root: &Path) -> ArtifactStore {
    ArtifactStore::open(root.join("staging")).unwrap()
}

#[tokio::test]
async fn missing_artifact_fails_fetch_and_aborts_the_publish() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");
    // linux-arm64 never built

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    // The arm64 publish path fails with ArtifactMissing at fetch time.
    let arm_entry = &matrix.entries()[1];
    let err = orchestrator
        .stage_architecture("1.0.0", arm_entry)
        .await
        .unwrap_err();
    match err {
        PipelineError::ArtifactMissing { platform } => assert_eq!(platform, "linux-arm64"),
        other => panic!("expected ArtifactMissing, got {other}"),
    }

    // The aggregate publish aborts and pushes nothing.
    let err = orchestrator
        .publish("1.0.0", matrix.entries())
        .await
        .unwrap_err();
    match err {
        PipelineError::PublishAborted {
            failed_architectures,
        } => assert_eq!(failed_architectures, vec!["linux/arm64/v8".to_string()]),
        other => panic!("expected PublishAborted, got {other}"),
    }
    assert!(backend.pushed_manifests().is_empty());
}

#[tokio::test]
async fn empty_artifact_is_rejected_before_any_image_work() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    let err = orchestrator
        .stage_architecture("1.0.0", &matrix.entries()[0])
        .await
        .unwrap_err();
    match err {
        PipelineError::ArtifactInvalid { platform, reason } => {
            assert_eq!(platform, "linux-x64");
            assert!(reason.contains("empty"));
        }
        other => panic!("expected ArtifactInvalid, got {other}"),
    }
    assert!(backend.built_architectures().is_empty());
}

#[tokio::test]
async fn one_failed_layer_aborts_without_a_partial_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");
    stage(&store, "linux-arm64", b"arm64-binary");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::failing_for("repo/relay", "linux/arm64/v8");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    let err = orchestrator
        .publish("1.0.0", matrix.entries())
        .await
        .unwrap_err();
    match err {
        PipelineError::PublishAborted {
            failed_architectures,
        } => assert_eq!(failed_architectures, vec!["linux/arm64/v8".to_string()]),
        other => panic!("expected PublishAborted, got {other}"),
    }

    // The surviving architecture still got its own pass, but no manifest
    // referencing it alone was pushed.
    assert_eq!(backend.built_architectures(), vec!["linux/amd64"]);
    assert!(backend.pushed_manifests().is_empty());
}

#[tokio::test]
async fn successful_publish_pushes_one_manifest_with_every_layer() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");
    stage(&store, "linux-arm64", b"arm64-binary");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    let image = orchestrator.publish("2.3.0", matrix.entries()).await.unwrap();
    assert_eq!(image.version, "2.3.0");
    assert_eq!(image.layers.len(), 2);
    assert!(!image.manifest_digest.is_empty());

    let manifests = backend.pushed_manifests();
    assert_eq!(manifests.len(), 1);
    let (reference, layers) = &manifests[0];
    assert_eq!(reference, "repo/relay:2.3.0");
    let references: Vec<_> = layers.iter().map(|l| l.reference.as_str()).collect();
    assert_eq!(
        references,
        ["repo/relay:2.3.0-amd64", "repo/relay:2.3.0-arm64v8"]
    );
}

#[tokio::test]
async fn republishing_the_same_version_replaces_the_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");
    stage(&store, "linux-arm64", b"arm64-binary");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    orchestrator.publish("2.3.0", matrix.entries()).await.unwrap();
    orchestrator.publish("2.3.0", matrix.entries()).await.unwrap();

    let manifests = backend.pushed_manifests();
    assert_eq!(manifests.len(), 2);
    assert_eq!(manifests[0].0, manifests[1].0);
    assert_eq!(manifests[0].1.len(), manifests[1].1.len());
}

#[tokio::test]
async fn manual_dispatch_release_publishes_both_architectures() {
    // Trigger: operator dispatch with an explicit version. Both platforms
    // have staged binaries; the final state is one manifest at repo:2.3.0
    // referencing amd64 and arm64/v8 layers.
    let trigger = ReleaseTrigger::ManualDispatch {
        supplied_version: Some("2.3.0".to_string()),
    };
    let version = VersionResolver::resolve(&trigger).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");
    stage(&store, "linux-arm64", b"arm64-binary");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    let image = orchestrator.publish(&version, matrix.entries()).await.unwrap();
    let tags: Vec<_> = image
        .layers
        .iter()
        .map(|l| l.architecture_tag.as_str())
        .collect();
    assert_eq!(tags, ["linux/amd64", "linux/arm64/v8"]);
    assert_eq!(backend.pushed_manifests()[0].0, "repo/relay:2.3.0");
}

#[tokio::test]
async fn published_trigger_failure_leaves_the_version_unpushed() {
    // Trigger: release published with tag v9.9.9, but the arm64 build never
    // staged an artifact (its toolchain install failed upstream). Nothing may
    // be pushed under the tag.
    let trigger = ReleaseTrigger::ReleasePublished {
        release_tag: Some("v9.9.9".to_string()),
    };
    let version = VersionResolver::resolve(&trigger).unwrap();
    assert_eq!(version, "v9.9.9");

    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    stage(&store, "linux-x64", b"x64-binary");

    let matrix = TargetMatrix::standard().unwrap();
    let backend = FakeBackend::new("repo/relay");
    let orchestrator = PublishOrchestrator::new(&store, &backend);

    let err = orchestrator
        .publish(&version, matrix.entries())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PublishAborted { .. }));
    assert!(backend.pushed_manifests().is_empty());
}
