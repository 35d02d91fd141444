//! Phase sequencing for a full release invocation.
//!
//! The version is resolved once and passed explicitly into every phase. Build
//! workers run as independent concurrent tasks joined by a barrier: the
//! publish phase does not begin until every matrix entry has reported, and a
//! failed build phase prevents publishing entirely rather than shipping a
//! manifest with missing architectures. The invocation's terminal status is
//! the logical AND of every platform's build and publish outcome.

use crate::artifact::ArtifactStore;
use crate::build::{BuildConfig, BuildExecutor};
use crate::cli::OutputManager;
use crate::error::{BuildPhase, PipelineError, Result};
use crate::matrix::TargetMatrix;
use crate::publish::{DockerBackend, PublishOrchestrator};
use crate::report::RunReport;
use crate::secrets::Secrets;
use crate::testing::TestExecutor;
use crate::version::{ReleaseTrigger, VersionResolver};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a pipeline invocation needs beyond the trigger and secrets.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Image repository the manifest is pushed to
    pub repository: String,
    /// Compilation settings shared by every matrix entry
    pub build: BuildConfig,
    /// Staging directory artifacts are handed off through
    pub staging_dir: PathBuf,
    /// Dockerfile used for per-architecture layer builds
    pub dockerfile: PathBuf,
    /// Skip the workspace test phase
    pub skip_tests: bool,
    /// Build and test, but stop before any image is pushed
    pub dry_run: bool,
}

/// Sequences one release invocation from trigger to pushed manifest.
pub struct Pipeline {
    options: PipelineOptions,
    output: OutputManager,
}

impl Pipeline {
    /// Create a pipeline with the given options.
    pub fn new(options: PipelineOptions, output: OutputManager) -> Self {
        Self { options, output }
    }

    /// Run the full pipeline and always leave a run report in the staging
    /// directory, whatever the outcome.
    pub async fn run(&self, trigger: &ReleaseTrigger, secrets: Secrets) -> Result<()> {
        let mut report = RunReport::begin();
        let result = self.execute(trigger, secrets, &mut report).await;

        match &result {
            Ok(()) => report.finish(Ok(())),
            Err(err) => report.finish(Err(&err.to_string())),
        }

        // The staging directory may not exist yet if resolution failed early.
        let _ = std::fs::create_dir_all(&self.options.staging_dir);
        let report_path = self.options.staging_dir.join("run-report.json");
        if let Err(err) = report.write(&report_path) {
            log::warn!("could not write run report to {}: {}", report_path.display(), err);
        }

        result
    }

    async fn execute(
        &self,
        trigger: &ReleaseTrigger,
        secrets: Secrets,
        report: &mut RunReport,
    ) -> Result<()> {
        let out = &self.output;

        // ===== PHASE 1: VERSION RESOLUTION =====
        let version = VersionResolver::resolve(trigger)?;
        report.set_version(&version);
        out.info(&format!("Resolved release version: {version}"));

        let matrix = TargetMatrix::standard()?;
        out.info(&format!(
            "Release matrix: {} platform(s): {}",
            matrix.len(),
            matrix
                .entries()
                .iter()
                .map(|e| e.build.platform_id)
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let store = Arc::new(ArtifactStore::open(&self.options.staging_dir)?);

        // ===== PHASE 2: BUILD FAN-OUT =====
        out.section("Build");

        let mut handles = Vec::with_capacity(matrix.len());
        for entry in matrix.entries() {
            let store = Arc::clone(&store);
            let config = self.options.build.clone();
            let build_target = entry.build;
            handles.push((
                *entry,
                tokio::spawn(async move {
                    BuildExecutor::new(build_target, config).run(&store).await
                }),
            ));
        }

        // Fan-in barrier: every entry reports, success or failure, before
        // anything downstream runs. Siblings are never cancelled.
        let mut failures: Vec<PipelineError> = Vec::new();
        for (entry, handle) in handles {
            let platform = entry.build.platform_id;
            match handle.await {
                Ok(Ok(artifact)) => {
                    report.record_build(&artifact);
                    out.success(&format!(
                        "Built {} ({} bytes, sha256 {}...)",
                        platform,
                        artifact.size_bytes,
                        &artifact.sha256[..artifact.sha256.len().min(12)]
                    ));
                }
                Ok(Err(err)) => {
                    report.record_build_failure(platform, &err.to_string());
                    out.error(&format!("Build failed for {platform}: {err}"));
                    failures.push(err);
                }
                Err(join_err) => {
                    let err = PipelineError::BuildFailed {
                        platform: platform.to_string(),
                        phase: BuildPhase::Compile,
                        reason: format!("build task aborted: {join_err}"),
                    };
                    report.record_build_failure(platform, &err.to_string());
                    out.error(&format!("Build failed for {platform}: {err}"));
                    failures.push(err);
                }
            }
        }

        if let Some(first) = failures.into_iter().next() {
            out.error("Build phase incomplete; publish will not start");
            return Err(first);
        }

        // ===== PHASE 3: WORKSPACE TESTS =====
        if self.options.skip_tests {
            out.warn("Skipping workspace tests (--skip-tests); the published image is untested");
            log::warn!("test phase skipped by operator flag");
        } else {
            out.section("Test");
            TestExecutor::new(self.options.build.clone()).run().await?;
            out.success("Workspace tests passed");
        }

        // ===== PHASE 4: PUBLISH =====
        if self.options.dry_run {
            out.warn("Dry run: skipping image publish");
            return Ok(());
        }

        out.section("Publish");
        let backend = DockerBackend::new(
            &self.options.repository,
            &self.options.dockerfile,
            store.root(),
            secrets,
        );
        let orchestrator = PublishOrchestrator::new(&store, &backend);
        let image = orchestrator.publish(&version, matrix.entries()).await?;
        report.set_image(&image);

        out.success(&format!(
            "Published {}:{} with {} architecture(s)",
            self.options.repository,
            image.version,
            image.layers.len()
        ));
        for layer in &image.layers {
            out.indent(&format!("{} ({})", layer.reference, layer.architecture_tag));
        }
        if !image.manifest_digest.is_empty() {
            out.indent(&format!("manifest digest: {}", image.manifest_digest));
        }

        Ok(())
    }
}
