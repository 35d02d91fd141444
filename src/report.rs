//! JSON run reports written alongside staged artifacts.
//!
//! Informational only: report I/O failures are logged and never change the
//! pipeline's terminal status.

use crate::artifact::BuildArtifact;
use crate::publish::ReleaseImage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Outcome of one platform's build.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildRecord {
    /// The platform staged a complete artifact.
    Succeeded {
        /// Platform identifier
        platform_id: String,
        /// Size of the staged binary in bytes
        size_bytes: u64,
        /// Hex-encoded SHA-256 digest of the staged binary
        sha256: String,
        /// When the artifact was staged
        produced_at: DateTime<Utc>,
    },
    /// The platform's build failed.
    Failed {
        /// Platform identifier
        platform_id: String,
        /// Failure description, including the phase tag
        error: String,
    },
}

/// Summary of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Resolved version, once resolution has happened
    pub version: Option<String>,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// When the invocation finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal outcome: "succeeded", or the failure description
    pub outcome: Option<String>,
    /// Per-platform build outcomes, in matrix order
    pub builds: Vec<BuildRecord>,
    /// The published image, when the publish phase completed
    pub image: Option<ReleaseImage>,
}

impl RunReport {
    /// Start a report for an invocation beginning now.
    pub fn begin() -> Self {
        Self {
            version: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            builds: Vec::new(),
            image: None,
        }
    }

    /// Record the resolved version.
    pub fn set_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
    }

    /// Record a successful platform build.
    pub fn record_build(&mut self, artifact: &BuildArtifact) {
        self.builds.push(BuildRecord::Succeeded {
            platform_id: artifact.platform_id.clone(),
            size_bytes: artifact.size_bytes,
            sha256: artifact.sha256.clone(),
            produced_at: artifact.produced_at,
        });
    }

    /// Record a failed platform build.
    pub fn record_build_failure(&mut self, platform_id: &str, error: &str) {
        self.builds.push(BuildRecord::Failed {
            platform_id: platform_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Record the published image.
    pub fn set_image(&mut self, image: &ReleaseImage) {
        self.image = Some(image.clone());
    }

    /// Close the report with the invocation's terminal outcome.
    pub fn finish(&mut self, outcome: Result<(), &str>) {
        self.finished_at = Some(Utc::now());
        self.outcome = Some(match outcome {
            Ok(()) => "succeeded".to_string(),
            Err(error) => error.to_string(),
        });
    }

    /// Write the report as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> crate::error::Result<()> {
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::LayerRef;
    use std::path::PathBuf;

    #[test]
    fn report_round_trips_through_json() {
        let mut report = RunReport::begin();
        report.set_version("2.3.0");
        report.record_build(&BuildArtifact {
            platform_id: "linux-x64".to_string(),
            path: PathBuf::from("/staging/linux-x64/relay"),
            size_bytes: 42,
            sha256: "abc123".to_string(),
            produced_at: Utc::now(),
        });
        report.record_build_failure("linux-arm64", "Build failed (Toolchain phase)");
        report.set_image(&ReleaseImage {
            version: "2.3.0".to_string(),
            layers: vec![LayerRef {
                reference: "repo:2.3.0-amd64".to_string(),
                architecture_tag: "linux/amd64".to_string(),
            }],
            manifest_digest: "sha256:feed".to_string(),
        });
        report.finish(Ok(()));

        let rendered = serde_json::to_string(&report).unwrap();
        assert!(rendered.contains("\"version\":\"2.3.0\""));
        assert!(rendered.contains("linux-arm64"));
        assert!(rendered.contains("succeeded"));
    }

    #[test]
    fn write_creates_the_report_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = RunReport::begin();
        report.finish(Err("Test suite failed"));

        let path = tmp.path().join("run-report.json");
        report.write(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Test suite failed"));
    }
}
