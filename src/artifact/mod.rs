//! Invocation-scoped artifact hand-off between the build and publish phases.
//!
//! Each platform key is written by exactly one build task and read by exactly
//! one publish pass, so the store needs no fine-grained locking beyond an
//! index guard. Artifacts land at deterministic per-platform paths so producer
//! and consumer agree on the key without further coordination.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A built relay binary, immutable once stored.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Platform that produced the binary
    pub platform_id: String,
    /// Location of the staged binary
    pub path: PathBuf,
    /// Size of the staged binary in bytes
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 digest of the staged binary
    pub sha256: String,
    /// When the artifact was staged
    pub produced_at: DateTime<Utc>,
}

/// Keyed hand-off storage between build executors and the publish
/// orchestrator, scoped to one pipeline invocation.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    slots: Mutex<HashMap<String, BuildArtifact>>,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Directory the store stages artifacts under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage a built binary under the platform key.
    ///
    /// Copies `source` into the platform's slot and records its digest.
    /// Idempotent per invocation: a second `put` for the same key replaces
    /// the previous artifact.
    pub fn put(&self, platform_id: &str, binary_name: &str, source: &Path) -> Result<BuildArtifact> {
        let slot_dir = self.root.join(platform_id);
        fs::create_dir_all(&slot_dir)?;
        let staged = slot_dir.join(binary_name);
        fs::copy(source, &staged)?;

        let size_bytes = fs::metadata(&staged)?.len();
        let sha256 = file_digest(&staged)?;

        let artifact = BuildArtifact {
            platform_id: platform_id.to_string(),
            path: staged,
            size_bytes,
            sha256,
            produced_at: Utc::now(),
        };

        self.slots
            .lock()
            .expect("artifact index lock poisoned")
            .insert(platform_id.to_string(), artifact.clone());

        log::debug!(
            "staged artifact for {}: {} bytes, sha256 {}",
            platform_id,
            artifact.size_bytes,
            artifact.sha256
        );
        Ok(artifact)
    }

    /// Fetch the artifact stored under the platform key.
    ///
    /// Fails with [`PipelineError::ArtifactMissing`] when no completed build
    /// has stored anything for that key; the consumer must not substitute a
    /// default.
    pub fn get(&self, platform_id: &str) -> Result<BuildArtifact> {
        self.slots
            .lock()
            .expect("artifact index lock poisoned")
            .get(platform_id)
            .cloned()
            .ok_or_else(|| PipelineError::ArtifactMissing {
                platform: platform_id.to_string(),
            })
    }

    /// Platform keys with a stored artifact, unordered.
    pub fn platforms(&self) -> Vec<String> {
        self.slots
            .lock()
            .expect("artifact index lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Hex-encoded SHA-256 of a file, streamed.
fn file_digest(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_binary(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn put_then_get_round_trips_by_platform_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path().join("staging")).unwrap();
        let source = write_binary(tmp.path(), "relay", b"binary-bytes");

        let stored = store.put("linux-x64", "relay", &source).unwrap();
        assert_eq!(stored.size_bytes, 12);
        assert_eq!(stored.path, store.root().join("linux-x64").join("relay"));

        let fetched = store.get("linux-x64").unwrap();
        assert_eq!(fetched.sha256, stored.sha256);
        assert!(fetched.path.exists());
    }

    #[test]
    fn get_for_unbuilt_platform_fails_with_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path().join("staging")).unwrap();
        let source = write_binary(tmp.path(), "relay", b"x64-bytes");
        store.put("linux-x64", "relay", &source).unwrap();

        let err = store.get("linux-arm64").unwrap_err();
        match err {
            PipelineError::ArtifactMissing { platform } => assert_eq!(platform, "linux-arm64"),
            other => panic!("expected ArtifactMissing, got {other}"),
        }
    }

    #[test]
    fn second_put_for_same_key_replaces_the_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path().join("staging")).unwrap();
        let first = write_binary(tmp.path(), "relay-a", b"first");
        let second = write_binary(tmp.path(), "relay-b", b"second-longer");

        store.put("linux-x64", "relay", &first).unwrap();
        store.put("linux-x64", "relay", &second).unwrap();

        let fetched = store.get("linux-x64").unwrap();
        assert_eq!(fetched.size_bytes, 13);
        assert_eq!(fs::read(&fetched.path).unwrap(), b"second-longer");
    }

    #[test]
    fn digest_is_stable_for_identical_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path().join("staging")).unwrap();
        let a = write_binary(tmp.path(), "a", b"same-bytes");
        let b = write_binary(tmp.path(), "b", b"same-bytes");

        let first = store.put("linux-x64", "relay", &a).unwrap();
        let second = store.put("linux-arm64", "relay", &b).unwrap();
        assert_eq!(first.sha256, second.sha256);
    }
}
