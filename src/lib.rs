//! # relay_release
//!
//! Release pipeline for the network relay binary: builds it for every
//! supported OS/architecture target, stages the binaries, runs the workspace
//! test suite, and publishes them as a single multi-architecture container
//! image under a resolved version tag.
//!
//! ## Features
//!
//! - **Fixed target matrix**: platforms are static configuration, joined to
//!   their registry naming by a canonical platform key
//! - **Concurrent builds**: one independent worker per matrix entry, fanned
//!   in at a barrier before anything is published
//! - **All-or-nothing manifests**: a release is published for every declared
//!   architecture or not at all
//! - **Terminal failures**: no retries at this level; every failure carries
//!   its platform and phase
//!
//! ## Usage
//!
//! ```bash
//! relay_release --repository registry.example.com/relay dispatch --version 2.3.0
//! relay_release --repository registry.example.com/relay published --tag v9.9.9
//! relay_release --repository registry.example.com/relay --dry-run dispatch
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod artifact;
pub mod build;
pub mod cli;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod secrets;
pub mod testing;
pub mod version;

// Re-export main types for public API
pub use artifact::{ArtifactStore, BuildArtifact};
pub use build::{BuildConfig, BuildExecutor};
pub use error::{BuildPhase, PipelineError, Result};
pub use matrix::{BuildTarget, MatrixEntry, PublishTarget, TargetMatrix};
pub use pipeline::{Pipeline, PipelineOptions};
pub use publish::{
    DockerBackend, ImageBackend, LayerRef, LayerRequest, PublishOrchestrator, ReleaseImage,
};
pub use report::RunReport;
pub use secrets::{RegistryCredentials, Secrets};
pub use testing::TestExecutor;
pub use version::{ReleaseTrigger, VersionResolver};
