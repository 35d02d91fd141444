//! Command line argument parsing and validation.

use crate::build::BuildConfig;
use crate::pipeline::PipelineOptions;
use crate::version::ReleaseTrigger;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release pipeline for the network relay binary
#[derive(Parser, Debug)]
#[command(
    name = "relay_release",
    version,
    about = "Build the relay for every supported architecture and publish a multi-arch image",
    long_about = "Builds the relay binary for each platform in the release matrix \
(natively or via cross), stages the artifacts, runs the workspace test suite, and \
publishes a single multi-architecture container image under the resolved version tag.

Registry credentials and TLS material are read from the environment:
  REGISTRY_USERNAME / REGISTRY_PASSWORD
  SERVER_CA_CERT / SERVER_CA_KEY"
)]
pub struct Args {
    /// Image repository the manifest is pushed to, e.g. "registry.example.com/relay"
    #[arg(long, env = "RELAY_IMAGE_REPOSITORY")]
    pub repository: String,

    /// Relay workspace to compile
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub workspace: PathBuf,

    /// Name of the relay binary target within the workspace
    #[arg(long, default_value = "relay")]
    pub binary_name: String,

    /// Staging directory for built artifacts (default: <workspace>/target/release-staging)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Dockerfile used for per-architecture layer builds
    #[arg(long, default_value = "Dockerfile", value_name = "FILE")]
    pub dockerfile: PathBuf,

    /// Allow Cargo.lock to be updated during builds
    #[arg(long)]
    pub unlocked: bool,

    /// Resolve dependencies without network access
    #[arg(long)]
    pub offline: bool,

    /// Skip the workspace test phase
    #[arg(long)]
    pub skip_tests: bool,

    /// Build and test, but do not push any image
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors are still printed)
    #[arg(long, short)]
    pub quiet: bool,

    /// How this invocation was triggered
    #[command(subcommand)]
    pub trigger: TriggerCommand,
}

/// How this invocation was triggered.
#[derive(Subcommand, Debug)]
pub enum TriggerCommand {
    /// Operator-initiated release
    Dispatch {
        /// Version to publish under
        #[arg(long, default_value = "1.0.0")]
        version: String,
    },
    /// Run for an already-published release, using its tag as the version
    Published {
        /// Tag attached to the published release
        #[arg(long)]
        tag: Option<String>,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The release trigger this invocation models.
    pub fn trigger(&self) -> ReleaseTrigger {
        match &self.trigger {
            TriggerCommand::Dispatch { version } => ReleaseTrigger::ManualDispatch {
                supplied_version: Some(version.clone()),
            },
            TriggerCommand::Published { tag } => ReleaseTrigger::ReleasePublished {
                release_tag: tag.clone(),
            },
        }
    }

    /// Pipeline options derived from the arguments.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let staging_dir = self
            .staging_dir
            .clone()
            .unwrap_or_else(|| self.workspace.join("target").join("release-staging"));

        PipelineOptions {
            repository: self.repository.clone(),
            build: BuildConfig {
                workspace_dir: self.workspace.clone(),
                binary_name: self.binary_name.clone(),
                locked: !self.unlocked,
                offline: self.offline,
            },
            staging_dir,
            dockerfile: self.dockerfile.clone(),
            skip_tests: self.skip_tests,
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn dispatch_wires_the_default_version_through() {
        let args = parse(&["relay_release", "--repository", "org/relay", "dispatch"]);
        assert_eq!(
            args.trigger(),
            ReleaseTrigger::ManualDispatch {
                supplied_version: Some("1.0.0".to_string()),
            }
        );
    }

    #[test]
    fn dispatch_accepts_an_explicit_version() {
        let args = parse(&[
            "relay_release",
            "--repository",
            "org/relay",
            "dispatch",
            "--version",
            "2.3.0",
        ]);
        assert_eq!(
            args.trigger(),
            ReleaseTrigger::ManualDispatch {
                supplied_version: Some("2.3.0".to_string()),
            }
        );
    }

    #[test]
    fn published_without_tag_leaves_resolution_to_fail() {
        let args = parse(&["relay_release", "--repository", "org/relay", "published"]);
        assert_eq!(
            args.trigger(),
            ReleaseTrigger::ReleasePublished { release_tag: None }
        );
    }

    #[test]
    fn builds_are_locked_unless_opted_out() {
        let args = parse(&["relay_release", "--repository", "org/relay", "dispatch"]);
        let options = args.pipeline_options();
        assert!(options.build.locked);
        assert!(!options.build.offline);

        let args = parse(&[
            "relay_release",
            "--repository",
            "org/relay",
            "--unlocked",
            "--offline",
            "dispatch",
        ]);
        let options = args.pipeline_options();
        assert!(!options.build.locked);
        assert!(options.build.offline);
    }

    #[test]
    fn staging_dir_defaults_under_the_workspace_target() {
        let args = parse(&[
            "relay_release",
            "--repository",
            "org/relay",
            "--workspace",
            "/work/relay",
            "dispatch",
        ]);
        assert_eq!(
            args.pipeline_options().staging_dir,
            PathBuf::from("/work/relay/target/release-staging")
        );
    }
}
