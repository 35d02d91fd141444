//! Release trigger modeling and version resolution.
//!
//! The published image tag is derived verbatim from the resolved version, so
//! resolution must either produce a non-empty string or refuse to let the
//! pipeline proceed. The version is computed exactly once per invocation and
//! passed explicitly into every downstream phase.

use crate::error::{PipelineError, Result};

/// What caused this pipeline invocation.
///
/// Exactly one of the two payload fields is meaningful per kind; both are
/// optional so resolution, not construction, decides whether the run can
/// proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseTrigger {
    /// Operator-initiated run, optionally carrying an explicit version.
    ManualDispatch {
        /// Version supplied by the operator, if any
        supplied_version: Option<String>,
    },
    /// Run started by the publication of a release, carrying its tag.
    ReleasePublished {
        /// Tag attached to the published release, if any
        release_tag: Option<String>,
    },
}

/// Resolves the version string a pipeline invocation publishes under.
pub struct VersionResolver;

impl VersionResolver {
    /// Resolve the image version from the trigger.
    ///
    /// An explicit operator-supplied version takes precedence; otherwise the
    /// published release's tag is used. If neither is present this fails with
    /// [`PipelineError::MissingVersion`] rather than inferring a value.
    ///
    /// No normalization is applied: a tag of "v9.9.9" publishes as "v9.9.9".
    /// Non-semver versions are allowed but logged, since downstream tooling
    /// often expects semver-shaped tags.
    pub fn resolve(trigger: &ReleaseTrigger) -> Result<String> {
        let candidate = match trigger {
            ReleaseTrigger::ManualDispatch { supplied_version } => supplied_version.as_deref(),
            ReleaseTrigger::ReleasePublished { release_tag } => release_tag.as_deref(),
        };

        match candidate {
            Some(version) if !version.trim().is_empty() => {
                if semver::Version::parse(version.trim_start_matches('v')).is_err() {
                    log::warn!(
                        "resolved version '{}' is not semver; publishing under it verbatim",
                        version
                    );
                }
                Ok(version.to_string())
            }
            _ => Err(PipelineError::MissingVersion),
        }
    }
}
