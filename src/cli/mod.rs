//! Command line interface for relay_release.

mod args;
mod output;

pub use args::{Args, TriggerCommand};
pub use output::OutputManager;

use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::secrets::Secrets;

/// Main CLI entry point; returns the process exit code.
///
/// Exit status is success only if every declared platform both built and
/// published; any failure surfaces as an error with platform and phase
/// context.
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    let output = OutputManager::new(args.quiet);
    let trigger = args.trigger();
    let options = args.pipeline_options();

    let pipeline = Pipeline::new(options, output);
    pipeline.run(&trigger, Secrets::from_env()).await?;
    Ok(0)
}
