//! # Build Command Implementation
//!
//! This module implements the `build` subcommand, which resolves a layer tree
//! and emits the composed resources as one multi-document YAML stream.
//!
//! ## Functionality
//!
//! - **Layer Resolution**: Discovers every layer reachable from `DIR`, applies
//!   each layer's transformer stack and reconciles identity collisions.
//! - **Chart Inflation**: Runs `helmCharts` generators when `--enable-helm` is
//!   given. Without it, a layer declaring a chart fails the build.
//! - **Output**: Writes the stream to stdout, or to `--output FILE`.
//!
//! Nothing is written when any phase fails.

use anyhow::Result;
use clap::Args;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use stratum::defaults::{DEFAULT_GENERATOR_TIMEOUT_SECS, DEFAULT_HELM_COMMAND};
use stratum::phases::orchestrator::{self, BuildOptions};
use stratum::suggestions;

/// Build a layer and print the composed resource stream
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// The layer directory to build.
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Allow chart inflation through the external renderer.
    ///
    /// Can also be set with the `STRATUM_ENABLE_HELM` environment variable.
    #[arg(long, env = "STRATUM_ENABLE_HELM")]
    pub enable_helm: bool,

    /// The renderer executable used for chart inflation.
    #[arg(
        long,
        value_name = "COMMAND",
        env = "STRATUM_HELM_COMMAND",
        default_value = DEFAULT_HELM_COMMAND
    )]
    pub helm_command: String,

    /// Seconds each generator's external process may run. 0 disables the bound.
    #[arg(
        long,
        value_name = "SECS",
        env = "STRATUM_GENERATOR_TIMEOUT",
        default_value_t = DEFAULT_GENERATOR_TIMEOUT_SECS
    )]
    pub timeout: u64,

    /// Write the stream to FILE instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Run the generators of one layer one after another.
    #[arg(long)]
    pub no_parallel: bool,
}

impl BuildArgs {
    fn options(&self) -> BuildOptions {
        BuildOptions {
            enable_helm: self.enable_helm,
            helm_command: self.helm_command.clone(),
            generator_timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            parallel_generators: !self.no_parallel,
        }
    }
}

/// Execute the `build` command.
pub fn execute(args: BuildArgs) -> Result<()> {
    let options = args.options();
    debug!("Building {} with {:?}", args.dir.display(), options);

    let output = orchestrator::build_dir(&args.dir, &options).map_err(suggestions::explain)?;
    output
        .write(args.output.as_deref())
        .map_err(suggestions::explain)?;

    if let Some(path) = &args.output {
        eprintln!(
            "Wrote {} resource(s) to {}",
            output.len(),
            path.display()
        );
    }
    Ok(())
}
