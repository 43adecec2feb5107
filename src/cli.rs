//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};

use crate::commands;

/// Stratum - Compose orchestration manifests from layered overlays
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    ///
    /// `RUST_LOG` takes precedence when set.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a layer and print the composed resource stream
    Build(commands::build::BuildArgs),

    /// Display the layer reference tree
    Tree(commands::tree::TreeArgs),

    /// Validate a layer tree without running generators
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        match self.command {
            Commands::Build(args) => commands::build::execute(args),
            Commands::Tree(args) => commands::tree::execute(args),
            Commands::Validate(args) => commands::validate::execute(args),
        }
    }
}

/// Send log records to stderr so they never mix with the resource stream.
fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .target(Target::Stderr)
        .format_timestamp(None)
        .try_init();
}
