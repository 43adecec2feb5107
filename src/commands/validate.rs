//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a layer tree
//! without building it.
//!
//! ## Functionality
//!
//! - **Declaration Validation**: Parses every reachable layer declaration and
//!   checks field names and values.
//! - **Reference Validation**: Checks that every resource reference exists and
//!   that every referenced directory is a layer.
//! - **Cycle Detection**: Rejects circular layer references.
//! - **Patch Validation**: Loads every patch and compiles its target selector.
//!
//! Generators are listed but never run, so no renderer is needed.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use stratum::filesystem::{DiskFS, FileSystem};
use stratum::phases::orchestrator::load_graph;
use stratum::phases::ResourceRef;
use stratum::suggestions;
use stratum::transform::TransformerStack;

/// Validate a layer tree without running generators
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// The root layer directory.
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}

/// Counts reported after a successful validation.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    layers: usize,
    files: usize,
    generators: usize,
    patches: usize,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs) -> Result<()> {
    println!("Validating layer tree: {}", args.dir.display());
    let summary = validate(&DiskFS, &args.dir)?;

    println!("Layer tree is valid");
    println!("  Layers: {}", summary.layers);
    println!("  Resource files: {}", summary.files);
    println!("  Generators: {}", summary.generators);
    println!("  Patches: {}", summary.patches);
    Ok(())
}

fn validate(fs: &dyn FileSystem, dir: &Path) -> Result<Summary> {
    let (graph, order) = load_graph(fs, dir).map_err(suggestions::explain)?;

    let mut summary = Summary {
        layers: graph.len(),
        ..Summary::default()
    };
    for id in order {
        let layer = graph.node(id);
        TransformerStack::from_layer(&layer.decl, &layer.dir, fs).map_err(suggestions::explain)?;
        summary.patches += layer.decl.patches.len();
        summary.generators += layer.generators.len();
        summary.files += layer
            .references
            .iter()
            .filter(|r| matches!(r, ResourceRef::File(_)))
            .count();
    }
    Ok(summary)
}
