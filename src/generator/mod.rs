//! # Generator Plugins
//!
//! A generator produces resources programmatically instead of reading them
//! from static files. Every generator kind implements [`Generator`]: given its
//! configuration record and a [`GeneratorContext`], it returns an ordered
//! resource list or fails with [`Error::Generator`].
//!
//! Declarations are dispatched through the closed [`GeneratorConfig`] enum,
//! one variant per supported kind. [`GeneratorRegistry`] holds the configured
//! generator instances for one build and refuses kinds that were not enabled.
//!
//! ## Contract
//!
//! - Output order is the order in which the generator emitted documents.
//! - An invocation never shares a working directory with another one; each
//!   creates its own scratch workspace and removes it when done.
//! - Identical configuration and identical bundle content give identical
//!   output.

pub mod helm;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ChartArgs, HelmGlobals, LayerDecl};
use crate::error::{Error, GeneratorFailure, Result};
use crate::filesystem::FileSystem;
use crate::process::CommandRunner;
use crate::resource::Resource;

pub use helm::HelmChartInflationGenerator;

/// One generator declaration found in a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorConfig {
    /// A `helmCharts` (or legacy `helmChartInflationGenerator`) entry.
    HelmChart(ChartArgs),
}

impl GeneratorConfig {
    /// Kind name used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GeneratorConfig::HelmChart(_) => HelmChartInflationGenerator::KIND,
        }
    }

    /// The instance name, usually the bundle name.
    pub fn name(&self) -> &str {
        match self {
            GeneratorConfig::HelmChart(chart) => &chart.name,
        }
    }

    /// All generator declarations of a layer, in declaration order.
    pub fn from_layer(decl: &LayerDecl) -> Vec<GeneratorConfig> {
        decl.helm_charts
            .iter()
            .cloned()
            .map(GeneratorConfig::HelmChart)
            .collect()
    }
}

/// What a generator may read while running.
#[derive(Clone, Copy)]
pub struct GeneratorContext<'a> {
    /// Directory of the declaring layer; relative paths resolve against it.
    pub layer_dir: &'a Path,
    /// Position of the declaration among the layer's generators.
    pub index: usize,
    pub fs: &'a dyn FileSystem,
    pub helm_globals: &'a HelmGlobals,
}

/// A generator kind.
pub trait Generator: Send + Sync {
    /// The configuration record of one invocation.
    type Config;

    /// Kind name, as reported in [`Error::Generator`].
    const KIND: &'static str;

    /// Produce the resources for one declaration.
    fn generate(&self, config: &Self::Config, ctx: &GeneratorContext<'_>) -> Result<Vec<Resource>>;
}

/// Options shared by every generator of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub enable_helm: bool,
    pub helm_command: String,
    /// Bound on each external process; `None` disables the bound.
    pub timeout: Option<Duration>,
}

/// The generators available to one build.
pub struct GeneratorRegistry {
    helm: Option<HelmChartInflationGenerator>,
}

impl GeneratorRegistry {
    pub fn new(options: &GeneratorOptions, runner: Arc<dyn CommandRunner>) -> Self {
        let helm = options.enable_helm.then(|| {
            HelmChartInflationGenerator::new(runner, options.helm_command.clone(), options.timeout)
        });
        Self { helm }
    }

    /// Dispatch one declaration to its generator.
    pub fn generate(&self, config: &GeneratorConfig, ctx: &GeneratorContext<'_>) -> Result<Vec<Resource>> {
        match config {
            GeneratorConfig::HelmChart(chart) => match &self.helm {
                Some(generator) => generator.generate(chart, ctx),
                None => Err(Error::Generator {
                    kind: config.kind().to_string(),
                    name: config.name().to_string(),
                    cause: GeneratorFailure::Disabled,
                }),
            },
        }
    }
}
