//! Orchestrator for a complete build
//!
//! This module coordinates all phases to provide a clean API for the
//! composition engine: give it a root layer, get back the resolved output or
//! exactly one error.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use super::processing::Resolver;
use super::{composite, discovery, ordering, processing, write, LayerGraph, LayerId};
use crate::defaults::{default_generator_timeout, DEFAULT_HELM_COMMAND};
use crate::error::Result;
use crate::filesystem::{DiskFS, FileSystem};
use crate::generator::{GeneratorOptions, GeneratorRegistry};
use crate::process::{CommandRunner, SystemCommandRunner};
use crate::resource::Resource;

/// Options of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Allow the chart inflation generator to run.
    pub enable_helm: bool,
    /// Renderer executable.
    pub helm_command: String,
    /// Bound on each generator's external processes; `None` waits forever.
    pub generator_timeout: Option<Duration>,
    /// Run the generators of one layer concurrently.
    pub parallel_generators: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            enable_helm: false,
            helm_command: DEFAULT_HELM_COMMAND.to_string(),
            generator_timeout: Some(default_generator_timeout()),
            parallel_generators: true,
        }
    }
}

impl BuildOptions {
    fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            enable_helm: self.enable_helm,
            helm_command: self.helm_command.clone(),
            timeout: self.generator_timeout,
        }
    }
}

/// The final ordered, deduplicated resources of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOutput {
    resources: Vec<Resource>,
}

impl ResolvedOutput {
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The output as a multi-document YAML stream.
    pub fn to_yaml(&self) -> Result<String> {
        write::to_yaml_stream(&self.resources)
    }

    /// Write the stream to `output`, or to stdout when `None`.
    pub fn write(&self, output: Option<&Path>) -> Result<()> {
        write::execute(&self.resources, output)
    }
}

/// Load the layer graph and check it for cycles without running anything.
pub fn load_graph(fs: &dyn FileSystem, root: &Path) -> Result<(LayerGraph, Vec<LayerId>)> {
    let graph = discovery::execute(fs, root)?;
    let order = ordering::execute(&graph)?;
    Ok((graph, order))
}

/// Execute a complete build of the layer at `root`.
///
/// 1. Discover every layer
/// 2. Reject cycles and order layers children-first
/// 3. Resolve each layer (generators, references, transformer stack)
/// 4. Reconcile identity collisions
///
/// Serialization (phase 5) is left to the caller through [`ResolvedOutput`].
pub fn build(
    root: &Path,
    fs: &dyn FileSystem,
    options: &BuildOptions,
    runner: Arc<dyn CommandRunner>,
) -> Result<ResolvedOutput> {
    // Phases 1 and 2: Discovery and Ordering
    let (graph, order) = load_graph(fs, root)?;

    // Phase 3: Processing
    let registry = GeneratorRegistry::new(&options.generator_options(), runner);
    let resolver = Resolver {
        fs,
        registry: &registry,
        parallel_generators: options.parallel_generators,
    };
    let resolved = processing::execute(&graph, &order, &resolver)?;

    // Phase 4: Composite
    let resources = composite::execute(resolved)?;
    info!(
        "Built {} resource(s) from {}",
        resources.len(),
        graph.root().dir.display()
    );

    Ok(ResolvedOutput { resources })
}

/// Build a layer on the host filesystem with the system renderer.
pub fn build_dir(root: &Path, options: &BuildOptions) -> Result<ResolvedOutput> {
    build(root, &DiskFS, options, Arc::new(SystemCommandRunner))
}
