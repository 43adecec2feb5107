//! Phase 3: Processing
//!
//! This phase is the layer resolver. It walks the layers in the order
//! computed by Phase 2 and turns each one into its fully transformed
//! resource list.
//!
//! ## Process
//!
//! For one layer:
//!
//! 1.  **Generators**: every generator declaration is invoked. When parallel
//!     generation is enabled they run concurrently on the rayon pool; the
//!     results are still consumed in declaration order.
//!
//! 2.  **Collection**: the layer's references are concatenated in order:
//!     resource files are parsed, sub-layers contribute their already
//!     resolved output, generators contribute what they produced.
//!
//! 3.  **Transformation**: the layer's own transformer stack is applied once
//!     over the whole concatenation, on top of whatever the sub-layers already
//!     applied. This is how prefixes and namespaces accumulate across nesting.
//!
//! Every layer is resolved exactly once; a layer shared by several parents
//! hands each of them a copy of its output.

use std::path::Path;

use log::{debug, info};
use rayon::prelude::*;

use super::{LayerGraph, LayerId, LayerNode, ResourceRef};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::generator::{GeneratorContext, GeneratorRegistry};
use crate::resource::{parse_resources, Resource};
use crate::transform::TransformerStack;

/// What the resolver needs besides the graph.
pub struct Resolver<'a> {
    pub fs: &'a dyn FileSystem,
    pub registry: &'a GeneratorRegistry,
    /// Run a layer's generators concurrently.
    pub parallel_generators: bool,
}

/// Executes Phase 3: resolve every layer in `order` and return the root's output.
pub fn execute(graph: &LayerGraph, order: &[LayerId], resolver: &Resolver<'_>) -> Result<Vec<Resource>> {
    let mut resolved: Vec<Option<Vec<Resource>>> = vec![None; graph.len()];

    for &id in order {
        let node = graph.node(id);
        let output = resolver.resolve_layer(node, &resolved)?;
        info!(
            "Resolved layer {} ({} resource(s))",
            node.dir.display(),
            output.len()
        );
        resolved[id] = Some(output);
    }

    resolved[LayerGraph::ROOT].take().ok_or_else(|| Error::Filesystem {
        message: format!("Root layer {} was never resolved", graph.root().dir.display()),
    })
}

impl Resolver<'_> {
    /// Resolve one layer whose sub-layers are already in `resolved`.
    pub fn resolve_layer(
        &self,
        node: &LayerNode,
        resolved: &[Option<Vec<Resource>>],
    ) -> Result<Vec<Resource>> {
        let mut generated = self.run_generators(node)?;

        let mut collected = Vec::new();
        for reference in &node.references {
            match reference {
                ResourceRef::File(path) => collected.extend(load_resource_file(self.fs, path)?),
                ResourceRef::Layer(child) => {
                    let output = resolved
                        .get(*child)
                        .and_then(Option::as_ref)
                        .ok_or_else(|| Error::Filesystem {
                            message: format!(
                                "Layer {} referenced before it was resolved",
                                node.dir.display()
                            ),
                        })?;
                    collected.extend(output.iter().cloned());
                }
                ResourceRef::Generator(index) => {
                    if let Some(output) = generated.get_mut(*index) {
                        collected.append(output);
                    }
                }
            }
        }

        let stack = TransformerStack::from_layer(&node.decl, &node.dir, self.fs)?;
        stack.apply(collected)
    }

    fn run_generators(&self, node: &LayerNode) -> Result<Vec<Vec<Resource>>> {
        let context = |index| GeneratorContext {
            layer_dir: &node.dir,
            index,
            fs: self.fs,
            helm_globals: &node.decl.helm_globals,
        };

        if self.parallel_generators && node.generators.len() > 1 {
            debug!(
                "Running {} generators of {} in parallel",
                node.generators.len(),
                node.dir.display()
            );
            node.generators
                .par_iter()
                .enumerate()
                .map(|(index, config)| self.registry.generate(config, &context(index)))
                .collect()
        } else {
            node.generators
                .iter()
                .enumerate()
                .map(|(index, config)| self.registry.generate(config, &context(index)))
                .collect()
        }
    }
}

fn load_resource_file(fs: &dyn FileSystem, path: &Path) -> Result<Vec<Resource>> {
    let text = fs.read_to_string(path)?;
    parse_resources(&text, path).map_err(|e| {
        Error::config_with_hint(
            format!("{}: {}", path.display(), e),
            "Every document in a resource file needs a kind and metadata.name",
        )
    })
}
