//! Implementation of the phases of a `stratum` build.
//!
//! ## Overview
//!
//! A build follows 5 phases:
//! 1. Discovery - Load every layer reachable from the root into an arena
//! 2. Ordering - Reject reference cycles and compute a children-first order
//! 3. Processing - Resolve each layer: collect its references, run its
//!    generators, apply its transformer stack
//! 4. Composite - Reconcile resources that converged on the same identity
//! 5. Writing - Serialize the result as one multi-document stream
//!
//! Each phase depends only on the previous phases and the foundation modules
//! (`config`, `resource`, `transform`, `generator`).

use std::path::PathBuf;

use crate::config::LayerDecl;
use crate::generator::GeneratorConfig;

pub mod composite;
pub mod discovery;
pub mod orchestrator;
pub mod ordering;
pub mod processing;
pub mod write;

/// Index of a layer in a [`LayerGraph`].
pub type LayerId = usize;

/// One entry of a layer's reference list.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRef {
    /// A resource file.
    File(PathBuf),
    /// A sub-layer.
    Layer(LayerId),
    /// Index into the layer's generator declarations.
    Generator(usize),
}

/// A loaded layer.
#[derive(Debug, Clone)]
pub struct LayerNode {
    /// The layer directory, normalized.
    pub dir: PathBuf,
    /// The declaration file the layer was parsed from.
    pub declaration: PathBuf,
    pub decl: LayerDecl,
    /// Everything the layer pulls in, in output order.
    pub references: Vec<ResourceRef>,
    pub generators: Vec<GeneratorConfig>,
}

impl LayerNode {
    /// Sub-layers referenced by this layer, in reference order.
    pub fn children(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.references.iter().filter_map(|reference| match reference {
            ResourceRef::Layer(id) => Some(*id),
            _ => None,
        })
    }
}

/// Arena of every layer reachable from the root.
///
/// Each layer directory appears once, however many parents reference it.
#[derive(Debug, Clone)]
pub struct LayerGraph {
    nodes: Vec<LayerNode>,
}

impl LayerGraph {
    /// The root layer is always the first node.
    pub const ROOT: LayerId = 0;

    pub(crate) fn new(nodes: Vec<LayerNode>) -> Self {
        Self { nodes }
    }

    pub fn root(&self) -> &LayerNode {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, id: LayerId) -> &LayerNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod phase_tests {
    use super::*;

    fn node(dir: &str, references: Vec<ResourceRef>) -> LayerNode {
        LayerNode {
            dir: PathBuf::from(dir),
            declaration: PathBuf::from(dir).join("kustomization.yaml"),
            decl: LayerDecl::default(),
            references,
            generators: Vec::new(),
        }
    }

    #[test]
    fn test_children_skip_files_and_generators() {
        let layer = node(
            "overlay",
            vec![
                ResourceRef::File(PathBuf::from("overlay/svc.yaml")),
                ResourceRef::Layer(2),
                ResourceRef::Generator(0),
                ResourceRef::Layer(1),
            ],
        );
        assert_eq!(layer.children().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_graph_accessors() {
        let graph = LayerGraph::new(vec![node("root", vec![ResourceRef::Layer(1)]), node("base", vec![])]);
        assert_eq!(graph.len(), 2);
        assert!(!graph.is_empty());
        assert_eq!(graph.root().dir, PathBuf::from("root"));
        assert_eq!(graph.node(1).dir, PathBuf::from("base"));
    }
}
