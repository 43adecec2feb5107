//! # Tree Command Implementation
//!
//! This module implements the `tree` subcommand, which displays the layer
//! reference tree in a hierarchical format.
//!
//! ## Functionality
//!
//! - **Layer Tree Visualization**: Shows every sub-layer under the layer that
//!   references it, in reference order.
//! - **Generators**: Lists each layer's generators as leaves.
//! - **Depth Control**: Supports `--depth` to limit how many levels are shown.
//!
//! This command is a safe, read-only operation. It never runs a generator.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};
use std::path::PathBuf;

use stratum::filesystem::DiskFS;
use stratum::phases::orchestrator::load_graph;
use stratum::phases::{LayerGraph, LayerId, ResourceRef};
use stratum::suggestions;

/// Display the layer reference tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// The root layer directory.
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Maximum depth to display in the tree.
    ///
    /// If not specified, displays the full tree.
    /// Use 0 to show only the root layer, 1 to show its direct sub-layers, etc.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs) -> Result<()> {
    let (graph, _) = load_graph(&DiskFS, &args.dir).map_err(suggestions::explain)?;

    let tree_root = build_tree_node(
        &graph,
        LayerGraph::ROOT,
        args.depth.unwrap_or(usize::MAX),
        0,
    );
    print_tree(&tree_root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;

    Ok(())
}

/// Build a tree node from a layer and, depth permitting, its references
fn build_tree_node(
    graph: &LayerGraph,
    id: LayerId,
    max_depth: usize,
    current_depth: usize,
) -> TreeNode {
    let layer = graph.node(id);
    let files = layer
        .references
        .iter()
        .filter(|r| matches!(r, ResourceRef::File(_)))
        .count();
    let label = format!("{} ({} file(s))", layer.dir.display(), files);

    if current_depth >= max_depth {
        return TreeNode {
            label,
            children: vec![],
        };
    }

    let children = layer
        .references
        .iter()
        .filter_map(|reference| match reference {
            ResourceRef::Layer(child) => Some(build_tree_node(
                graph,
                *child,
                max_depth,
                current_depth + 1,
            )),
            ResourceRef::Generator(index) => {
                let generator = &layer.generators[*index];
                Some(TreeNode {
                    label: format!("{}: {}", generator.kind(), generator.name()),
                    children: vec![],
                })
            }
            ResourceRef::File(_) => None,
        })
        .collect();
    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use stratum::filesystem::MemoryFS;

    fn graph() -> LayerGraph {
        let fs = MemoryFS::new()
            .with_file("base/kustomization.yaml", "resources:\n- a.yaml\n- b.yaml\n")
            .unwrap()
            .with_file("base/a.yaml", "kind: ConfigMap\nmetadata:\n  name: a\n")
            .unwrap()
            .with_file("base/b.yaml", "kind: ConfigMap\nmetadata:\n  name: b\n")
            .unwrap()
            .with_file(
                "prod/kustomization.yaml",
                "resources:\n- ../base\nhelmCharts:\n- name: minecraft\n",
            )
            .unwrap();
        load_graph(&fs, Path::new("prod")).unwrap().0
    }

    #[test]
    fn test_tree_lists_layers_and_generators() {
        let root = build_tree_node(&graph(), LayerGraph::ROOT, usize::MAX, 0);
        assert_eq!(root.label, "prod (0 file(s))");
        let labels: Vec<&str> = root.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["base (2 file(s))", "helmChart: minecraft"]);
    }

    #[test]
    fn test_tree_depth_zero_shows_root_only() {
        let root = build_tree_node(&graph(), LayerGraph::ROOT, 0, 0);
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_execute_missing_layer() {
        let result = execute(TreeArgs {
            dir: PathBuf::from("/nonexistent/layer"),
            depth: None,
        });
        assert!(result.is_err());
    }
}
