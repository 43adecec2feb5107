//! Phase 1: Discovery
//!
//! This is the first phase of a `stratum` build. Its responsibility is to
//! find and parse every layer reachable from the root layer.
//!
//! ## Process
//!
//! 1.  **Root**: the root path may be a layer directory or a declaration file
//!     inside one.
//!
//! 2.  **Breadth-First Loading**: each layer's declaration is parsed and its
//!     `resources` entries are classified as resource files or sub-layer
//!     directories. Sub-layers are queued for loading.
//!
//! 3.  **Interning**: a layer directory is loaded once and given one
//!     [`LayerId`], however many parents reference it. A reference back to a
//!     layer that is still being loaded simply records the edge; cycles are
//!     rejected by the ordering phase.
//!
//! Generator declarations are appended to each layer's reference list after
//! its `resources` entries, in declaration order.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{LayerGraph, LayerId, LayerNode, ResourceRef};
use crate::config;
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::generator::GeneratorConfig;
use crate::path::{is_remote, normalize, resolve};

/// Executes Phase 1: load the layer graph rooted at `root`.
pub fn execute(fs: &dyn FileSystem, root: &Path) -> Result<LayerGraph> {
    let root_dir = root_layer_dir(fs, root)?;

    let mut ids: HashMap<PathBuf, LayerId> = HashMap::new();
    let mut queue = VecDeque::new();
    let mut nodes = Vec::new();
    ids.insert(root_dir.clone(), LayerGraph::ROOT);
    queue.push_back(root_dir);

    // Ids are handed out in queue order, so each node lands at its own index
    while let Some(dir) = queue.pop_front() {
        let (declaration, decl) = config::from_dir(fs, &dir)?;
        debug!("Loaded layer {}", declaration.display());

        let mut references = Vec::with_capacity(decl.resources.len() + decl.helm_charts.len());
        for reference in &decl.resources {
            match classify(fs, &dir, reference)? {
                Classified::File(path) => references.push(ResourceRef::File(path)),
                Classified::Layer(child) => {
                    let next = ids.len();
                    let id = *ids.entry(child.clone()).or_insert_with(|| {
                        queue.push_back(child);
                        next
                    });
                    references.push(ResourceRef::Layer(id));
                }
            }
        }

        let generators = GeneratorConfig::from_layer(&decl);
        references.extend((0..generators.len()).map(ResourceRef::Generator));

        nodes.push(LayerNode {
            dir,
            declaration,
            decl,
            references,
            generators,
        });
    }

    info!("Discovered {} layer(s)", nodes.len());
    Ok(LayerGraph::new(nodes))
}

enum Classified {
    File(PathBuf),
    Layer(PathBuf),
}

fn classify(fs: &dyn FileSystem, layer_dir: &Path, reference: &str) -> Result<Classified> {
    if is_remote(reference) {
        return Err(Error::config_with_hint(
            format!(
                "Remote reference '{}' in {} is not supported",
                reference,
                layer_dir.display()
            ),
            "Vendor the remote layer into a local directory and reference that instead",
        ));
    }

    let path = resolve(layer_dir, reference);
    if fs.is_file(&path) {
        Ok(Classified::File(path))
    } else if fs.is_dir(&path) {
        if config::find_declaration(fs, &path).is_none() {
            return Err(Error::config_with_hint(
                format!(
                    "Directory '{}' referenced from {} is not a layer",
                    reference,
                    layer_dir.display()
                ),
                "A referenced directory must contain a kustomization.yaml",
            ));
        }
        Ok(Classified::Layer(path))
    } else {
        Err(Error::config(format!(
            "Resource '{}' referenced from {} does not exist",
            reference,
            layer_dir.display()
        )))
    }
}

/// The layer directory for a root path that may name the declaration file.
fn root_layer_dir(fs: &dyn FileSystem, root: &Path) -> Result<PathBuf> {
    let root = normalize(root);
    if fs.is_file(&root) {
        return Ok(root
            .parent()
            .map(normalize)
            .unwrap_or_else(|| PathBuf::from(".")));
    }
    Ok(root)
}
