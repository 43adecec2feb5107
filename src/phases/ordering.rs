//! Phase 2: Ordering
//!
//! This phase checks the layer graph for reference cycles and computes the
//! order in which layers are resolved.
//!
//! ## Process
//!
//! 1.  **Depth-First Traversal**: starting at the root, sub-layers are visited
//!     before the layers that reference them (post-order), so every layer's
//!     inputs are resolved before the layer itself.
//!
//! 2.  **Cycle Detection**: the traversal keeps an explicit stack of layers
//!     currently being visited. Reaching a layer that is still on the stack
//!     means a cycle; the error names every layer on it.
//!
//! The traversal is iterative, so arbitrarily deep nesting cannot exhaust the
//! call stack.

use super::{LayerGraph, LayerId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Executes Phase 2: return the children-first resolution order.
///
/// The root layer is always last. Layers shared by several parents appear
/// once, at their first completion.
pub fn execute(graph: &LayerGraph) -> Result<Vec<LayerId>> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut order = Vec::with_capacity(graph.len());
    // (layer, index of the next child to visit)
    let mut stack: Vec<(LayerId, usize)> = vec![(LayerGraph::ROOT, 0)];
    marks[LayerGraph::ROOT] = Mark::InProgress;

    while let Some(&(id, cursor)) = stack.last() {
        match graph.node(id).children().nth(cursor) {
            Some(child) => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::InProgress => return Err(cycle_error(graph, &stack, child)),
                    Mark::Done => {}
                }
            }
            None => {
                marks[id] = Mark::Done;
                order.push(id);
                stack.pop();
            }
        }
    }

    Ok(order)
}

fn cycle_error(graph: &LayerGraph, stack: &[(LayerId, usize)], repeated: LayerId) -> Error {
    let start = stack
        .iter()
        .position(|(id, _)| *id == repeated)
        .unwrap_or_default();
    let cycle = stack[start..]
        .iter()
        .map(|(id, _)| *id)
        .chain(std::iter::once(repeated))
        .map(|id| graph.node(id).dir.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
    Error::CycleDetected { cycle }
}
