//! Depth-first traversals over the recorded tape.
//!
//! Both traversals start at a root and follow edges to children. Each call
//! owns its visited set, so a node shared by several parents is visited once
//! and repeated calls never see state from earlier ones. The walk uses an
//! explicit stack, so deep expression chains do not grow the call stack.

use super::tape::{NodeId, TapeNode};
use std::collections::HashSet;

/// Nodes reachable from `root` in depth-first post-order.
///
/// Children are visited in edge order; a node is emitted after all of its
/// children.
fn post_order(nodes: &[TapeNode], root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root, 0usize)];
    visited.insert(root);

    while let Some(top) = stack.last_mut() {
        let (id, next) = *top;
        let edges = nodes[id.index()].edges();
        if next < edges.len() {
            top.1 += 1;
            let child = edges[next].child();
            if visited.insert(child) {
                stack.push((child, 0));
            }
        } else {
            stack.pop();
            order.push(id);
        }
    }

    order
}

/// Topological order of the nodes reachable from `root`.
///
/// Reversed post-order: the root comes first and every node comes before
/// all of its descendants, so by the time a node is processed in a backward
/// pass every parent has already pushed its contribution into it.
///
/// # Panics
///
/// Panics if `root` or an edge target is not an index into `nodes`.
pub fn topological_order(nodes: &[TapeNode], root: NodeId) -> Vec<NodeId> {
    let mut order = post_order(nodes, root);
    order.reverse();
    order
}

/// Set the accumulator of every node reachable from `root` to zero.
pub fn reset_accumulators(nodes: &mut [TapeNode], root: NodeId) {
    for id in post_order(nodes, root) {
        nodes[id.index()].accumulator_mut().fill(0.0);
    }
}
