//! Graph traversal algorithms.
//!
//! - [`dfs`] - lazy, iterative depth-first search in pre-order
//! - [`reachable`] - the set of nodes reachable from a start node
//! - [`postorder`] / [`reverse_postorder`] - depth-first finishing order and its reverse
//!
//! All traversals visit successors in adjacency order and size their visited sets with
//! [`GraphBase::node_bound`](crate::utils::graph::GraphBase::node_bound), so they work on
//! graphs that have had nodes removed.

use crate::utils::{
    graph::{NodeId, Successors},
    BitSet,
};

/// Depth-first search iterator over graph nodes.
///
/// Each reachable node is yielded exactly once, before its descendants. A start node
/// that is outside the graph's id space yields nothing.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: BitSet,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let bound = graph.node_bound();
        let mut visited = BitSet::new(bound);
        let stack = if start.index() < bound {
            visited.insert(start.index());
            vec![start]
        } else {
            Vec::new()
        };

        DfsIterator {
            graph,
            stack,
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Reverse so the first successor is popped first.
        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if self.visited.insert(succ.index()) {
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Returns a depth-first pre-order iterator starting at `start`.
///
/// # Examples
///
/// ```rust
/// use irflow::utils::graph::{algorithms::dfs, DirectedGraph};
///
/// let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
/// let a = graph.add_node(());
/// let b = graph.add_node(());
/// let c = graph.add_node(());
/// graph.add_edge(a, b, ())?;
/// graph.add_edge(b, c, ())?;
///
/// assert_eq!(dfs(&graph, a).collect::<Vec<_>>(), vec![a, b, c]);
/// # Ok::<(), irflow::Error>(())
/// ```
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Returns the set of node indices reachable from `start`, `start` included.
pub fn reachable<G: Successors>(graph: &G, start: NodeId) -> BitSet {
    let mut iter = dfs(graph, start);
    for _ in iter.by_ref() {}
    iter.visited
}

/// Returns the nodes reachable from `start` in depth-first post-order.
///
/// A node is emitted once every successor explored from it has been emitted. Successors
/// are explored in adjacency order, matching [`dfs`].
///
/// # Examples
///
/// ```rust
/// use irflow::utils::graph::{algorithms::postorder, DirectedGraph};
///
/// let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
/// let a = graph.add_node(());
/// let b = graph.add_node(());
/// let c = graph.add_node(());
/// graph.add_edge(a, b, ())?;
/// graph.add_edge(b, c, ())?;
///
/// assert_eq!(postorder(&graph, a), vec![c, b, a]);
/// # Ok::<(), irflow::Error>(())
/// ```
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let bound = graph.node_bound();
    if start.index() >= bound {
        return Vec::new();
    }

    let mut visited = BitSet::new(bound);
    let mut order = Vec::new();
    // (node, finished): a node is pushed again as finished before its successors.
    let mut stack = vec![(start, false)];

    while let Some((node, finished)) = stack.pop() {
        if finished {
            order.push(node);
            continue;
        }
        if !visited.insert(node.index()) {
            continue;
        }
        stack.push((node, true));

        let successors: Vec<NodeId> = graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !visited.contains(succ.index()) {
                stack.push((succ, false));
            }
        }
    }
    order
}

/// Returns the nodes reachable from `start` in reverse post-order.
///
/// Every node comes before its successors, back edges aside.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;

    /// a -> b, a -> c, b -> d, c -> d
    fn diamond() -> (DirectedGraph<(), ()>, [NodeId; 4]) {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let c = graph.add_node(());
        let d = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(a, c, ()).unwrap();
        graph.add_edge(b, d, ()).unwrap();
        graph.add_edge(c, d, ()).unwrap();
        (graph, [a, b, c, d])
    }

    #[test]
    fn test_dfs_preorder_follows_adjacency_order() {
        let (graph, [a, b, c, d]) = diamond();
        assert_eq!(dfs(&graph, a).collect::<Vec<_>>(), vec![a, b, d, c]);
    }

    #[test]
    fn test_postorder_finishes_children_first() {
        let (graph, [a, b, c, d]) = diamond();
        assert_eq!(postorder(&graph, a), vec![d, b, c, a]);
        assert_eq!(reverse_postorder(&graph, a), vec![a, c, b, d]);
    }

    #[test]
    fn test_postorder_cycles_and_bad_start() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let c = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, a, ()).unwrap();
        graph.add_edge(b, c, ()).unwrap();

        assert_eq!(postorder(&graph, a), vec![c, b, a]);
        assert_eq!(reverse_postorder(&graph, b), vec![b, c, a]);
        assert!(postorder(&graph, NodeId::new(42)).is_empty());
    }

    #[test]
    fn test_dfs_handles_cycles() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, a, ()).unwrap();
        assert_eq!(dfs(&graph, a).count(), 2);
    }

    #[test]
    fn test_dfs_out_of_range_start() {
        let (graph, _) = diamond();
        assert_eq!(dfs(&graph, NodeId::new(99)).count(), 0);
        assert!(!reachable(&graph, NodeId::new(99)).contains(0));
    }

    #[test]
    fn test_reachable_skips_removed_and_disconnected() {
        let (mut graph, [a, b, c, d]) = diamond();
        let island = graph.add_node(());
        graph.remove_node(c);

        let seen = reachable(&graph, a);
        assert!(seen.contains(a.index()));
        assert!(seen.contains(b.index()));
        assert!(seen.contains(d.index()));
        assert!(!seen.contains(c.index()));
        assert!(!seen.contains(island.index()));
    }
}
