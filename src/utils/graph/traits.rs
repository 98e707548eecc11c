//! Trait definitions for graph abstractions.
//!
//! Algorithms in [`crate::utils::graph::algorithms`] are written against these traits
//! rather than a concrete graph type, so they work for the raw
//! [`DirectedGraph`](crate::utils::graph::DirectedGraph) as well as for the control flow
//! graph wrapper.
//!
//! Graphs in this crate support vertex removal, so the number of live vertices and the
//! size of the id space differ. Per-node tables must be sized with
//! [`GraphBase::node_bound`], not [`GraphBase::node_count`].

use crate::utils::graph::NodeId;

/// Core graph properties.
pub trait GraphBase {
    /// Returns the number of live nodes.
    fn node_count(&self) -> usize;

    /// Returns one past the largest node index ever issued.
    ///
    /// Every valid `NodeId` satisfies `id.index() < node_bound()`.
    fn node_bound(&self) -> usize;

    /// Returns an iterator over all live node ids in ascending order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward adjacency.
pub trait Successors: GraphBase {
    /// Returns the targets of all outgoing edges of `node`, in insertion order.
    ///
    /// A target appears once per edge, so parallel edges yield duplicates.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward adjacency.
pub trait Predecessors: GraphBase {
    /// Returns the sources of all incoming edges of `node`, in insertion order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
