//! Vertex identifiers for the graph arena.
//!
//! [`NodeId`] is the integer handle used for every vertex of a
//! [`DirectedGraph`](crate::utils::graph::DirectedGraph). Control flow graphs use it
//! directly as the basic block id, so the formatting follows the `B<n>` convention used
//! by the diagnostic dumps.

use std::fmt;

/// A strongly-typed identifier for a vertex in a directed graph.
///
/// Ids are handed out sequentially by
/// [`DirectedGraph::add_node`](crate::utils::graph::DirectedGraph::add_node) and are
/// never reused inside one graph, even after the vertex has been removed. This makes
/// them safe to keep in side tables (rescuer maps, rename maps) across rewrites: a
/// stale id simply stops resolving instead of aliasing a newer block.
///
/// # Examples
///
/// ```rust
/// use irflow::utils::graph::NodeId;
///
/// let block = NodeId::new(3);
/// assert_eq!(block.index(), 3);
/// assert_eq!(block.to_string(), "B3");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a `NodeId` from a raw arena index.
    ///
    /// Normal code obtains ids from the graph; this is mainly for tests and for
    /// rebuilding ids from dense per-node tables.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_node_id_roundtrip() {
        let node: NodeId = 123usize.into();
        assert_eq!(node.index(), 123);
        let raw: usize = node.into();
        assert_eq!(raw, 123);
    }

    #[test]
    fn test_node_id_ordering() {
        let mut nodes = vec![NodeId::new(3), NodeId::new(1), NodeId::new(2)];
        nodes.sort();
        assert_eq!(nodes, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
    }

    #[test]
    fn test_node_id_as_map_key() {
        let mut rescuers: HashMap<NodeId, NodeId> = HashMap::new();
        rescuers.insert(NodeId::new(1), NodeId::new(7));

        assert_eq!(rescuers.get(&NodeId::new(1)), Some(&NodeId::new(7)));
        assert_eq!(rescuers.get(&NodeId::new(2)), None);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node:?}"), "NodeId(42)");
        assert_eq!(format!("{node}"), "B42");
    }
}
