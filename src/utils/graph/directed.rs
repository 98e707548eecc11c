//! Mutable directed graph arena.
//!
//! [`DirectedGraph`] is the storage behind every control flow graph in the crate. Nodes
//! and edges live in slot vectors indexed by [`NodeId`] and [`EdgeId`]; removing a node or
//! an edge empties its slot instead of compacting, so ids stay stable for the lifetime of
//! the graph. Each node keeps an outgoing and an incoming adjacency list of edge ids,
//! which makes predecessor queries as cheap as successor queries and lets rewrites
//! (block splitting, inlining, merging) move edges around without reference cycles.

use crate::{
    utils::graph::{
        edge::EdgeId,
        node::NodeId,
        traits::{GraphBase, Predecessors, Successors},
    },
    Error, Result,
};

/// Internal storage for edge data and endpoints.
#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed multigraph with typed node and edge payloads.
///
/// Parallel edges between the same pair of nodes are allowed; callers that need set
/// semantics (the CFG stores each `(source, target, kind)` triple once) check with
/// [`find_edge`](Self::find_edge) before inserting.
///
/// Adjacency lists preserve insertion order, and every traversal in
/// [`algorithms`](crate::utils::graph::algorithms) follows that order, so the result of
/// a graph rewrite is deterministic.
///
/// # Examples
///
/// ```rust
/// use irflow::utils::graph::{DirectedGraph, GraphBase, Successors};
///
/// let mut graph: DirectedGraph<&str, u8> = DirectedGraph::new();
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// let c = graph.add_node("c");
/// graph.add_edge(a, b, 0)?;
/// graph.add_edge(a, c, 1)?;
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b, c]);
///
/// graph.remove_node(b);
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![c]);
/// assert_eq!(graph.node_count(), 2);
/// assert_eq!(graph.node_bound(), 3);
/// # Ok::<(), irflow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<Option<N>>,
    edges: Vec<Option<EdgeData<E>>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    live_nodes: usize,
    live_edges: usize,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            live_nodes: 0,
            live_edges: 0,
        }
    }

    /// Creates an empty graph with pre-allocated storage.
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
            live_nodes: 0,
            live_edges: 0,
        }
    }

    /// Adds a node and returns its id. Ids are assigned sequentially from 0 and are
    /// never reused.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(data));
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.live_nodes += 1;
        id
    }

    /// Removes a node together with every edge touching it, returning its payload.
    ///
    /// Returns `None` if the node does not exist or was already removed.
    pub fn remove_node(&mut self, node: NodeId) -> Option<N> {
        let data = self.nodes.get_mut(node.index())?.take()?;
        self.live_nodes -= 1;

        let mut touching = std::mem::take(&mut self.outgoing[node.index()]);
        touching.append(&mut self.incoming[node.index()]);
        for edge in touching {
            self.remove_edge(edge);
        }
        Some(data)
    }

    /// Returns the payload of `node`, or `None` if it does not exist.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index()).and_then(Option::as_ref)
    }

    /// Returns the payload of `node` mutably, or `None` if it does not exist.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(node.index()).and_then(Option::as_mut)
    }

    /// Returns `true` if `node` exists in the graph.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    /// Iterates over live nodes and their payloads in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|data| (NodeId::new(idx), data)))
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        if !self.contains_node(source) {
            return Err(Error::GraphError(format!(
                "source node {source} does not exist in graph with bound {}",
                self.nodes.len()
            )));
        }
        if !self.contains_node(target) {
            return Err(Error::GraphError(format!(
                "target node {target} does not exist in graph with bound {}",
                self.nodes.len()
            )));
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(Some(EdgeData {
            source,
            target,
            data,
        }));
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        self.live_edges += 1;
        Ok(id)
    }

    /// Removes an edge and returns its payload.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Option<E> {
        let removed = self.edges.get_mut(edge.index())?.take()?;
        self.live_edges -= 1;
        if let Some(list) = self.outgoing.get_mut(removed.source.index()) {
            list.retain(|&e| e != edge);
        }
        if let Some(list) = self.incoming.get_mut(removed.target.index()) {
            list.retain(|&e| e != edge);
        }
        Some(removed.data)
    }

    /// Returns the payload of `edge`.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edge_slot(edge).map(|e| &e.data)
    }

    /// Returns the payload of `edge` mutably.
    pub fn edge_mut(&mut self, edge: EdgeId) -> Option<&mut E> {
        self.edges
            .get_mut(edge.index())
            .and_then(Option::as_mut)
            .map(|e| &mut e.data)
    }

    /// Returns `(source, target)` for `edge`.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edge_slot(edge).map(|e| (e.source, e.target))
    }

    /// Returns the number of live edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.live_edges
    }

    /// Iterates over live edges as `(id, source, target, payload)` in id order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, NodeId, NodeId, &E)> + '_ {
        self.edges.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|e| (EdgeId::new(idx), e.source, e.target, &e.data))
        })
    }

    /// Iterates over the outgoing edges of `node` as `(id, target, payload)`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &E)> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .filter_map(|&id| self.edge_slot(id).map(|e| (id, e.target, &e.data)))
    }

    /// Iterates over the incoming edges of `node` as `(id, source, payload)`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &E)> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .filter_map(|&id| self.edge_slot(id).map(|e| (id, e.source, &e.data)))
    }

    /// Returns the number of outgoing edges of `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(node.index()).map_or(0, Vec::len)
    }

    /// Returns the number of incoming edges of `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(node.index()).map_or(0, Vec::len)
    }

    /// Returns `true` if the graph has no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_nodes == 0
    }

    fn edge_slot(&self, edge: EdgeId) -> Option<&EdgeData<E>> {
        self.edges.get(edge.index()).and_then(Option::as_ref)
    }
}

impl<N, E: PartialEq> DirectedGraph<N, E> {
    /// Returns the first edge from `source` to `target` whose payload equals `data`.
    #[must_use]
    pub fn find_edge(&self, source: NodeId, target: NodeId, data: &E) -> Option<EdgeId> {
        self.outgoing_edges(source)
            .find(|(_, dst, payload)| *dst == target && *payload == data)
            .map(|(id, _, _)| id)
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.live_nodes
    }

    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| NodeId::new(idx))
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.outgoing_edges(node).map(|(_, target, _)| target)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.incoming_edges(node).map(|(_, source, _)| source)
    }
}
