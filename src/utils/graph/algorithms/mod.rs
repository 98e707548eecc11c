//! Graph algorithms used by the control flow passes.
//!
//! Everything here is generic over the [`Successors`](crate::utils::graph::Successors)
//! trait, so the same code serves the raw [`DirectedGraph`](crate::utils::graph::DirectedGraph)
//! and the control flow graph.
//!
//! | Algorithm | Used by |
//! |-----------|---------|
//! | [`dfs`] | building block for [`reachable`] |
//! | [`reachable`] | unreachable-block removal and invariant validation |
//! | [`postorder`], [`reverse_postorder`] | [`ControlFlowGraph`](crate::analysis::ControlFlowGraph) block orderings |

mod traversal;

pub use traversal::{dfs, postorder, reachable, reverse_postorder, DfsIterator};
