//! Generic directed graph infrastructure.
//!
//! The control flow graph is a thin semantic layer over the types in this module:
//!
//! - [`NodeId`] and [`EdgeId`] are strongly-typed arena indices
//! - [`DirectedGraph`] stores node and edge payloads with forward and reverse adjacency,
//!   and supports node and edge removal without invalidating other ids
//! - [`GraphBase`], [`Successors`] and [`Predecessors`] let the [`algorithms`] run
//!   over any graph that exposes adjacency
//!
//! # Usage
//!
//! ```rust
//! use irflow::utils::graph::{algorithms, DirectedGraph, NodeId};
//!
//! let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
//! let entry = graph.add_node("entry");
//! let body = graph.add_node("body");
//! let exit = graph.add_node("exit");
//! graph.add_edge(entry, body, ())?;
//! graph.add_edge(body, exit, ())?;
//!
//! let order: Vec<NodeId> = algorithms::dfs(&graph, entry).collect();
//! assert_eq!(order, vec![entry, body, exit]);
//! assert!(algorithms::reachable(&graph, body).contains(exit.index()));
//! # Ok::<(), irflow::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! Graphs are [`Send`] and [`Sync`] when their payloads are. Mutation requires exclusive
//! access; independent graphs can be rewritten on different threads.

mod directed;
mod edge;
mod node;
mod traits;

pub mod algorithms;

pub use directed::DirectedGraph;
pub use edge::EdgeId;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, Successors};
