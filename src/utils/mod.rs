//! Shared utilities: the graph arena, a dense bit set and Graphviz escaping.

mod bitset;
mod dot;
pub mod graph;

pub use bitset::BitSet;
pub use dot::escape_dot;
