//! Graph-level view of a scope.
//!
//! This module builds upon the generic graph infrastructure in
//! [`crate::utils::graph`] to provide the control flow graph every later pass works
//! on.
//!
//! - [`cfg`] - Control Flow Graph construction, queries and structural rewrites

pub mod cfg;

// Re-export primary types at module level
pub use cfg::{
    BasicBlock, BlockFlags, CfgBuilder, ControlFlowGraph, EdgeType, ExceptionRegion,
};
