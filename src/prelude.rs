//! # irflow Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! irflow library. Import this module to get quick access to everything needed to
//! build, transform and linearize a scope.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all irflow operations
pub use crate::Error;

/// Why an inlining attempt was rejected
pub use crate::RejectReason;

/// The result type used throughout irflow
pub use crate::Result;

// ================================================================================================
// Instruction IR
// ================================================================================================

/// Instructions, operands and the per-scope allocator
pub use crate::ir::{ClosureId, Instr, InstrBuilder, Label, Operand, Operation, Scope, Variable};

// ================================================================================================
// Control Flow Graph
// ================================================================================================

/// Graph, blocks and edges
pub use crate::analysis::{
    BasicBlock, BlockFlags, CfgBuilder, ControlFlowGraph, EdgeType, ExceptionRegion,
};

/// Stable block identifier
pub use crate::utils::graph::NodeId;

// ================================================================================================
// Transformations and Pipeline
// ================================================================================================

/// Inlining, linearization and the per-scope pipeline
pub use crate::compiler::{
    CalleeTable, CfgInliner, CompileUnit, CompiledScope, CompilerConfig, Linearization,
    Linearizer, Pipeline,
};

/// Change tracking
pub use crate::compiler::{Event, EventKind, EventLog};
