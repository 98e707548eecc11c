//! Control Flow Graph (CFG) construction and structural rewrites.
//!
//! This module turns the linear instruction list of one scope into a graph of
//! [`BasicBlock`]s connected by typed edges, and provides the rewrites (split, merge,
//! remove) that inlining is built from.
//!
//! # Architecture
//!
//! The CFG builds upon the generic [`crate::utils::graph::DirectedGraph`] arena. Blocks
//! are nodes, [`EdgeType`]s are edge payloads. Exception protection is kept twice: as
//! the `rescuer`/`ensurer` maps for constant time lookups and as a forest of
//! [`ExceptionRegion`]s that records which region each block was created in.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - blocks, edges, label index and protection maps
//! - [`CfgBuilder`] - linear scan producing a graph from an instruction list
//! - [`BasicBlock`] / [`BlockFlags`] - straight-line instruction runs
//! - [`EdgeType`] - fall-through, branch, exception and exit edges
//! - [`ExceptionRegion`] - nested protected regions
//!
//! # Edge Types
//!
//! - **FallThrough**: control runs off the end of the block, at most one per block
//! - **Branch**: a jump, conditional branch or case arm names the target
//! - **Exception**: an exception raised in the block goes to the target
//! - **Exit**: control leaves the scope
//!
//! # Examples
//!
//! ```rust
//! use irflow::{
//!     analysis::EdgeType,
//!     ir::{InstrBuilder, Operand, Scope, Variable},
//!     CompilerConfig, ControlFlowGraph,
//! };
//!
//! let mut scope = Scope::new("guarded");
//! let handler = scope.new_label();
//! let instrs = InstrBuilder::new()
//!     .region_start(handler, None)
//!     .call(None, Variable::self_var(), "risky", vec![])
//!     .region_end()
//!     .ret(Operand::Nil)
//!     .label(handler)
//!     .ret(Operand::Nil)
//!     .build();
//!
//! let cfg = ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default())?;
//! let (call_block, _) = cfg.call_sites()[0];
//! let rescue = cfg.block_for_label(handler).unwrap();
//! assert_eq!(cfg.rescuer(call_block), Some(rescue));
//! assert!(cfg.has_edge(call_block, rescue, EdgeType::Exception));
//! # Ok::<(), irflow::Error>(())
//! ```

mod block;
mod builder;
mod edge;
mod graph;
mod region;

pub(crate) use builder::{clean_up, sweep_unreachable};

pub use block::{BasicBlock, BlockFlags};
pub use builder::CfgBuilder;
pub use edge::EdgeType;
pub use graph::ControlFlowGraph;
pub use region::ExceptionRegion;
