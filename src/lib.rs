// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # irflow
//!
//! Control flow back-end for a dynamic-language VM compiler. `irflow` takes the flat
//! instruction list lowering produces for each scope, turns it into a control flow graph
//! with typed edges and exception regions, inlines small methods and the closures they
//! yield to, and serializes the result back into an instruction stream with as few
//! explicit jumps as possible.
//!
//! ## Features
//!
//! - **Arena graph** - Blocks and edges live in dense vectors indexed by stable ids
//! - **Typed edges** - Fall-through, branch, exception and exit edges are kept apart
//! - **Exception regions** - Rescue and ensure handlers with exact nesting
//! - **Inlining** - Method and closure bodies spliced in with full renaming
//! - **Layout** - Fall-through-first placement with jump fix-ups
//! - **Diagnostics** - Event log, text dumps and Graphviz output
//!
//! ## Quick Start
//!
//! ```rust
//! use irflow::prelude::*;
//!
//! let mut scope = Scope::new("abs");
//! let positive = scope.new_label();
//! let x = Variable::local("x");
//!
//! let instrs = InstrBuilder::new()
//!     .receive_arg(x.clone(), 0)
//!     .branch(x.clone(), positive)
//!     .op(x.clone(), "neg", vec![x.clone().into()])
//!     .label(positive)
//!     .ret(x)
//!     .build();
//!
//! let compiled = Pipeline::default().compile(CompileUnit::new(scope, instrs), &CalleeTable::new())?;
//! println!("{}", compiled.cfg);
//! println!("{}", compiled.linearization);
//! # Ok::<(), irflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Instructions, labels, variables and the per-scope allocator
//! - [`analysis`] - Control flow graph construction and queries
//! - [`compiler`] - Inlining, linearization and the per-scope pipeline
//! - [`utils`] - The arena graph and small shared helpers
//! - [`Error`] and [`Result`] - Error handling
//!
//! Everything is single-threaded per scope. [`Pipeline::compile_all`] compiles
//! independent scopes in parallel.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use irflow::prelude::*;
///
/// let mut scope = Scope::new("main");
/// let cfg = ControlFlowGraph::build(
///     &mut scope,
///     InstrBuilder::new().ret(Operand::Nil).build(),
///     &CompilerConfig::default(),
/// )?;
/// assert_eq!(cfg.block_count(), 3);
/// # Ok::<(), irflow::Error>(())
/// ```
pub mod prelude;

/// The instruction-level IR.
///
/// Lowering produces one [`ir::Scope`] and one `Vec<ir::Instr>` per method or closure.
/// The scope hands out fresh labels and temporaries and owns the scope's closure
/// bodies until they are inlined.
pub mod ir;

/// Control flow graph construction and queries.
///
/// # Key Types
///
/// - [`analysis::ControlFlowGraph`] - Blocks, typed edges, protection maps and regions
/// - [`analysis::CfgBuilder`] - Single-pass construction from an instruction list
/// - [`analysis::BasicBlock`] - A straight-line run of instructions
/// - [`analysis::EdgeType`] - How control moves along an edge
/// - [`analysis::ExceptionRegion`] - A protected range and its handlers
pub mod analysis;

/// Graph transformations and layout.
///
/// # Key Types
///
/// - [`compiler::CfgInliner`] - Method and closure inlining
/// - [`compiler::Linearizer`] - Block placement and jump fix-ups
/// - [`compiler::Pipeline`] - Build, inline, validate and linearize one scope
/// - [`compiler::EventLog`] - What the passes changed and why
pub mod compiler;

/// Shared data structures: the arena graph, a bit set and DOT helpers.
pub mod utils;

/// `irflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use irflow::{ir::Scope, CompilerConfig, ControlFlowGraph, Result};
///
/// fn empty(name: &str) -> Result<ControlFlowGraph> {
///     ControlFlowGraph::build(&mut Scope::new(name), Vec::new(), &CompilerConfig::default())
/// }
/// assert!(empty("noop").is_ok());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `irflow` Error type
///
/// The main error type for all operations in this crate. Structural errors reject a
/// scope's input, inlining rejections are recoverable, and internal errors signal a
/// broken graph invariant.
///
/// # Examples
///
/// ```rust
/// use irflow::{ir::{InstrBuilder, Scope}, CompilerConfig, ControlFlowGraph, Error};
///
/// let mut scope = Scope::new("broken");
/// let nowhere = scope.new_label();
/// let instrs = InstrBuilder::new().jump(nowhere).build();
///
/// match ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default()) {
///     Err(Error::UndefinedLabel { label, .. }) => assert_eq!(label, nowhere),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub use error::{Error, RejectReason};

pub use analysis::{CfgBuilder, ControlFlowGraph};
pub use compiler::{
    CalleeTable, CfgInliner, CompileUnit, CompiledScope, CompilerConfig, EventKind, EventLog,
    Linearization, Linearizer, Pipeline,
};
