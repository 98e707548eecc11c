//! Graph transformations and code layout for one scope at a time.
//!
//! This module sits between graph construction and emission:
//!
//! - [`crate::analysis`]: instruction list to control flow graph
//! - [`compiler`](self): inlining, linearization and the per-scope pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Compile Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompileUnit                 Scope + instruction list            │
//! │  CalleeTable                 Built callee graphs by method name  │
//! │                                                                  │
//! │  Pipeline::compile                                               │
//! │    ├─ CfgBuilder              Linear scan → ControlFlowGraph     │
//! │    ├─ Inlining passes         Until stable or max_inline_passes  │
//! │    │    ├─ inline_method()    Call site → callee body            │
//! │    │    └─ inline_closure()   Yield site → literal closure body  │
//! │    ├─ validate()              Graph invariants                   │
//! │    └─ Linearizer              DFS placement + jump fix-ups       │
//! │                                                                  │
//! │  Pipeline::compile_all       Independent scopes on rayon         │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │  CompilerConfig              Switches and limits                 │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;
mod inliner;
mod linearizer;
mod pipeline;

pub use config::CompilerConfig;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use inliner::{CfgInliner, InlineMode, InlineOutcome, InlinerInfo, SpliceOutcome};
pub use linearizer::{LinearBlock, Linearization, Linearizer};
pub use pipeline::{CalleeTable, CompileUnit, CompiledScope, Pipeline};
