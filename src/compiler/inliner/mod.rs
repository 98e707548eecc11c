//! Method and closure inlining on control flow graphs.
//!
//! Inlining replaces one `Call` (or one `Yield`) with a renamed copy of the body graph.
//! Both kinds share the same splice: the site block is split after the call, the body's
//! blocks, edges and exception regions are cloned in under fresh labels, and the
//! boundary is rewired so that normal completion continues after the call while raised
//! exceptions reach the handlers that protected the call.
//!
//! # Inlining Criteria
//!
//! A method call is inlined only if:
//! 1. The instruction at the site is a `Call`
//! 2. The callee is no larger than [`CompilerConfig::inline_threshold`]
//! 3. The callee defines no closures of its own
//! 4. The callee does not both yield and capture its block as a value
//! 5. A passed closure meets at most one yield site
//!
//! When the callee yields to a literal closure and closure inlining is enabled, the
//! closure must also be registered, unconsumed, free of `break` and free of nested
//! closures. It is then inlined at the single yield site right after the method.
//!
//! Every criterion is checked before the host graph is touched, so a rejected site
//! leaves the graph exactly as it was.
//!
//! # Renaming
//!
//! See [`InlinerInfo`] for how labels and variables of the body map into the host.

mod closure;
mod info;
mod method;
mod splice;

pub use info::{InlineMode, InlinerInfo};
pub use splice::SpliceOutcome;

use crate::{
    compiler::{CompilerConfig, EventLog},
    ir::ClosureId,
    utils::graph::NodeId,
};

/// Result of a successful method inlining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineOutcome {
    /// Where the method body landed.
    pub splice: SpliceOutcome,
    /// The closure that was inlined at the method's yield site, if any.
    pub inlined_closure: Option<ClosureId>,
}

impl InlineOutcome {
    /// Returns the block that held the call.
    #[must_use]
    pub fn call_block(&self) -> NodeId {
        self.splice.call_block
    }
}

/// Inlines methods and closures into a host graph.
///
/// The inliner is stateless between operations; every call works on the graph and
/// scope it is given and reports what it changed to the shared [`EventLog`].
///
/// # Examples
///
/// ```rust
/// use irflow::{
///     ir::{InstrBuilder, Operand, Scope, Variable},
///     CfgInliner, CompilerConfig, ControlFlowGraph, EventLog,
/// };
///
/// let config = CompilerConfig::default();
/// let events = EventLog::new();
///
/// let mut callee_scope = Scope::new("double");
/// let x = Variable::local("x");
/// let body = InstrBuilder::new()
///     .receive_arg(x.clone(), 0)
///     .op(x.clone(), "mul", vec![x.clone().into(), Operand::Fixnum(2)])
///     .ret(x)
///     .build();
/// let callee = ControlFlowGraph::build(&mut callee_scope, body, &config)?;
///
/// let mut scope = Scope::new("main");
/// let r = Variable::local("r");
/// let instrs = InstrBuilder::new()
///     .call(r.clone(), Operand::Nil, "double", vec![Operand::Fixnum(21)])
///     .ret(r)
///     .build();
/// let mut cfg = ControlFlowGraph::build(&mut scope, instrs, &config)?;
///
/// let (block, index) = cfg.call_sites()[0];
/// CfgInliner::new(&config, &events).inline_method(&mut cfg, &mut scope, block, index, &callee)?;
/// assert!(cfg.call_sites().is_empty());
/// # Ok::<(), irflow::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CfgInliner<'a> {
    config: &'a CompilerConfig,
    events: &'a EventLog,
}

impl<'a> CfgInliner<'a> {
    /// Creates an inliner bound to a configuration and an event log.
    #[must_use]
    pub fn new(config: &'a CompilerConfig, events: &'a EventLog) -> Self {
        CfgInliner { config, events }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        self.config
    }

    /// Returns the event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        self.events
    }
}
