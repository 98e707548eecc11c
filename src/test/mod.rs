//! Helpers shared by the unit tests.
//!
//! Tests build small graphs from hand-written instruction lists. Construction errors in
//! a fixture are bugs in the test, so these helpers panic instead of returning `Result`.

use crate::{
    analysis::{CfgBuilder, ControlFlowGraph},
    compiler::{CompilerConfig, EventLog},
    ir::{Instr, Label, Scope},
};

/// Builds `instrs` with the default configuration.
pub fn build(scope: &mut Scope, instrs: Vec<Instr>) -> ControlFlowGraph {
    build_with(scope, instrs, &CompilerConfig::default(), &EventLog::new())
}

/// Builds `instrs` with an explicit configuration, recording into `events`.
pub fn build_with(
    scope: &mut Scope,
    instrs: Vec<Instr>,
    config: &CompilerConfig,
    events: &EventLog,
) -> ControlFlowGraph {
    let name = scope.name().to_string();
    CfgBuilder::new(scope, config)
        .events(events)
        .build(instrs)
        .unwrap_or_else(|err| panic!("fixture `{name}` failed to build: {err}"))
}

/// Allocates `N` fresh labels from `scope`.
pub fn labels<const N: usize>(scope: &mut Scope) -> [Label; N] {
    std::array::from_fn(|_| scope.new_label())
}
