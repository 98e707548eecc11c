//! Per-scope compilation: build, inline, validate, linearize.
//!
//! A [`Pipeline`] turns one [`CompileUnit`] into a [`CompiledScope`]. Inlining runs in
//! passes: each pass visits every call site (and every explicit yield to a literal
//! closure) once, and passes repeat until one inlines nothing or
//! [`CompilerConfig::max_inline_passes`] is reached. Rejected sites are reported as
//! warnings and left as calls; structural and internal errors abort the scope.
//!
//! Scopes are independent, so [`Pipeline::compile_all`] compiles them on the rayon
//! thread pool. The only shared state is the read-only [`CalleeTable`].

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    analysis::cfg::{clean_up, CfgBuilder, ControlFlowGraph},
    compiler::{
        CfgInliner, CompilerConfig, EventKind, EventLog, Linearization, Linearizer,
    },
    ir::{Instr, Operand, Scope},
    utils::graph::NodeId,
    Error, RejectReason, Result,
};

/// One scope as handed over by lowering.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    /// The scope, with its label and temporary counters and closure table.
    pub scope: Scope,
    /// The scope's instructions in source order.
    pub instrs: Vec<Instr>,
}

impl CompileUnit {
    /// Creates a unit.
    #[must_use]
    pub fn new(scope: Scope, instrs: Vec<Instr>) -> Self {
        CompileUnit { scope, instrs }
    }
}

/// Built graphs of the methods that may be inlined, by method name.
#[derive(Debug, Clone, Default)]
pub struct CalleeTable {
    callees: HashMap<String, ControlFlowGraph>,
}

impl CalleeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of every unit and registers it under its scope name.
    ///
    /// # Errors
    ///
    /// Returns the first construction error.
    pub fn from_units(
        units: impl IntoIterator<Item = CompileUnit>,
        config: &CompilerConfig,
    ) -> Result<Self> {
        let mut table = Self::new();
        for CompileUnit { mut scope, instrs } in units {
            let cfg = ControlFlowGraph::build(&mut scope, instrs, config)?;
            table.insert(scope.name(), cfg);
        }
        Ok(table)
    }

    /// Registers `cfg` as the body of `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, cfg: ControlFlowGraph) {
        self.callees.insert(name.into(), cfg);
    }

    /// Looks up a callee.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ControlFlowGraph> {
        self.callees.get(name)
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.callees.contains_key(name)
    }

    /// Returns the number of callees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callees.len()
    }

    /// Returns `true` if no callee is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }
}

/// The result of compiling one scope.
#[derive(Debug)]
pub struct CompiledScope {
    /// The scope after inlining, with consumed closures marked.
    pub scope: Scope,
    /// The final graph.
    pub cfg: ControlFlowGraph,
    /// The emission order.
    pub linearization: Linearization,
    /// Everything the passes reported for this scope.
    pub events: EventLog,
}

/// A site found by one inlining pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Call(NodeId, usize),
    Yield(NodeId, usize),
}

impl Site {
    fn position(self) -> (NodeId, usize) {
        match self {
            Site::Call(block, index) | Site::Yield(block, index) => (block, index),
        }
    }
}

/// Drives the passes over whole scopes.
///
/// # Examples
///
/// ```rust
/// use irflow::{
///     ir::{InstrBuilder, Operand, Scope, Variable},
///     CalleeTable, CompileUnit, CompilerConfig, Pipeline,
/// };
///
/// let config = CompilerConfig::default();
///
/// let x = Variable::local("x");
/// let helper = CompileUnit::new(
///     Scope::new("helper"),
///     InstrBuilder::new().receive_arg(x.clone(), 0).ret(x).build(),
/// );
/// let callees = CalleeTable::from_units([helper], &config)?;
///
/// let r = Variable::local("r");
/// let main = CompileUnit::new(
///     Scope::new("main"),
///     InstrBuilder::new()
///         .call(r.clone(), Operand::Nil, "helper", vec![Operand::Fixnum(1)])
///         .ret(r)
///         .build(),
/// );
///
/// let compiled = Pipeline::new(config).compile(main, &callees)?;
/// assert!(compiled.cfg.call_sites().is_empty());
/// assert_eq!(compiled.linearization.instruction_count(), 3);
/// # Ok::<(), irflow::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: CompilerConfig,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Pipeline { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles one scope.
    ///
    /// # Errors
    ///
    /// Returns construction errors of the scope, and any internal error raised by
    /// inlining, validation or linearization. Inlining rejections are not errors.
    pub fn compile(&self, unit: CompileUnit, callees: &CalleeTable) -> Result<CompiledScope> {
        let CompileUnit { mut scope, instrs } = unit;
        let events = EventLog::new();

        let mut cfg = CfgBuilder::new(&mut scope, &self.config)
            .events(&events)
            .build(instrs)?;

        if self.config.enable_inlining || self.config.enable_closure_inlining {
            let inliner = CfgInliner::new(&self.config, &events);
            let mut reported = HashSet::new();
            let mut total = 0;
            for round in 1..=self.config.max_inline_passes {
                let inlined =
                    self.inline_pass(&inliner, &mut cfg, &mut scope, callees, &mut reported)?;
                if inlined == 0 {
                    break;
                }
                events.info(format!(
                    "{}: inlining round {round} inlined {inlined} sites",
                    scope.name()
                ));
                total += inlined;
            }
            if total > 0 {
                clean_up(&mut cfg, &self.config, &events)?;
            }
        }

        cfg.validate()?;
        let linearization = Linearizer::new(&events).linearize(&cfg)?;

        Ok(CompiledScope {
            scope,
            cfg,
            linearization,
            events,
        })
    }

    /// Compiles every unit, in parallel when [`CompilerConfig::parallel`] is set.
    ///
    /// Results are returned in input order; one scope failing does not affect the
    /// others.
    pub fn compile_all(
        &self,
        units: Vec<CompileUnit>,
        callees: &CalleeTable,
    ) -> Vec<Result<CompiledScope>> {
        if self.config.parallel {
            units
                .into_par_iter()
                .map(|unit| self.compile(unit, callees))
                .collect()
        } else {
            units
                .into_iter()
                .map(|unit| self.compile(unit, callees))
                .collect()
        }
    }

    /// Visits every site once. Returns the number of sites inlined.
    fn inline_pass(
        &self,
        inliner: &CfgInliner<'_>,
        cfg: &mut ControlFlowGraph,
        scope: &mut Scope,
        callees: &CalleeTable,
        reported: &mut HashSet<String>,
    ) -> Result<usize> {
        let events = inliner.events();
        let mut sites = Vec::new();
        if self.config.enable_inlining {
            sites.extend(cfg.call_sites().into_iter().map(|(b, i)| Site::Call(b, i)));
        }
        if self.config.enable_closure_inlining {
            sites.extend(
                cfg.find_instrs(|instr| {
                    matches!(
                        instr,
                        Instr::Yield {
                            closure: Some(Operand::Closure(_)),
                            ..
                        }
                    )
                })
                .into_iter()
                .map(|(b, i)| Site::Yield(b, i)),
            );
        }
        // Later sites first within a block, so splitting never moves a pending site.
        sites.sort_by(|a, b| {
            let (a_block, a_index) = a.position();
            let (b_block, b_index) = b.position();
            a_block.cmp(&b_block).then(b_index.cmp(&a_index))
        });

        let mut inlined = 0;
        for site in sites {
            let (block, index) = site.position();
            let Some(instr) = cfg.block(block).and_then(|b| b.instrs().get(index)) else {
                continue;
            };

            let method = match (site, instr) {
                (Site::Call(..), Instr::Call { method, .. }) => Some(method.clone()),
                (Site::Yield(..), Instr::Yield { .. }) => None,
                _ => continue,
            };

            let result = match method {
                Some(method) => match callees.get(&method) {
                    Some(callee) => inliner
                        .inline_method(cfg, scope, block, index, callee)
                        .map(|_| ()),
                    None => Err(Error::InlineRejected {
                        scope: cfg.name().to_string(),
                        block,
                        reason: RejectReason::UnknownCallee(method),
                    }),
                },
                None => inliner.inline_closure(cfg, scope, block, index).map(|_| ()),
            };

            match result {
                Ok(()) => inlined += 1,
                Err(err) if err.is_recoverable() => {
                    let message = err.to_string();
                    if reported.insert(message.clone()) {
                        events
                            .record(EventKind::InlineRejected)
                            .at(cfg.name(), block)
                            .message(message.clone());
                        events.warn(message);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(inlined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstrBuilder, Variable};

    fn helper() -> CompileUnit {
        let x = Variable::local("x");
        CompileUnit::new(
            Scope::new("helper"),
            InstrBuilder::new()
                .receive_arg(x.clone(), 0)
                .op(x.clone(), "inc", vec![x.clone().into()])
                .ret(x)
                .build(),
        )
    }

    fn main_unit(name: &str, calls: &[&str]) -> CompileUnit {
        let r = Variable::local("r");
        let mut builder = InstrBuilder::new();
        for method in calls {
            builder = builder.call(r.clone(), Operand::Nil, method, vec![Operand::Fixnum(1)]);
        }
        CompileUnit::new(Scope::new(name), builder.ret(r).build())
    }

    #[test]
    fn test_callee_table() {
        let config = CompilerConfig::default();
        let table = CalleeTable::from_units([helper()], &config).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains("helper"));
        assert!(table.get("missing").is_none());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_compile_inlines_known_callees() {
        let config = CompilerConfig::default();
        let callees = CalleeTable::from_units([helper()], &config).unwrap();
        let compiled = Pipeline::new(config)
            .compile(main_unit("main", &["helper", "puts", "helper"]), &callees)
            .unwrap();

        let remaining: Vec<&Instr> = compiled
            .cfg
            .call_sites()
            .into_iter()
            .map(|(b, i)| &compiled.cfg.block(b).unwrap().instrs()[i])
            .collect();
        assert_eq!(remaining.len(), 1);
        assert!(matches!(remaining[0], Instr::Call { method, .. } if method == "puts"));

        assert_eq!(compiled.events.count_kind(EventKind::MethodInlined), 2);
        assert_eq!(compiled.events.count_kind(EventKind::InlineRejected), 1);
        assert_eq!(compiled.events.warnings().count(), 1);
        assert!(compiled.events.has(EventKind::ScopeBuilt));
        assert!(compiled.events.has(EventKind::ScopeLinearized));
    }

    #[test]
    fn test_no_inlining_config() {
        let config = CompilerConfig::no_inlining();
        let callees = CalleeTable::from_units([helper()], &config).unwrap();
        let compiled = Pipeline::new(config)
            .compile(main_unit("main", &["helper"]), &callees)
            .unwrap();
        assert_eq!(compiled.cfg.call_sites().len(), 1);
        assert!(!compiled.events.has(EventKind::MethodInlined));
    }

    #[test]
    fn test_pass_limit_bounds_nested_inlining() {
        // outer calls middle calls helper: two passes flatten everything.
        let config = CompilerConfig::default().with_max_inline_passes(1);
        let middle = main_unit("middle", &["helper"]);
        let callees = CalleeTable::from_units([helper(), middle], &config).unwrap();

        let once = Pipeline::new(config.clone())
            .compile(main_unit("outer", &["middle"]), &callees)
            .unwrap();
        assert_eq!(once.cfg.call_sites().len(), 1);

        let twice = Pipeline::new(config.with_max_inline_passes(2))
            .compile(main_unit("outer", &["middle"]), &callees)
            .unwrap();
        assert!(twice.cfg.call_sites().is_empty());
    }

    #[test]
    fn test_compile_all_keeps_order_and_isolates_failures() {
        let config = CompilerConfig::default();
        let callees = CalleeTable::from_units([helper()], &config).unwrap();

        let mut broken_scope = Scope::new("broken");
        let missing = broken_scope.new_label();
        let broken = CompileUnit::new(broken_scope, InstrBuilder::new().jump(missing).build());

        for parallel in [true, false] {
            let pipeline = Pipeline::new(config.clone().with_parallel(parallel));
            let units = vec![
                main_unit("a", &["helper"]),
                broken.clone(),
                main_unit("c", &[]),
            ];
            let results = pipeline.compile_all(units, &callees);
            assert_eq!(results.len(), 3);
            assert_eq!(results[0].as_ref().unwrap().scope.name(), "a");
            assert!(matches!(results[1], Err(Error::UndefinedLabel { .. })));
            assert_eq!(results[2].as_ref().unwrap().scope.name(), "c");
        }
    }
}
