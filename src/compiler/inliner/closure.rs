//! Closure inlining at a yield site.

use crate::{
    analysis::cfg::{CfgBuilder, ControlFlowGraph},
    compiler::{
        inliner::{
            info::InlinerInfo,
            splice::{Splice, SpliceOutcome},
            CfgInliner,
        },
        EventKind,
    },
    ir::{ClosureId, Instr, Operand, Scope},
    utils::graph::NodeId,
    Error, RejectReason, Result,
};

/// Checks that a closure body can be spliced into its host.
pub(crate) fn check_closure_body(body: &[Instr]) -> std::result::Result<(), RejectReason> {
    if body.iter().any(|instr| matches!(instr, Instr::Break(_))) {
        return Err(RejectReason::ClosureBreaks);
    }
    if body.iter().any(|instr| !instr.closures().is_empty()) {
        return Err(RejectReason::NestedClosure);
    }
    Ok(())
}

impl CfgInliner<'_> {
    /// Replaces the `Yield` at `index` of `block` with the body of the literal closure
    /// it names, and marks the closure consumed.
    ///
    /// The yield's arguments are substituted for the closure's `recv_arg`s and each
    /// `closure_return` becomes an assignment to the yield's result. Locals the closure
    /// reads from the enclosing scope become plain host locals; a `return` inside the
    /// closure still leaves the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InlineRejected`] if the site is not a yield to a literal,
    /// unconsumed closure whose body builds and is free of `break` and nested closures.
    /// Nothing is changed in that case.
    pub fn inline_closure(
        &self,
        cfg: &mut ControlFlowGraph,
        scope: &mut Scope,
        block: NodeId,
        index: usize,
    ) -> Result<SpliceOutcome> {
        self.splice_closure(cfg, scope, block, index, None)
    }

    /// Inlines the closure named by the yield at `index` of `block`, reusing `prebuilt`
    /// when it holds that closure's graph.
    pub(crate) fn splice_closure(
        &self,
        cfg: &mut ControlFlowGraph,
        scope: &mut Scope,
        block: NodeId,
        index: usize,
        prebuilt: Option<(ClosureId, ControlFlowGraph)>,
    ) -> Result<SpliceOutcome> {
        let name = cfg.name().to_string();
        let reject = |reason| Error::InlineRejected {
            scope: name.clone(),
            block,
            reason,
        };

        let instr = cfg
            .block(block)
            .filter(|_| !cfg.is_dummy(block))
            .ok_or_else(|| reject(RejectReason::UnknownBlock))?
            .instrs()
            .get(index)
            .ok_or_else(|| reject(RejectReason::NotACallSite))?;
        let Instr::Yield { closure, .. } = instr else {
            return Err(reject(RejectReason::NotACallSite));
        };
        let id = closure
            .as_ref()
            .and_then(Operand::as_closure)
            .ok_or_else(|| reject(RejectReason::DynamicClosure))?;
        let mut info =
            InlinerInfo::for_yield(instr).ok_or_else(|| reject(RejectReason::NotACallSite))?;

        let closure_cfg = match prebuilt {
            Some((built, graph)) if built == id => {
                scope.closure_body(id).map_err(reject)?;
                graph
            }
            _ => self.build_closure_graph(&name, scope, id, &reject)?,
        };
        scope.take_closure(id).map_err(reject)?;

        let outcome = Splice {
            cfg,
            scope,
            config: self.config,
            events: self.events,
        }
        .run(block, index, &closure_cfg, &mut info)?;

        self.events
            .record(EventKind::ClosureInlined)
            .at(&name, block)
            .message(format!(
                "{name}: inlined {id} at {block}:{index} ({} blocks)",
                outcome.cloned
            ));
        Ok(outcome)
    }

    /// Checks the body of closure `id` and builds its graph on a copy of `scope`.
    ///
    /// The host scope is left as it was; splicing renames every label of the result
    /// anyway. A body that does not build is rejected with
    /// [`RejectReason::MalformedClosure`]; internal errors pass through.
    pub(crate) fn build_closure_graph(
        &self,
        host: &str,
        scope: &Scope,
        id: ClosureId,
        reject: &dyn Fn(RejectReason) -> Error,
    ) -> Result<ControlFlowGraph> {
        let body = scope.closure_body(id).map_err(reject)?;
        check_closure_body(body).map_err(reject)?;
        let body = body.to_vec();

        let mut scratch = scope.clone();
        match CfgBuilder::new(&mut scratch, self.config)
            .name(format!("{host}::{id}"))
            .events(self.events)
            .build(body)
        {
            Ok(graph) => Ok(graph),
            Err(err) if err.is_internal() => Err(err),
            Err(err) => Err(reject(RejectReason::MalformedClosure(err.to_string()))),
        }
    }
}
