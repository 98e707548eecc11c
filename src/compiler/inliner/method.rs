//! Method inlining.

use crate::{
    analysis::cfg::ControlFlowGraph,
    compiler::{
        inliner::{
            info::InlinerInfo,
            splice::Splice,
            CfgInliner, InlineOutcome,
        },
        EventKind,
    },
    ir::{ClosureId, Instr, Scope},
    utils::graph::NodeId,
    Error, RejectReason, Result,
};

impl CfgInliner<'_> {
    /// Replaces the `Call` at `index` of `block` with the body of `callee`.
    ///
    /// The call's receiver, arguments and closure are substituted for the callee's
    /// receive instructions and each callee `Return` becomes an assignment to the call's
    /// result. If the callee yields exactly once to a literal closure and closure
    /// inlining is enabled, the closure is inlined at that yield as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InlineRejected`] when a precondition fails; the graph and scope
    /// are then unchanged. Any other error means the graph was corrupted mid-splice.
    pub fn inline_method(
        &self,
        cfg: &mut ControlFlowGraph,
        scope: &mut Scope,
        block: NodeId,
        index: usize,
        callee: &ControlFlowGraph,
    ) -> Result<InlineOutcome> {
        let (mut info, closure) = self.check_call_site(cfg, scope, block, index, callee)?;
        let name = cfg.name().to_string();

        let splice = Splice {
            cfg: &mut *cfg,
            scope: &mut *scope,
            config: self.config,
            events: self.events,
        }
        .run(block, index, callee, &mut info)?;

        self.events
            .record(EventKind::MethodInlined)
            .at(&name, block)
            .message(format!(
                "{name}: inlined {} at {block}:{index} ({} blocks)",
                callee.name(),
                splice.cloned
            ));

        let mut inlined_closure = None;
        if let (Some((id, graph)), [(site, site_index)]) = (closure, info.yield_sites()) {
            match self.splice_closure(cfg, scope, *site, *site_index, Some((id, graph))) {
                Ok(_) => inlined_closure = Some(id),
                Err(err) if err.is_recoverable() => {
                    self.events
                        .record(EventKind::InlineRejected)
                        .at(&name, *site)
                        .message(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(InlineOutcome {
            splice,
            inlined_closure,
        })
    }

    /// Checks every precondition of method inlining without mutating anything.
    ///
    /// Returns the captured call context and, when a literal closure will be inlined
    /// afterwards, its id and already built graph.
    fn check_call_site(
        &self,
        cfg: &ControlFlowGraph,
        scope: &Scope,
        block: NodeId,
        index: usize,
        callee: &ControlFlowGraph,
    ) -> Result<(InlinerInfo, Option<(ClosureId, ControlFlowGraph)>)> {
        let reject = |reason| Error::InlineRejected {
            scope: cfg.name().to_string(),
            block,
            reason,
        };

        let site = cfg
            .block(block)
            .filter(|_| !cfg.is_dummy(block))
            .ok_or_else(|| reject(RejectReason::UnknownBlock))?;
        let instr = site
            .instrs()
            .get(index)
            .ok_or_else(|| reject(RejectReason::NotACallSite))?;
        let Instr::Call { closure, .. } = instr else {
            return Err(reject(RejectReason::NotACallSite));
        };
        let info = InlinerInfo::for_call(instr).ok_or_else(|| reject(RejectReason::NotACallSite))?;

        let size = callee.instruction_count();
        let limit = self.config.inline_threshold;
        if size > limit {
            return Err(reject(RejectReason::CalleeTooLarge { size, limit }));
        }
        if callee.defines_closures() {
            return Err(reject(RejectReason::CalleeDefinesClosures));
        }

        let yields = callee.yield_sites();
        if yields.is_empty() {
            return Ok((info, None));
        }
        if callee.captures_block() {
            return Err(reject(RejectReason::CapturedBlock));
        }
        let Some(closure) = closure else {
            return Ok((info, None));
        };
        if yields.len() > 1 {
            return Err(reject(RejectReason::MultipleYieldSites(yields.len())));
        }
        let id = closure
            .as_closure()
            .ok_or_else(|| reject(RejectReason::DynamicClosure))?;
        if !self.config.enable_closure_inlining {
            return Ok((info, None));
        }

        let graph = self.build_closure_graph(cfg.name(), scope, id, &reject)?;
        Ok((info, Some((id, graph))))
    }
}
