//! Splicing a body graph into a host graph at one instruction.
//!
//! Method and closure inlining differ only in how the body's instructions are rewritten
//! (see [`InlinerInfo::rewrite`]). Everything that touches the host graph lives here:
//! splitting the site block, cloning blocks, edges and regions, wiring the boundary,
//! propagating protection and tidying up with merges and a sweep.

use crate::{
    analysis::cfg::{sweep_unreachable, BlockFlags, ControlFlowGraph, EdgeType, ExceptionRegion},
    compiler::{
        inliner::info::{InlinerInfo, Rewrite},
        CompilerConfig, EventKind, EventLog,
    },
    ir::Scope,
    utils::graph::NodeId,
    Result,
};

/// Where a splice left the host graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceOutcome {
    /// The block that held the site. It survives every merge.
    pub call_block: NodeId,
    /// The block holding the code after the site, unless it was merged away or swept.
    pub split_block: Option<NodeId>,
    /// Number of body blocks cloned into the host.
    pub cloned: usize,
}

/// Host-side context of one splice.
pub(crate) struct Splice<'a> {
    pub cfg: &'a mut ControlFlowGraph,
    pub scope: &'a mut Scope,
    pub config: &'a CompilerConfig,
    pub events: &'a EventLog,
}

impl Splice<'_> {
    /// Replaces instruction `index` of `block` with the body graph.
    ///
    /// The caller has validated the site and captured its operands in `info`.
    pub fn run(
        &mut self,
        block: NodeId,
        index: usize,
        body: &ControlFlowGraph,
        info: &mut InlinerInfo,
    ) -> Result<SpliceOutcome> {
        let name = self.cfg.name().to_string();

        let split = self.cfg.split_block(self.scope, block, index + 1)?;
        if let Some(call_block) = self.cfg.block_mut(block) {
            call_block.instrs_mut().pop();
        }
        self.cfg.remove_edge(block, split, EdgeType::FallThrough);
        self.events
            .record(EventKind::BlockSplit)
            .at(&name, block)
            .message(format!("{name}: {block} split at {index}, tail in {split}"));

        let cloned = self.clone_blocks(body, info)?;
        self.wire_edges(block, split, body, info)?;
        self.clone_regions(block, body, info);
        self.propagate_protection(block, body, info)?;

        let split = self.merge_boundaries(block, split, info)?;
        sweep_unreachable(self.cfg, self.config, self.events);

        Ok(SpliceOutcome {
            call_block: block,
            split_block: split.filter(|&s| self.cfg.block(s).is_some()),
            cloned,
        })
    }

    /// Copies every live body block under a renamed label.
    fn clone_blocks(&mut self, body: &ControlFlowGraph, info: &mut InlinerInfo) -> Result<usize> {
        let mut cloned = 0;
        for old in body.block_ids() {
            let Some(source) = body.block(old).filter(|b| b.is_live()) else {
                continue;
            };
            if body.is_dummy(old) {
                continue;
            }

            let label = info.rename_label(self.scope, source.label());
            let flags = source.flags() & (BlockFlags::RESCUE_ENTRY | BlockFlags::SOURCE_LABEL);
            let new = self.cfg.add_block(label, flags)?;
            info.map_block(old, new);

            let mut instrs = Vec::with_capacity(source.len());
            for instr in source.instrs() {
                match info.rewrite(self.scope, instr) {
                    Rewrite::Keep(instr) => instrs.push(instr),
                    Rewrite::YieldSite(instr) => {
                        info.add_yield_site(new, instrs.len());
                        instrs.push(instr);
                    }
                    Rewrite::Drop => {}
                }
            }
            if let Some(block) = self.cfg.block_mut(new) {
                block.instrs_mut().extend(instrs);
            }
            cloned += 1;
        }
        Ok(cloned)
    }

    /// Re-creates internal edges and connects the body to the host at both ends.
    fn wire_edges(
        &mut self,
        block: NodeId,
        split: NodeId,
        body: &ControlFlowGraph,
        info: &InlinerInfo,
    ) -> Result<()> {
        let mut entered = false;
        for (target, kind) in body.outgoing(body.entry()) {
            if let Some(target) = info.mapped_block(target) {
                self.cfg.add_edge(block, target, kind)?;
                entered = true;
            }
        }
        if !entered {
            self.cfg.add_edge(block, split, EdgeType::FallThrough)?;
        }

        let mut sources: Vec<(NodeId, NodeId)> =
            info.block_map().iter().map(|(&old, &new)| (old, new)).collect();
        sources.sort_unstable();

        for (old, new) in sources {
            for (target, kind) in body.outgoing(old) {
                if target != body.exit() {
                    if let Some(target) = info.mapped_block(target) {
                        self.cfg.add_edge(new, target, kind)?;
                    }
                    continue;
                }

                if kind.is_exceptional() {
                    let handlers = [self.cfg.rescuer(split), self.cfg.ensurer(split)];
                    if handlers.iter().all(Option::is_none) {
                        self.cfg.add_edge(new, self.cfg.exit(), EdgeType::Exit)?;
                    }
                    for handler in handlers.into_iter().flatten() {
                        self.cfg.add_edge(new, handler, EdgeType::Exception)?;
                    }
                } else if self.cfg.block(new).is_some_and(|b| b.ends_in_return()) {
                    self.cfg.add_edge(new, self.cfg.exit(), EdgeType::Exit)?;
                } else {
                    self.cfg.add_edge(new, split, EdgeType::FallThrough)?;
                }
            }
        }
        Ok(())
    }

    /// Copies the body's region tree, nested under the site's innermost region.
    fn clone_regions(&mut self, block: NodeId, body: &ControlFlowGraph, info: &mut InlinerInfo) {
        if body.regions().is_empty() {
            return;
        }
        let blocks = info.block_map().clone();
        let scope = &mut *self.scope;
        let cloned: Vec<ExceptionRegion> = body
            .regions()
            .iter()
            .map(|region| {
                region.clone_with(&mut |label| info.rename_label(scope, label), &|b| {
                    blocks.get(&b).copied()
                })
            })
            .collect();

        let regions = self.cfg.regions_mut();
        match regions.iter_mut().find_map(|r| r.innermost_mut(block)) {
            Some(host) => cloned.into_iter().for_each(|region| host.add_nested(region)),
            None => regions.extend(cloned),
        }
    }

    /// Gives each clone its renamed protector, or the site block's when it had none.
    ///
    /// Fallback protection always comes with its exception edges; clean-up prunes the
    /// ones from blocks that cannot raise.
    fn propagate_protection(
        &mut self,
        block: NodeId,
        body: &ControlFlowGraph,
        info: &InlinerInfo,
    ) -> Result<()> {
        let fallback = (self.cfg.rescuer(block), self.cfg.ensurer(block));

        let mut clones: Vec<(NodeId, NodeId)> =
            info.block_map().iter().map(|(&old, &new)| (old, new)).collect();
        clones.sort_unstable();

        for (old, new) in clones {
            let rescuer = body.rescuer(old).and_then(|r| info.mapped_block(r));
            let ensurer = body.ensurer(old).and_then(|e| info.mapped_block(e));
            if rescuer.is_some() || ensurer.is_some() {
                self.cfg.set_rescuer(new, rescuer);
                self.cfg.set_ensurer(new, ensurer);
                continue;
            }

            self.cfg.set_rescuer(new, fallback.0);
            self.cfg.set_ensurer(new, fallback.1);
            self.cfg.connect_protection(new)?;
            self.cfg.join_region_of(block, new);
        }
        Ok(())
    }

    /// Merges the site block forward and the split block backward where legal.
    ///
    /// Returns the split block if it still exists.
    fn merge_boundaries(
        &mut self,
        block: NodeId,
        split: NodeId,
        info: &mut InlinerInfo,
    ) -> Result<Option<NodeId>> {
        let name = self.cfg.name().to_string();
        let mut split = Some(split);

        let successors = normal_neighbours(self.cfg.outgoing(block));
        if let [next] = successors[..] {
            if let Some(offset) = self.cfg.merge_blocks(block, next)? {
                info.block_merged(next, block, offset);
                if split == Some(next) {
                    split = None;
                }
                self.events
                    .record(EventKind::BlockMerged)
                    .at(&name, block)
                    .message(format!("{name}: {block} absorbed {next}"));
            }
        }

        let Some(tail) = split else {
            return Ok(None);
        };
        let incoming = self.cfg.incoming(tail);
        if incoming.iter().any(|(_, kind)| kind.is_exceptional()) {
            return Ok(split);
        }
        if let [prev] = normal_neighbours(incoming)[..] {
            if let Some(offset) = self.cfg.merge_blocks(prev, tail)? {
                info.block_merged(tail, prev, offset);
                self.events
                    .record(EventKind::BlockMerged)
                    .at(&name, prev)
                    .message(format!("{name}: {prev} absorbed {tail}"));
                return Ok(None);
            }
        }
        Ok(split)
    }
}

/// Distinct endpoints of the normal edges in `edges`.
fn normal_neighbours(edges: Vec<(NodeId, EdgeType)>) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = edges
        .into_iter()
        .filter(|(_, kind)| kind.is_normal())
        .map(|(node, _)| node)
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::cfg::{BlockFlags, ControlFlowGraph, EdgeType, ExceptionRegion},
        compiler::{CfgInliner, CompilerConfig, EventLog},
        ir::{Instr, InstrBuilder, Operand, Scope, Variable},
        test::{build, labels},
        utils::graph::NodeId,
    };

    /// Collects every region whose exclusive set holds `block`.
    fn owners<'r>(
        regions: &'r [ExceptionRegion],
        block: NodeId,
        out: &mut Vec<&'r ExceptionRegion>,
    ) {
        for region in regions {
            if region.exclusive_blocks().contains(&block) {
                out.push(region);
            }
            owners(region.nested(), block, out);
        }
    }

    fn call_to(cfg: &ControlFlowGraph, method: &str) -> (NodeId, usize) {
        cfg.find_instrs(|i| matches!(i, Instr::Call { method: m, .. } if m == method))[0]
    }

    #[test]
    fn test_callee_region_nests_under_host_region() {
        let config = CompilerConfig::default();
        let events = EventLog::new();

        let mut callee_scope = Scope::new("guarded");
        let [c_rescue] = labels(&mut callee_scope);
        let callee = build(
            &mut callee_scope,
            InstrBuilder::new()
                .region_start(c_rescue, None)
                .raising_op(None, "risky", vec![])
                .region_end()
                .ret(Operand::Fixnum(0))
                .label(c_rescue)
                .ret(Operand::Fixnum(1))
                .build(),
        );

        let mut scope = Scope::new("host");
        let [h_rescue] = labels(&mut scope);
        let mut cfg = build(
            &mut scope,
            InstrBuilder::new()
                .region_start(h_rescue, None)
                .call(None, Operand::Nil, "guarded", vec![])
                .region_end()
                .ret(Operand::Nil)
                .label(h_rescue)
                .ret(Operand::Fixnum(1))
                .build(),
        );
        let host_handler = cfg.block_for_label(h_rescue).unwrap();

        let (block, index) = cfg.call_sites()[0];
        CfgInliner::new(&config, &events)
            .inline_method(&mut cfg, &mut scope, block, index, &callee)
            .unwrap();
        cfg.validate().unwrap();

        let handlers: Vec<_> = cfg
            .find_instrs(|i| *i == Instr::Return(Operand::Fixnum(1)))
            .into_iter()
            .map(|(b, _)| b)
            .filter(|&b| b != host_handler)
            .collect();
        assert_eq!(handlers.len(), 1);
        let cloned_handler = handlers[0];

        assert_eq!(cfg.regions().len(), 1);
        let host_region = &cfg.regions()[0];
        assert_eq!(host_region.rescue_block(), Some(host_handler));
        assert_eq!(host_region.nested().len(), 1);
        assert_eq!(host_region.nested()[0].rescue_block(), Some(cloned_handler));

        // The cloned handler was unprotected in the callee, so the call site's
        // protection covers it now.
        let handler = cfg.block(cloned_handler).unwrap();
        assert!(handler.flags().contains(BlockFlags::RESCUE_ENTRY));
        assert_eq!(cfg.rescuer(cloned_handler), Some(host_handler));

        let risky = cfg.find_instrs(|i| matches!(i, Instr::Op { name, .. } if name == "risky"))[0].0;
        assert_eq!(cfg.rescuer(risky), Some(cloned_handler));
        assert!(cfg.has_edge(risky, cloned_handler, EdgeType::Exception));
    }

    #[test]
    fn test_absorbed_clone_moves_call_block_between_regions() {
        let config = CompilerConfig::default();
        let events = EventLog::new();

        let mut callee_scope = Scope::new("foo");
        let [c_rescue] = labels(&mut callee_scope);
        let callee = build(
            &mut callee_scope,
            InstrBuilder::new()
                .region_start(c_rescue, None)
                .call(None, Operand::Nil, "baz", vec![])
                .region_end()
                .ret(Operand::Nil)
                .label(c_rescue)
                .ret(Operand::Fixnum(1))
                .build(),
        );

        let mut scope = Scope::new("host");
        let [h_rescue] = labels(&mut scope);
        let mut cfg = build(
            &mut scope,
            InstrBuilder::new()
                .region_start(h_rescue, None)
                .call(None, Operand::Nil, "foo", vec![])
                .call(None, Operand::Nil, "bar", vec![])
                .region_end()
                .ret(Operand::Nil)
                .label(h_rescue)
                .ret(Operand::Fixnum(2))
                .build(),
        );

        let (block, index) = call_to(&cfg, "foo");
        CfgInliner::new(&config, &events)
            .inline_method(&mut cfg, &mut scope, block, index, &callee)
            .unwrap();
        cfg.validate().unwrap();

        for id in cfg.block_ids() {
            let mut found = Vec::new();
            owners(cfg.regions(), id, &mut found);
            assert!(found.len() <= 1, "{id} sits in {} exclusive sets", found.len());
        }

        // The block now holding the cloned call answers to the cloned region, in the
        // map and in the forest alike.
        let baz = call_to(&cfg, "baz").0;
        let mut found = Vec::new();
        owners(cfg.regions(), baz, &mut found);
        assert_eq!(found.len(), 1);
        assert!(cfg.rescuer(baz).is_some());
        assert_eq!(found[0].rescue_block(), cfg.rescuer(baz));
        assert_ne!(cfg.rescuer(baz), cfg.block_for_label(h_rescue));

        let bar = call_to(&cfg, "bar").0;
        assert_eq!(cfg.rescuer(bar), cfg.block_for_label(h_rescue));
    }

    #[test]
    fn test_fallback_protection_adds_exception_edges() {
        let config = CompilerConfig::default();
        let events = EventLog::new();

        let mut callee_scope = Scope::new("quiet");
        let [other] = labels(&mut callee_scope);
        let x = Variable::local("x");
        let callee = build(
            &mut callee_scope,
            InstrBuilder::new()
                .receive_arg(x.clone(), 0)
                .branch(x.clone(), other)
                .copy(x.clone(), 0i64)
                .label(other)
                .ret(x)
                .build(),
        );

        let mut scope = Scope::new("host");
        let [h_rescue] = labels(&mut scope);
        let mut cfg = build(
            &mut scope,
            InstrBuilder::new()
                .region_start(h_rescue, None)
                .call(None, Operand::Nil, "quiet", vec![Operand::Fixnum(1)])
                .raising_op(None, "after", vec![])
                .region_end()
                .ret(Operand::Nil)
                .label(h_rescue)
                .ret(Operand::Nil)
                .build(),
        );

        let (block, index) = call_to(&cfg, "quiet");
        CfgInliner::new(&config, &events)
            .inline_method(&mut cfg, &mut scope, block, index, &callee)
            .unwrap();

        assert!(!cfg.rescue_map().is_empty());
        for (&protected, &handler) in cfg.rescue_map() {
            assert!(
                cfg.has_edge(protected, handler, EdgeType::Exception),
                "{protected} is rescued by {handler} without an edge"
            );
        }
        cfg.validate().unwrap();
    }
}
