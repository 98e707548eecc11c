//! Serializing a control flow graph back into one instruction stream.
//!
//! Blocks are placed by a depth-first walk from the entry that always places a block's
//! fall-through successor right after it when it can. Where the placement breaks an
//! implicit fall-through, an explicit `Jump` (or `Return nil` for the exit) is
//! appended; where a block ends in a jump to the block placed right after it, the jump
//! is dropped.
//!
//! The true successor of a block is its `FallThrough` edge, or failing that its `Exit`
//! edge. Exception edges never count, even when they lead to the exit.

use std::{collections::HashSet, fmt};

use crate::{
    analysis::cfg::{BlockFlags, ControlFlowGraph, EdgeType},
    compiler::{EventKind, EventLog},
    ir::{Instr, Label, Operand},
    utils::{
        graph::{GraphBase, NodeId},
        BitSet,
    },
    Error, Result,
};

/// One block in its final position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearBlock {
    /// Block id in the graph that was linearized.
    pub id: NodeId,
    /// Block label.
    pub label: Label,
    /// Instructions after jump fix-ups.
    pub instrs: Vec<Instr>,
    /// Label of the block handling exceptions raised here.
    pub rescuer: Option<Label>,
    /// Label of the block running cleanup for exceptions raised here.
    pub ensurer: Option<Label>,
    /// Whether the flattened stream needs a label marker in front of this block.
    pub needs_label: bool,
}

/// The ordered blocks of one scope, ready for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearization {
    /// Scope name.
    pub scope: String,
    /// Blocks in emission order, exit last.
    pub blocks: Vec<LinearBlock>,
    /// Jumps appended because a fall-through could not be kept.
    pub jumps_inserted: usize,
    /// Jumps to the next block that were dropped.
    pub jumps_removed: usize,
    /// `Return nil` instructions appended for blocks falling into the exit.
    pub returns_inserted: usize,
}

impl Linearization {
    /// Returns the block ids in emission order.
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    /// Returns the position of `block` in the emission order.
    #[must_use]
    pub fn position(&self, block: NodeId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block)
    }

    /// Returns the number of instructions, label markers excluded.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }

    /// Flattens the blocks into one stream with label markers where needed.
    #[must_use]
    pub fn instructions(&self) -> Vec<Instr> {
        let mut out = Vec::with_capacity(self.instruction_count() + self.blocks.len());
        for block in &self.blocks {
            if block.needs_label {
                out.push(Instr::Label(block.label));
            }
            out.extend(block.instrs.iter().cloned());
        }
        out
    }
}

impl fmt::Display for Linearization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.scope)?;
        for block in &self.blocks {
            if block.needs_label {
                writeln!(f, "  {}:", block.label)?;
            }
            for instr in &block.instrs {
                writeln!(f, "    {instr}")?;
            }
        }
        Ok(())
    }
}

/// Places blocks and fixes up jumps.
///
/// # Examples
///
/// ```rust
/// use irflow::{
///     ir::{InstrBuilder, Operand, Scope},
///     CompilerConfig, ControlFlowGraph, EventLog, Linearizer,
/// };
///
/// let mut scope = Scope::new("loop");
/// let head = scope.new_label();
/// let instrs = InstrBuilder::new()
///     .label(head)
///     .op(None, "tick", vec![])
///     .jump(head)
///     .build();
/// let cfg = ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default())?;
///
/// let events = EventLog::new();
/// let linear = Linearizer::new(&events).linearize(&cfg)?;
/// assert_eq!(linear.instructions().len(), 3);
/// assert_eq!(linear.jumps_inserted, 0);
/// # Ok::<(), irflow::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Linearizer<'a> {
    events: &'a EventLog,
}

impl<'a> Linearizer<'a> {
    /// Creates a linearizer that reports fix-ups to `events`.
    #[must_use]
    pub fn new(events: &'a EventLog) -> Self {
        Linearizer { events }
    }

    /// Linearizes `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnplacedBlock`] if a live block is not reachable by the
    /// placement walk, which means an earlier pass left the graph inconsistent.
    pub fn linearize(&self, cfg: &ControlFlowGraph) -> Result<Linearization> {
        let order = place_blocks(cfg)?;
        let name = cfg.name();

        let mut linear = Linearization {
            scope: name.to_string(),
            blocks: Vec::with_capacity(order.len()),
            jumps_inserted: 0,
            jumps_removed: 0,
            returns_inserted: 0,
        };

        for (position, &id) in order.iter().enumerate() {
            let Some(block) = cfg.block(id) else {
                return Err(Error::GraphError(format!("{name}: placed missing block {id}")));
            };
            let next = order.get(position + 1).copied();
            let next_label = next.and_then(|n| cfg.block(n)).map(|b| b.label());
            let mut instrs = block.instrs().to_vec();

            if matches!(instrs.last(), Some(Instr::Jump(target)) if Some(*target) == next_label) {
                instrs.pop();
                linear.jumps_removed += 1;
                self.events
                    .record(EventKind::JumpRemoved)
                    .at(name, id)
                    .message(format!("{name}: {id} jumps to the next block"));
            } else if !block.ends_in_transfer() {
                if let Some(successor) = true_successor(cfg, id).filter(|&s| Some(s) != next) {
                    if successor == cfg.exit() {
                        instrs.push(Instr::Return(Operand::Nil));
                        linear.returns_inserted += 1;
                        self.events
                            .record(EventKind::JumpInserted)
                            .at(name, id)
                            .message(format!("{name}: {id} returns nil explicitly"));
                    } else if let Some(target) = cfg.block(successor) {
                        instrs.push(Instr::Jump(target.label()));
                        linear.jumps_inserted += 1;
                        self.events
                            .record(EventKind::JumpInserted)
                            .at(name, id)
                            .message(format!("{name}: {id} jumps to {successor}"));
                    }
                }
            }

            linear.blocks.push(LinearBlock {
                id,
                label: block.label(),
                instrs,
                rescuer: cfg.rescuer(id).and_then(|r| cfg.block(r)).map(|b| b.label()),
                ensurer: cfg.ensurer(id).and_then(|e| cfg.block(e)).map(|b| b.label()),
                needs_label: false,
            });
        }

        mark_labels(cfg, &mut linear);

        self.events
            .record(EventKind::ScopeLinearized)
            .scope(name)
            .message(format!(
                "{name}: {} blocks, {} jumps inserted, {} removed, {} returns inserted",
                linear.blocks.len(),
                linear.jumps_inserted,
                linear.jumps_removed,
                linear.returns_inserted
            ));
        Ok(linear)
    }
}

/// The block control reaches when `block` completes normally without a jump.
fn true_successor(cfg: &ControlFlowGraph, block: NodeId) -> Option<NodeId> {
    let outgoing = cfg.outgoing(block);
    outgoing
        .iter()
        .find(|(_, kind)| *kind == EdgeType::FallThrough)
        .or_else(|| outgoing.iter().find(|(_, kind)| *kind == EdgeType::Exit))
        .map(|&(target, _)| target)
}

/// Depth-first placement from the entry, fall-through successors first, exit last.
fn place_blocks(cfg: &ControlFlowGraph) -> Result<Vec<NodeId>> {
    let mut placed = BitSet::new(cfg.node_bound());
    let mut order = Vec::with_capacity(cfg.block_count());
    let exit = cfg.exit();

    let mut stack = vec![cfg.entry()];
    while let Some(block) = stack.pop() {
        if block == exit || !placed.insert(block.index()) {
            continue;
        }
        order.push(block);

        let outgoing = cfg.outgoing(block);
        let fall_through = outgoing
            .iter()
            .find(|(_, kind)| *kind == EdgeType::FallThrough)
            .map(|&(target, _)| target);
        for &(target, _) in outgoing.iter().rev() {
            if Some(target) != fall_through && !placed.contains(target.index()) {
                stack.push(target);
            }
        }
        if let Some(target) = fall_through {
            stack.push(target);
        }
    }
    order.push(exit);

    if let Some(block) = cfg
        .blocks()
        .find(|b| b.is_live() && b.id() != exit && !placed.contains(b.id().index()))
    {
        return Err(Error::UnplacedBlock {
            scope: cfg.name().to_string(),
            block: block.id(),
        });
    }
    Ok(order)
}

/// Decides which blocks keep a label marker in the flattened stream.
fn mark_labels(cfg: &ControlFlowGraph, linear: &mut Linearization) {
    let mut wanted: HashSet<Label> = linear
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter().flat_map(Instr::targets))
        .collect();
    for block in &linear.blocks {
        wanted.extend(block.rescuer);
        wanted.extend(block.ensurer);
    }

    for block in &mut linear.blocks {
        block.needs_label = wanted.contains(&block.label)
            || cfg.block(block.id).is_some_and(|b| {
                b.flags()
                    .intersects(BlockFlags::RESCUE_ENTRY | BlockFlags::SOURCE_LABEL)
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{InstrBuilder, Scope, Variable},
        test::{build, labels},
    };

    fn op(name: &str) -> Instr {
        Instr::Op {
            dst: None,
            name: name.into(),
            args: vec![],
            raises: false,
        }
    }

    fn linearize(cfg: &ControlFlowGraph) -> Linearization {
        Linearizer::new(&EventLog::new()).linearize(cfg).unwrap()
    }

    #[test]
    fn test_branch_round_trips() {
        let mut scope = Scope::new("roundtrip");
        let [l0, l1] = labels(&mut scope);
        let input = InstrBuilder::new()
            .label(l0)
            .push(op("i1"))
            .branch(Variable::local("c"), l1)
            .push(op("i2"))
            .label(l1)
            .push(op("i3"))
            .build();
        let cfg = build(&mut scope, input.clone());

        let linear = linearize(&cfg);
        assert_eq!(linear.instructions(), input);
        assert_eq!(linear.jumps_inserted, 0);
        assert_eq!(linear.jumps_removed, 0);
        assert_eq!(linear.returns_inserted, 0);
        assert_eq!(linear.blocks.last().map(|b| b.id), Some(cfg.exit()));
        assert_eq!(linear.order().next(), Some(cfg.entry()));
    }

    #[test]
    fn test_jump_to_next_is_removed() {
        let mut scope = Scope::new("jumps");
        let [next] = labels(&mut scope);
        let cfg = build(
            &mut scope,
            InstrBuilder::new()
                .push(op("a"))
                .jump(next)
                .label(next)
                .ret(Operand::Nil)
                .build(),
        );

        let linear = linearize(&cfg);
        assert_eq!(linear.jumps_removed, 1);
        assert!(linear
            .instructions()
            .iter()
            .all(|i| !matches!(i, Instr::Jump(_))));
    }

    #[test]
    fn test_displaced_fall_through_gets_jump() {
        let mut scope = Scope::new("displaced");
        let [other, join] = labels(&mut scope);
        let cfg = build(
            &mut scope,
            InstrBuilder::new()
                .branch(Variable::local("c"), other)
                .jump(join)
                .label(other)
                .push(op("y"))
                .label(join)
                .ret(Operand::Nil)
                .build(),
        );

        // The jump to `join` pulls the join block up, so `y` loses its fall-through.
        let linear = linearize(&cfg);
        let y = cfg.block_for_label(other).unwrap();
        let join_block = cfg.block_for_label(join).unwrap();
        assert!(linear.position(join_block) < linear.position(y));
        assert_eq!(linear.jumps_removed, 1);
        assert_eq!(linear.jumps_inserted, 1);

        let placed_y = &linear.blocks[linear.position(y).unwrap()];
        assert_eq!(placed_y.instrs.last(), Some(&Instr::Jump(join)));
        assert!(linear.instructions().contains(&Instr::Label(join)));
    }

    #[test]
    fn test_exit_fall_through_becomes_return() {
        let mut scope = Scope::new("tail");
        let [other, tail] = labels(&mut scope);
        let cfg = build(
            &mut scope,
            InstrBuilder::new()
                .branch(Variable::local("c"), other)
                .jump(tail)
                .label(other)
                .push(op("other"))
                .ret(Operand::Fixnum(1))
                .label(tail)
                .push(op("body"))
                .build(),
        );

        // `body` falls off the end of the scope but is placed before `other`.
        let linear = linearize(&cfg);
        let body = &linear.blocks[linear.position(cfg.block_for_label(tail).unwrap()).unwrap()];
        assert_eq!(body.instrs, vec![op("body"), Instr::Return(Operand::Nil)]);
        assert_eq!(linear.returns_inserted, 1);
        assert_eq!(linear.jumps_removed, 1);
        assert_eq!(linear.jumps_inserted, 0);
    }

    #[test]
    fn test_exception_edge_never_decides_successor() {
        let mut scope = Scope::new("tie_break");
        let mut cfg = build(
            &mut scope,
            InstrBuilder::new()
                .raising_op(None, "may_raise", vec![])
                .build(),
        );
        let block = NodeId::new(2);
        // An unprotected raising block gets an exception edge to the exit next to
        // its normal exit edge.
        cfg.add_edge(block, cfg.exit(), EdgeType::Exception).unwrap();
        assert_eq!(true_successor(&cfg, block), Some(cfg.exit()));

        cfg.remove_edge(block, cfg.exit(), EdgeType::Exit);
        assert_eq!(true_successor(&cfg, block), None);
        let linear = linearize(&cfg);
        assert!(linear.blocks[1].instrs.iter().all(|i| !i.is_return()));
    }

    #[test]
    fn test_unplaced_block_is_internal_error() {
        let mut scope = Scope::new("orphan");
        let mut cfg = build(&mut scope, InstrBuilder::new().ret(Operand::Nil).build());
        let orphan = cfg.new_block(&mut scope);

        let err = Linearizer::new(&EventLog::new())
            .linearize(&cfg)
            .unwrap_err();
        assert!(matches!(err, Error::UnplacedBlock { block, .. } if block == orphan));
        assert!(err.is_internal());
    }

    #[test]
    fn test_handler_labels_are_kept() {
        let mut scope = Scope::new("handlers");
        let [rescue] = labels(&mut scope);
        let cfg = build(
            &mut scope,
            InstrBuilder::new()
                .region_start(rescue, None)
                .raising_op(None, "risky", vec![])
                .region_end()
                .ret(Operand::Nil)
                .label(rescue)
                .ret(Operand::Fixnum(1))
                .build(),
        );
        let events = EventLog::new();
        let linear = Linearizer::new(&events).linearize(&cfg).unwrap();

        assert!(linear.instructions().contains(&Instr::Label(rescue)));
        assert!(linear.blocks.iter().any(|b| b.rescuer == Some(rescue)));
        assert!(events.has(EventKind::ScopeLinearized));
    }
}
