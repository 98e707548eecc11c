//! Control Flow Graph implementation.
//!
//! This module provides the [`ControlFlowGraph`] structure: basic blocks stored in a
//! [`DirectedGraph`] arena, typed edges between them, the label index and the exception
//! protection maps, together with the structural rewrites (splitting, merging, removal)
//! the inliner is built from.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Write},
};

use crate::{
    analysis::cfg::{BasicBlock, BlockFlags, EdgeType, ExceptionRegion},
    ir::{Instr, Label, Scope},
    utils::{
        escape_dot,
        graph::{
            algorithms, DirectedGraph, GraphBase, NodeId, Predecessors, Successors,
        },
    },
    Error, Result,
};

/// The control flow graph of one scope.
///
/// Every graph has exactly one dummy entry block and one dummy exit block. Neither
/// holds instructions. The entry falls through to the first real block and has an
/// [`EdgeType::Exit`] edge to the exit so the exit block is always reachable.
///
/// Block ids are arena indices. They are never reused inside one graph, so ids handed
/// out before a rewrite stay meaningful afterwards (a removed block simply stops
/// resolving).
///
/// # Invariants
///
/// - every live non-entry block is reachable from the entry
/// - a block has at most one outgoing [`EdgeType::FallThrough`] edge
/// - no two blocks carry the same label
/// - [`EdgeType::Exit`] edges always target the exit block
///
/// [`validate`](Self::validate) checks all of them.
///
/// # Examples
///
/// ```rust
/// use irflow::{
///     ir::{InstrBuilder, Operand, Scope, Variable},
///     CompilerConfig, ControlFlowGraph,
/// };
///
/// let mut scope = Scope::new("abs");
/// let neg = scope.new_label();
/// let x = Variable::local("x");
/// let instrs = InstrBuilder::new()
///     .receive_arg(x.clone(), 0)
///     .branch(x.clone(), neg)
///     .ret(x.clone())
///     .label(neg)
///     .op(x.clone(), "neg", vec![Operand::Var(x.clone())])
///     .ret(x)
///     .build();
///
/// let cfg = ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default())?;
/// assert_eq!(cfg.block_count(), 5);
/// assert!(cfg.block_for_label(neg).is_some());
/// cfg.validate()?;
/// # Ok::<(), irflow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    name: String,
    graph: DirectedGraph<BasicBlock, EdgeType>,
    entry: NodeId,
    exit: NodeId,
    label_index: HashMap<Label, NodeId>,
    rescuer_of: BTreeMap<NodeId, NodeId>,
    ensurer_of: BTreeMap<NodeId, NodeId>,
    regions: Vec<ExceptionRegion>,
    global_ensure: Option<NodeId>,
}

impl ControlFlowGraph {
    /// Creates a graph holding only the dummy entry and exit blocks.
    ///
    /// Both dummies get fresh labels from `scope`. The entry-to-exit edge is added by
    /// the builder once the first real block exists.
    pub fn new(scope: &mut Scope) -> Self {
        let mut cfg = ControlFlowGraph {
            name: scope.name().to_string(),
            graph: DirectedGraph::new(),
            entry: NodeId::new(0),
            exit: NodeId::new(0),
            label_index: HashMap::new(),
            rescuer_of: BTreeMap::new(),
            ensurer_of: BTreeMap::new(),
            regions: Vec::new(),
            global_ensure: None,
        };
        cfg.entry = cfg.insert_block(scope.new_label(), BlockFlags::empty());
        cfg.exit = cfg.insert_block(scope.new_label(), BlockFlags::empty());
        cfg
    }

    /// Returns the name of the scope this graph belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the dummy entry block.
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the dummy exit block.
    #[must_use]
    pub const fn exit(&self) -> NodeId {
        self.exit
    }

    /// Returns `true` for the entry and exit dummies.
    #[must_use]
    pub fn is_dummy(&self, block: NodeId) -> bool {
        block == self.entry || block == self.exit
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, block: NodeId) -> Option<&BasicBlock> {
        self.graph.node(block)
    }

    pub(crate) fn block_mut(&mut self, block: NodeId) -> Option<&mut BasicBlock> {
        self.graph.node_mut(block)
    }

    fn require(&self, block: NodeId) -> Result<&BasicBlock> {
        self.graph
            .node(block)
            .ok_or_else(|| Error::GraphError(format!("{}: no block {block}", self.name)))
    }

    fn require_mut(&mut self, block: NodeId) -> Result<&mut BasicBlock> {
        let name = &self.name;
        self.graph
            .node_mut(block)
            .ok_or_else(|| Error::GraphError(format!("{name}: no block {block}")))
    }

    /// Returns all blocks in id order, dummies included.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.graph.nodes().map(|(_, block)| block)
    }

    /// Returns all block ids in ascending order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<NodeId> {
        self.graph.node_ids().collect()
    }

    /// Returns the number of blocks, dummies included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Looks up the block carrying `label`.
    #[must_use]
    pub fn block_for_label(&self, label: Label) -> Option<NodeId> {
        self.label_index.get(&label).copied()
    }

    fn insert_block(&mut self, label: Label, flags: BlockFlags) -> NodeId {
        let id = NodeId::new(self.graph.node_bound());
        let added = self.graph.add_node(BasicBlock::new(id, label, flags));
        self.label_index.insert(label, added);
        added
    }

    /// Adds an empty block carrying `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if another block already carries `label`.
    pub fn add_block(&mut self, label: Label, flags: BlockFlags) -> Result<NodeId> {
        if self.label_index.contains_key(&label) {
            return Err(Error::DuplicateLabel {
                scope: self.name.clone(),
                label,
            });
        }
        Ok(self.insert_block(label, flags))
    }

    /// Gives `block` a new label and releases its old one.
    pub(crate) fn relabel_block(&mut self, block: NodeId, label: Label) -> Result<()> {
        if self.label_index.get(&label).is_some_and(|&owner| owner != block) {
            return Err(Error::DuplicateLabel {
                scope: self.name.clone(),
                label,
            });
        }
        let old = self.require(block)?.label();
        self.label_index.remove(&old);
        self.require_mut(block)?.set_label(label);
        self.label_index.insert(label, block);
        Ok(())
    }

    /// Adds an empty block with a fresh label from `scope`.
    pub fn new_block(&mut self, scope: &mut Scope) -> NodeId {
        self.insert_block(scope.new_label(), BlockFlags::empty())
    }

    /// Adds an edge unless the identical `(source, target, kind)` edge exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if an endpoint is missing, or
    /// [`Error::Malformed`] if the edge would give `source` a second fall-through
    /// successor or an exit edge would not target the exit block.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeType) -> Result<()> {
        if self.graph.find_edge(source, target, &kind).is_some() {
            return Ok(());
        }
        match kind {
            EdgeType::FallThrough => {
                if let Some(existing) = self.fall_through_successor(source) {
                    return Err(malformed_error!(
                        "{}: {source} already falls through to {existing}, cannot add {target}",
                        self.name
                    ));
                }
            }
            EdgeType::Exit if target != self.exit => {
                return Err(malformed_error!(
                    "{}: exit edge from {source} targets {target}",
                    self.name
                ));
            }
            _ => {}
        }
        self.graph.add_edge(source, target, kind)?;
        Ok(())
    }

    /// Removes the `(source, target, kind)` edge. Returns `true` if it existed.
    pub fn remove_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeType) -> bool {
        match self.graph.find_edge(source, target, &kind) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Removes every outgoing edge of `block` and returns them.
    pub(crate) fn take_outgoing(&mut self, block: NodeId) -> Vec<(NodeId, EdgeType)> {
        let ids: Vec<_> = self
            .graph
            .outgoing_edges(block)
            .map(|(id, target, kind)| (id, target, *kind))
            .collect();
        ids.into_iter()
            .filter_map(|(id, target, kind)| {
                self.graph.remove_edge(id).map(|_| (target, kind))
            })
            .collect()
    }

    /// Returns the outgoing edges of `block` as `(target, kind)` pairs.
    #[must_use]
    pub fn outgoing(&self, block: NodeId) -> Vec<(NodeId, EdgeType)> {
        self.graph
            .outgoing_edges(block)
            .map(|(_, target, kind)| (target, *kind))
            .collect()
    }

    /// Returns the incoming edges of `block` as `(source, kind)` pairs.
    #[must_use]
    pub fn incoming(&self, block: NodeId) -> Vec<(NodeId, EdgeType)> {
        self.graph
            .incoming_edges(block)
            .map(|(_, source, kind)| (source, *kind))
            .collect()
    }

    /// Returns `true` if the `(source, target, kind)` edge exists.
    #[must_use]
    pub fn has_edge(&self, source: NodeId, target: NodeId, kind: EdgeType) -> bool {
        self.graph.find_edge(source, target, &kind).is_some()
    }

    /// Returns the target of the fall-through edge of `block`.
    #[must_use]
    pub fn fall_through_successor(&self, block: NodeId) -> Option<NodeId> {
        self.graph
            .outgoing_edges(block)
            .find(|(_, _, kind)| **kind == EdgeType::FallThrough)
            .map(|(_, target, _)| target)
    }

    /// Returns the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the block that handles exceptions raised in `block`.
    #[must_use]
    pub fn rescuer(&self, block: NodeId) -> Option<NodeId> {
        self.rescuer_of.get(&block).copied()
    }

    /// Returns the ensure block that runs when an exception leaves `block`.
    #[must_use]
    pub fn ensurer(&self, block: NodeId) -> Option<NodeId> {
        self.ensurer_of.get(&block).copied()
    }

    /// Returns the whole rescue map.
    #[must_use]
    pub fn rescue_map(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.rescuer_of
    }

    /// Returns the whole ensure map.
    #[must_use]
    pub fn ensure_map(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.ensurer_of
    }

    pub(crate) fn set_rescuer(&mut self, block: NodeId, rescuer: Option<NodeId>) {
        match rescuer {
            Some(rescuer) => self.rescuer_of.insert(block, rescuer),
            None => self.rescuer_of.remove(&block),
        };
    }

    pub(crate) fn set_ensurer(&mut self, block: NodeId, ensurer: Option<NodeId>) {
        match ensurer {
            Some(ensurer) => self.ensurer_of.insert(block, ensurer),
            None => self.ensurer_of.remove(&block),
        };
    }

    /// Adds exception edges from `block` to its current rescuer and ensurer.
    pub(crate) fn connect_protection(&mut self, block: NodeId) -> Result<()> {
        if let Some(rescuer) = self.rescuer(block) {
            self.add_edge(block, rescuer, EdgeType::Exception)?;
        }
        if let Some(ensurer) = self.ensurer(block) {
            self.add_edge(block, ensurer, EdgeType::Exception)?;
        }
        Ok(())
    }

    /// Returns the global ensure block, if one was added.
    #[must_use]
    pub fn global_ensure_block(&self) -> Option<NodeId> {
        self.global_ensure
    }

    /// Adds a block holding `instrs` that protects every block not yet protected.
    ///
    /// The new block is a rescue entry with an [`EdgeType::Exit`] edge. Every other
    /// block without a rescuer or ensurer, the dummy entry included, gets an
    /// [`EdgeType::Exception`] edge to it and takes it as rescuer. Blocks already
    /// guarded by a region keep their handler. Edges from blocks that cannot raise are
    /// left for [`prune_exception_edges`](Self::prune_exception_edges) to drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the graph already has a global ensure block,
    /// or [`Error::Malformed`] if `instrs` jump anywhere.
    pub fn add_global_ensure_block(
        &mut self,
        scope: &mut Scope,
        instrs: Vec<Instr>,
    ) -> Result<NodeId> {
        if let Some(existing) = self.global_ensure {
            return Err(Error::GraphError(format!(
                "{}: global ensure block already present at {existing}",
                self.name
            )));
        }
        if instrs.iter().any(|instr| !instr.targets().is_empty()) {
            return Err(malformed_error!(
                "{}: global ensure block cannot jump",
                self.name
            ));
        }

        let unprotected: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|&b| b != self.exit && self.rescuer(b).is_none() && self.ensurer(b).is_none())
            .collect();

        let ensure = self.insert_block(scope.new_label(), BlockFlags::RESCUE_ENTRY);
        self.require_mut(ensure)?.instrs_mut().extend(instrs);
        self.add_edge(ensure, self.exit, EdgeType::Exit)?;
        for block in unprotected {
            self.add_edge(block, ensure, EdgeType::Exception)?;
            self.set_rescuer(block, Some(ensure));
        }
        self.global_ensure = Some(ensure);
        Ok(ensure)
    }

    /// Returns the blocks reachable from the entry in post-order.
    #[must_use]
    pub fn postorder(&self) -> Vec<NodeId> {
        algorithms::postorder(self, self.entry)
    }

    /// Returns the blocks reachable from the entry in reverse post-order.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        algorithms::reverse_postorder(self, self.entry)
    }

    /// Returns the outermost exception regions.
    #[must_use]
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    pub(crate) fn regions_mut(&mut self) -> &mut Vec<ExceptionRegion> {
        &mut self.regions
    }

    /// Adds `block` to the exclusive set of the innermost region containing `anchor`.
    pub(crate) fn join_region_of(&mut self, anchor: NodeId, block: NodeId) {
        if let Some(region) = self
            .regions
            .iter_mut()
            .find_map(|r| r.innermost_mut(anchor))
        {
            region.add_block(block);
        }
    }

    /// Splits `block` before instruction `at`.
    ///
    /// Instructions from `at` on move to a new block with a fresh label, which is
    /// returned. The new block takes over every normal outgoing edge, receives copies of
    /// the exception edges, inherits the rescuer and ensurer and joins the same region.
    /// The original block falls through to the new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if `block` does not exist or is a dummy, or
    /// [`Error::Malformed`] if `at` is past the end of the block.
    pub fn split_block(&mut self, scope: &mut Scope, block: NodeId, at: usize) -> Result<NodeId> {
        if self.is_dummy(block) {
            return Err(Error::GraphError(format!(
                "{}: cannot split dummy block {block}",
                self.name
            )));
        }
        let len = self.require(block)?.len();
        if at > len {
            return Err(malformed_error!(
                "{}: split index {at} past end of {block} ({len} instructions)",
                self.name
            ));
        }

        let tail = self.require_mut(block)?.instrs_mut().split_off(at);
        let split = self.new_block(scope);
        if let Some(new) = self.block_mut(split) {
            new.instrs_mut().extend(tail);
        }

        for (target, kind) in self.take_outgoing(block) {
            if kind.is_exceptional() {
                self.add_edge(block, target, kind)?;
            }
            self.add_edge(split, target, kind)?;
        }
        self.add_edge(block, split, EdgeType::FallThrough)?;

        self.set_rescuer(split, self.rescuer(block));
        self.set_ensurer(split, self.ensurer(block));
        self.join_region_of(block, split);
        Ok(split)
    }

    /// Checks whether `b` can be appended to `a`.
    fn can_merge(&self, a: NodeId, b: NodeId) -> bool {
        if a == b || self.is_dummy(a) || self.is_dummy(b) {
            return false;
        }
        let (Some(block_a), Some(block_b)) = (self.block(a), self.block(b)) else {
            return false;
        };
        if block_b.flags().contains(BlockFlags::RESCUE_ENTRY) {
            return false;
        }

        // b is reached from a and only from a, on normal edges.
        let incoming = self.incoming(b);
        if incoming.is_empty()
            || incoming
                .iter()
                .any(|&(source, kind)| source != a || kind.is_exceptional())
        {
            return false;
        }
        // a goes nowhere else on normal edges.
        if self
            .outgoing(a)
            .iter()
            .any(|&(target, kind)| kind.is_normal() && target != b)
        {
            return false;
        }

        let a_effective = match block_a.last() {
            None => 0,
            Some(Instr::Jump(target)) if *target == block_b.label() => block_a.len() - 1,
            Some(last) if last.ends_basic_block() => return false,
            Some(_) => block_a.len(),
        };

        a_effective == 0
            || block_b.is_empty()
            || (self.rescuer(a) == self.rescuer(b) && self.ensurer(a) == self.ensurer(b))
    }

    /// Appends `b` to `a` and deletes `b`.
    ///
    /// The merge is legal only if `b` is the sole normal successor of `a`, `a` is the
    /// sole predecessor of `b`, neither is a dummy or a rescue entry, `a` does not end in
    /// a control transfer other than a jump to `b`, and both are protected the same way
    /// unless one of them is empty. Merging across a protection boundary would change
    /// which handler guards which code.
    ///
    /// A trailing jump from `a` to `b` is dropped. When `a` is empty it takes `b`'s
    /// protection; when `b` is empty its protection is discarded.
    ///
    /// Returns the index within `a` at which `b`'s instructions now start, or `None` if
    /// the merge is not legal (the graph is then unchanged).
    ///
    /// # Errors
    ///
    /// Returns an error only if moving the edges fails, which indicates a corrupted
    /// graph.
    pub fn merge_blocks(&mut self, a: NodeId, b: NodeId) -> Result<Option<usize>> {
        if !self.can_merge(a, b) {
            return Ok(None);
        }

        let b_label = self.require(b)?.label();
        let block_a = self.require_mut(a)?;
        if matches!(block_a.last(), Some(Instr::Jump(target)) if *target == b_label) {
            block_a.instrs_mut().pop();
        }
        let a_empty = block_a.is_empty();
        let offset = block_a.len();

        let b_protection = (self.rescuer(b), self.ensurer(b));
        let b_edges = self.outgoing(b);
        let Some(mut absorbed) = self.graph.remove_node(b) else {
            return Ok(None);
        };
        let b_empty = absorbed.is_empty();
        self.require_mut(a)?.instrs_mut().extend(absorbed.take_instrs());

        if a_empty {
            for (target, kind) in self.take_outgoing(a) {
                if kind.is_normal() && target != b {
                    self.add_edge(a, target, kind)?;
                }
            }
            self.set_rescuer(a, b_protection.0);
            self.set_ensurer(a, b_protection.1);
            // a moves into b's region below.
            for region in &mut self.regions {
                region.release_block(a);
            }
        }
        for (target, kind) in b_edges {
            if kind.is_exceptional() && b_empty && !a_empty {
                continue;
            }
            let target = if target == b { a } else { target };
            self.add_edge(a, target, kind)?;
        }

        self.forget_block(b, absorbed.label(), Some(a));
        Ok(Some(offset))
    }

    /// Drops index, map and region references to a block that left the arena.
    fn forget_block(&mut self, block: NodeId, label: Label, replacement: Option<NodeId>) {
        if self.label_index.get(&label) == Some(&block) {
            self.label_index.remove(&label);
        }
        self.rescuer_of.remove(&block);
        self.ensurer_of.remove(&block);
        if self.global_ensure == Some(block) {
            self.global_ensure = replacement;
        }
        for map in [&mut self.rescuer_of, &mut self.ensurer_of] {
            map.retain(|_, handler| *handler != block || replacement.is_some());
            if let Some(new) = replacement {
                for handler in map.values_mut() {
                    if *handler == block {
                        *handler = new;
                    }
                }
            }
        }
        for region in &mut self.regions {
            match replacement {
                Some(new) => region.replace_block(block, new),
                None => region.remove_block(block),
            }
        }
    }

    /// Deletes a block together with its edges and every reference to it.
    ///
    /// The dummies cannot be removed.
    pub fn remove_block(&mut self, block: NodeId) -> Option<BasicBlock> {
        if self.is_dummy(block) {
            return None;
        }
        let removed = self.graph.remove_node(block)?;
        self.forget_block(block, removed.label(), None);
        Some(removed)
    }

    /// Removes exception edges (and the matching protection entries) from blocks that
    /// contain no raising instruction. Returns the number of edges removed.
    pub fn prune_exception_edges(&mut self) -> usize {
        let mut pruned = 0;
        for id in self.block_ids() {
            if self.block(id).is_some_and(BasicBlock::can_raise) {
                continue;
            }
            for (target, kind) in self.outgoing(id) {
                if kind.is_exceptional() && self.remove_edge(id, target, kind) {
                    pruned += 1;
                }
            }
            self.rescuer_of.remove(&id);
            self.ensurer_of.remove(&id);
        }
        pruned
    }

    /// Returns the blocks that cannot be reached from the entry, in id order.
    #[must_use]
    pub fn unreachable_blocks(&self) -> Vec<NodeId> {
        let reachable = algorithms::reachable(self, self.entry);
        self.graph
            .node_ids()
            .filter(|id| !reachable.contains(id.index()))
            .collect()
    }

    /// Deletes every block unreachable from the entry and returns their ids.
    ///
    /// Removal can disconnect further blocks (a handler only reached from dead code),
    /// so this repeats until nothing changes.
    pub fn remove_unreachable_blocks(&mut self) -> Vec<NodeId> {
        let mut removed = Vec::new();
        loop {
            let dead: Vec<NodeId> = self
                .unreachable_blocks()
                .into_iter()
                .filter(|&id| id != self.exit)
                .collect();
            if dead.is_empty() {
                return removed;
            }
            for id in dead {
                if self.remove_block(id).is_some() {
                    removed.push(id);
                }
            }
        }
    }

    /// Clears the live flag of every unreachable block and returns their ids.
    ///
    /// Dead blocks stay in the arena but are ignored by validation and linearization.
    pub fn mark_unreachable_dead(&mut self) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .unreachable_blocks()
            .into_iter()
            .filter(|&id| id != self.exit)
            .collect();
        for &id in &dead {
            if let Some(block) = self.block_mut(id) {
                block.remove_flags(BlockFlags::LIVE);
            }
        }
        dead
    }

    /// Merges every legal straight-line pair until none is left.
    ///
    /// Returns the `(absorber, absorbed)` pairs in the order the merges happened.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`merge_blocks`](Self::merge_blocks).
    pub fn collapse_straight_line(&mut self) -> Result<Vec<(NodeId, NodeId)>> {
        let mut merged = Vec::new();
        loop {
            let mut changed = false;
            for a in self.block_ids() {
                if !self.graph.contains_node(a) {
                    continue;
                }
                let normal: Vec<NodeId> = self
                    .outgoing(a)
                    .into_iter()
                    .filter(|(_, kind)| kind.is_normal())
                    .map(|(target, _)| target)
                    .collect();
                let [b] = normal[..] else {
                    continue;
                };
                if self.merge_blocks(a, b)?.is_some() {
                    merged.push((a, b));
                    changed = true;
                }
            }
            if !changed {
                return Ok(merged);
            }
        }
    }

    /// Checks every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        if self.block(self.entry).is_none() || self.block(self.exit).is_none() {
            return Err(malformed_error!("{name}: missing entry or exit block"));
        }
        if self.outgoing(self.exit).iter().any(|(_, kind)| kind.is_normal()) {
            return Err(malformed_error!("{name}: exit block has successors"));
        }

        let reachable = algorithms::reachable(self, self.entry);
        for block in self.blocks() {
            let id = block.id();
            if self.block_for_label(block.label()) != Some(id) {
                return Err(malformed_error!(
                    "{name}: label {} of {id} is not indexed",
                    block.label()
                ));
            }
            if block.is_live() && !reachable.contains(id.index()) {
                return Err(malformed_error!("{name}: {id} is unreachable from entry"));
            }

            let outgoing = self.outgoing(id);
            let falls = outgoing
                .iter()
                .filter(|(_, kind)| *kind == EdgeType::FallThrough)
                .count();
            if falls > 1 {
                return Err(malformed_error!("{name}: {id} has {falls} fall-through edges"));
            }
            for (target, kind) in &outgoing {
                if self.block(*target).is_none() {
                    return Err(malformed_error!("{name}: edge {id} -> {target} dangles"));
                }
                if *kind == EdgeType::Exit && *target != self.exit {
                    return Err(malformed_error!(
                        "{name}: exit edge {id} -> {target} misses the exit block"
                    ));
                }
            }

            if let Some(last) = block.last() {
                for target in last.targets() {
                    let resolved = self.block_for_label(target).ok_or_else(|| {
                        malformed_error!("{name}: {id} jumps to unknown label {target}")
                    })?;
                    if !self.has_edge(id, resolved, EdgeType::Branch) {
                        return Err(malformed_error!(
                            "{name}: {id} jumps to {target} without a branch edge"
                        ));
                    }
                }
            }
            if block
                .instrs()
                .iter()
                .rev()
                .skip(1)
                .any(Instr::ends_basic_block)
            {
                return Err(malformed_error!(
                    "{name}: {id} has a control transfer before its last instruction"
                ));
            }
        }

        for (block, handler) in self.rescuer_of.iter().chain(self.ensurer_of.iter()) {
            if self.block(*block).is_none() || self.block(*handler).is_none() {
                return Err(malformed_error!(
                    "{name}: protection entry {block} -> {handler} dangles"
                ));
            }
        }
        Ok(())
    }

    /// Returns the number of instructions in live blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks()
            .filter(|b| b.is_live())
            .map(BasicBlock::len)
            .sum()
    }

    /// Returns the position of every instruction matching `pred`, in block id order.
    pub fn find_instrs(&self, mut pred: impl FnMut(&Instr) -> bool) -> Vec<(NodeId, usize)> {
        let mut found = Vec::new();
        for block in self.blocks().filter(|b| b.is_live()) {
            for (idx, instr) in block.instrs().iter().enumerate() {
                if pred(instr) {
                    found.push((block.id(), idx));
                }
            }
        }
        found
    }

    /// Returns the positions of yields to the block passed to this scope.
    #[must_use]
    pub fn yield_sites(&self) -> Vec<(NodeId, usize)> {
        self.find_instrs(|instr| matches!(instr, Instr::Yield { closure: None, .. }))
    }

    /// Returns the positions of all calls.
    #[must_use]
    pub fn call_sites(&self) -> Vec<(NodeId, usize)> {
        self.find_instrs(|instr| matches!(instr, Instr::Call { .. }))
    }

    /// Returns `true` if any instruction mentions a closure literal.
    #[must_use]
    pub fn defines_closures(&self) -> bool {
        !self
            .find_instrs(|instr| !instr.closures().is_empty())
            .is_empty()
    }

    /// Returns `true` if the scope binds its block as a value.
    #[must_use]
    pub fn captures_block(&self) -> bool {
        !self
            .find_instrs(|instr| matches!(instr, Instr::ReceiveClosure(_)))
            .is_empty()
    }

    /// Generates a DOT (Graphviz) representation of the graph.
    ///
    /// The entry block is filled green, the exit block red, rescue entries yellow.
    /// Edges are colored by [`EdgeType`].
    ///
    /// # Arguments
    ///
    /// * `title` - Optional graph label, defaults to the scope name
    ///
    /// # Examples
    ///
    /// ```rust
    /// use irflow::{ir::{InstrBuilder, Scope}, CompilerConfig, ControlFlowGraph};
    ///
    /// let mut scope = Scope::new("one");
    /// let instrs = InstrBuilder::new().ret(1i64).build();
    /// let cfg = ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default())?;
    /// let dot = cfg.to_dot(None);
    /// assert!(dot.starts_with("digraph CFG {"));
    /// assert!(dot.contains("return 1"));
    /// # Ok::<(), irflow::Error>(())
    /// ```
    #[must_use]
    pub fn to_dot(&self, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph CFG {\n");
        let _ = writeln!(
            dot,
            "    label=\"CFG: {}\";",
            escape_dot(title.unwrap_or(&self.name))
        );
        dot.push_str("    labelloc=t;\n");
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");
        dot.push_str("    edge [fontname=\"Courier\", fontsize=9];\n\n");

        for block in self.blocks() {
            let id = block.id();
            let mut label = format!("{id} [{}]", block.label());
            if id == self.entry {
                label.push_str(" (entry)");
            } else if id == self.exit {
                label.push_str(" (exit)");
            }
            label.push_str("\\l");
            for instr in block.instrs() {
                label.push_str(&escape_dot(&instr.to_string()));
                label.push_str("\\l");
            }

            let style = if id == self.entry {
                ", style=filled, fillcolor=lightgreen"
            } else if id == self.exit {
                ", style=filled, fillcolor=lightcoral"
            } else if block.flags().contains(BlockFlags::RESCUE_ENTRY) {
                ", style=filled, fillcolor=lightyellow"
            } else if !block.is_live() {
                ", style=dashed"
            } else {
                ""
            };
            let _ = writeln!(dot, "    {id} [label=\"{label}\"{style}];");
        }

        dot.push('\n');

        for (_, source, target, kind) in self.graph.edges() {
            let _ = writeln!(
                dot,
                "    {source} -> {target} [label=\"{kind}\", {}];",
                kind.dot_style()
            );
        }

        dot.push_str("}\n");
        dot
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cfg {} (entry {}, exit {})",
            self.name, self.entry, self.exit
        )?;
        for block in self.blocks() {
            write!(f, "{block}")?;
            let outgoing = self.outgoing(block.id());
            if !outgoing.is_empty() {
                f.write_str("    =>")?;
                for (idx, (target, kind)) in outgoing.iter().enumerate() {
                    let sep = if idx == 0 { " " } else { ", " };
                    write!(f, "{sep}{target} {kind}")?;
                }
                f.write_str("\n")?;
            }
        }
        for (title, map) in [("rescue", &self.rescuer_of), ("ensure", &self.ensurer_of)] {
            if map.is_empty() {
                continue;
            }
            writeln!(f, "{title}:")?;
            for (block, handler) in map {
                writeln!(f, "    {block} -> {handler}")?;
            }
        }
        Ok(())
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_bound(&self) -> usize {
        self.graph.node_bound()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_ids()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}
