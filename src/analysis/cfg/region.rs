//! Exception regions.
//!
//! A region is the set of blocks protected by one `RegionStart`/`RegionEnd` pair. Regions
//! nest, so each graph holds a forest of them. Only blocks created while the region was
//! the innermost open one are in its exclusive set; blocks of nested regions belong to
//! the nested region.
//!
//! The rescuer and ensurer maps on the graph are the fast path for "who protects block
//! B"; the region forest keeps the topology so it can be cloned into another graph
//! during inlining and kept in sync when blocks merge or disappear.

use crate::{ir::Label, utils::graph::NodeId};

/// A protected region and its nested regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    first_rescue: Label,
    ensure: Option<Label>,
    start_block: Option<NodeId>,
    end_block: Option<NodeId>,
    exclusive: Vec<NodeId>,
    nested: Vec<ExceptionRegion>,
    rescue_block: Option<NodeId>,
    ensure_block: Option<NodeId>,
}

impl ExceptionRegion {
    /// Creates an empty region handled by `first_rescue` (and `ensure`).
    #[must_use]
    pub fn new(first_rescue: Label, ensure: Option<Label>) -> Self {
        ExceptionRegion {
            first_rescue,
            ensure,
            start_block: None,
            end_block: None,
            exclusive: Vec::new(),
            nested: Vec::new(),
            rescue_block: None,
            ensure_block: None,
        }
    }

    /// Label of the first rescue block.
    #[must_use]
    pub fn first_rescue(&self) -> Label {
        self.first_rescue
    }

    /// Label of the ensure block, if any.
    #[must_use]
    pub fn ensure(&self) -> Option<Label> {
        self.ensure
    }

    /// First block of the region in creation order.
    #[must_use]
    pub fn start_block(&self) -> Option<NodeId> {
        self.start_block
    }

    /// Last block of the region in creation order.
    #[must_use]
    pub fn end_block(&self) -> Option<NodeId> {
        self.end_block
    }

    /// Blocks protected directly by this region.
    #[must_use]
    pub fn exclusive_blocks(&self) -> &[NodeId] {
        &self.exclusive
    }

    /// Regions opened while this one was innermost.
    #[must_use]
    pub fn nested(&self) -> &[ExceptionRegion] {
        &self.nested
    }

    /// Resolved rescue block.
    #[must_use]
    pub fn rescue_block(&self) -> Option<NodeId> {
        self.rescue_block
    }

    /// Resolved ensure block.
    #[must_use]
    pub fn ensure_block(&self) -> Option<NodeId> {
        self.ensure_block
    }

    pub(crate) fn set_handlers(&mut self, rescue: NodeId, ensure: Option<NodeId>) {
        self.rescue_block = Some(rescue);
        self.ensure_block = ensure;
    }

    pub(crate) fn nested_mut(&mut self) -> &mut Vec<ExceptionRegion> {
        &mut self.nested
    }

    /// Adds a block to the exclusive set.
    pub(crate) fn add_block(&mut self, block: NodeId) {
        if self.exclusive.contains(&block) {
            return;
        }
        if self.start_block.is_none() {
            self.start_block = Some(block);
        }
        self.end_block = Some(block);
        self.exclusive.push(block);
    }

    pub(crate) fn add_nested(&mut self, region: ExceptionRegion) {
        self.nested.push(region);
    }

    /// Returns `true` if `block` is protected by this region or a nested one.
    #[must_use]
    pub fn contains(&self, block: NodeId) -> bool {
        self.exclusive.contains(&block) || self.nested.iter().any(|r| r.contains(block))
    }

    /// Returns every block of this region and its nested regions, outer first.
    #[must_use]
    pub fn all_blocks(&self) -> Vec<NodeId> {
        let mut blocks = self.exclusive.clone();
        for nested in &self.nested {
            blocks.extend(nested.all_blocks());
        }
        blocks
    }

    /// Finds the innermost region (this one or a nested one) whose exclusive set
    /// contains `block`.
    pub(crate) fn innermost_mut(&mut self, block: NodeId) -> Option<&mut ExceptionRegion> {
        if self.exclusive.contains(&block) {
            return Some(self);
        }
        self.nested.iter_mut().find_map(|r| r.innermost_mut(block))
    }

    /// Rewrites references to `old` so they point at `new`. Used when `old` is
    /// absorbed by a merge.
    pub(crate) fn replace_block(&mut self, old: NodeId, new: NodeId) {
        if let Some(pos) = self.exclusive.iter().position(|&b| b == old) {
            if self.exclusive.contains(&new) {
                self.exclusive.remove(pos);
            } else {
                self.exclusive[pos] = new;
            }
        }
        for slot in [
            &mut self.start_block,
            &mut self.end_block,
            &mut self.rescue_block,
            &mut self.ensure_block,
        ] {
            if *slot == Some(old) {
                *slot = Some(new);
            }
        }
        for nested in &mut self.nested {
            nested.replace_block(old, new);
        }
    }

    /// Drops `block` from every exclusive set, keeping handler references.
    pub(crate) fn release_block(&mut self, block: NodeId) {
        if self.exclusive.contains(&block) {
            self.exclusive.retain(|&b| b != block);
            self.start_block = self.exclusive.first().copied();
            self.end_block = self.exclusive.last().copied();
        }
        for nested in &mut self.nested {
            nested.release_block(block);
        }
    }

    /// Forgets every reference to `block`.
    pub(crate) fn remove_block(&mut self, block: NodeId) {
        self.exclusive.retain(|&b| b != block);
        self.start_block = self.exclusive.first().copied();
        self.end_block = self.exclusive.last().copied();
        if self.rescue_block == Some(block) {
            self.rescue_block = None;
        }
        if self.ensure_block == Some(block) {
            self.ensure_block = None;
        }
        for nested in &mut self.nested {
            nested.remove_block(block);
        }
    }

    /// Copies the region tree into another graph.
    ///
    /// Labels go through `label` and blocks through `block`; blocks without a
    /// counterpart are dropped. Nesting is preserved exactly.
    pub fn clone_with(
        &self,
        label: &mut impl FnMut(Label) -> Label,
        block: &impl Fn(NodeId) -> Option<NodeId>,
    ) -> ExceptionRegion {
        let exclusive: Vec<NodeId> = self.exclusive.iter().filter_map(|&b| block(b)).collect();
        ExceptionRegion {
            first_rescue: label(self.first_rescue),
            ensure: self.ensure.map(&mut *label),
            start_block: exclusive.first().copied(),
            end_block: exclusive.last().copied(),
            rescue_block: self.rescue_block.and_then(block),
            ensure_block: self.ensure_block.and_then(block),
            nested: self
                .nested
                .iter()
                .map(|nested| nested.clone_with(label, block))
                .collect(),
            exclusive,
        }
    }
}
