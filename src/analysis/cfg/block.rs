//! Basic blocks.

use std::fmt;

use bitflags::bitflags;

use crate::{
    ir::{Instr, Label},
    utils::graph::NodeId,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Per-block attributes
    pub struct BlockFlags: u8 {
        /// Block takes part in linearization
        const LIVE = 0x01;
        /// Block is the first rescue block of some exception region
        const RESCUE_ENTRY = 0x02;
        /// Block's label appeared in the input instruction list
        const SOURCE_LABEL = 0x04;
    }
}

/// A maximal straight-line run of instructions.
///
/// Only the last instruction may transfer control. Label markers are not stored: the
/// block's own [`label`](Self::label) stands for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: NodeId,
    label: Label,
    instrs: Vec<Instr>,
    flags: BlockFlags,
}

impl BasicBlock {
    pub(crate) fn new(id: NodeId, label: Label, flags: BlockFlags) -> Self {
        BasicBlock {
            id,
            label,
            instrs: Vec::new(),
            flags: flags | BlockFlags::LIVE,
        }
    }

    /// Returns the block id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the label jumps use to reach this block.
    #[must_use]
    pub fn label(&self) -> Label {
        self.label
    }

    pub(crate) fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    /// Returns the instructions in order.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub(crate) fn instrs_mut(&mut self) -> &mut Vec<Instr> {
        &mut self.instrs
    }

    pub(crate) fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Returns the last instruction.
    #[must_use]
    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last()
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Returns the block's flags.
    #[must_use]
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub(crate) fn insert_flags(&mut self, flags: BlockFlags) {
        self.flags.insert(flags);
    }

    pub(crate) fn remove_flags(&mut self, flags: BlockFlags) {
        self.flags.remove(flags);
    }

    /// Returns `true` if the block takes part in linearization.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.flags.contains(BlockFlags::LIVE)
    }

    /// Returns `true` if any instruction in the block may raise.
    #[must_use]
    pub fn can_raise(&self) -> bool {
        self.instrs.iter().any(Instr::can_raise)
    }

    /// Returns `true` if the last instruction never continues to the next one.
    #[must_use]
    pub fn ends_in_transfer(&self) -> bool {
        self.last().is_some_and(Instr::transfers_control)
    }

    /// Returns `true` if the last instruction leaves the scope normally.
    #[must_use]
    pub fn ends_in_return(&self) -> bool {
        self.last().is_some_and(Instr::is_return)
    }

    pub(crate) fn take_instrs(&mut self) -> Vec<Instr> {
        std::mem::take(&mut self.instrs)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.label)?;
        if self.flags.contains(BlockFlags::RESCUE_ENTRY) {
            f.write_str(" rescue")?;
        }
        if !self.is_live() {
            f.write_str(" dead")?;
        }
        f.write_str(":\n")?;
        for instr in &self.instrs {
            writeln!(f, "    {instr}")?;
        }
        Ok(())
    }
}
