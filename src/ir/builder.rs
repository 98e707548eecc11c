//! Fluent construction of instruction lists.

use crate::ir::{Instr, Label, Operand, Variable};

/// Fluent builder for a linear instruction list, as produced by lowering.
///
/// # Examples
///
/// ```rust
/// use irflow::ir::{Instr, InstrBuilder, Operand, Scope, Variable};
///
/// let mut scope = Scope::new("max");
/// let done = scope.new_label();
/// let a = Variable::local("a");
/// let b = Variable::local("b");
///
/// let instrs = InstrBuilder::new()
///     .receive_arg(a.clone(), 0)
///     .receive_arg(b.clone(), 1)
///     .branch(a.clone(), done)
///     .ret(b)
///     .label(done)
///     .ret(a)
///     .build();
///
/// assert_eq!(instrs.len(), 6);
/// assert!(matches!(instrs[4], Instr::Label(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InstrBuilder {
    instrs: Vec<Instr>,
}

impl InstrBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arbitrary instruction.
    #[must_use]
    pub fn push(mut self, instr: Instr) -> Self {
        self.instrs.push(instr);
        self
    }

    /// `label:`
    #[must_use]
    pub fn label(self, label: Label) -> Self {
        self.push(Instr::Label(label))
    }

    /// `dst = src`
    #[must_use]
    pub fn copy(self, dst: Variable, src: impl Into<Operand>) -> Self {
        self.push(Instr::Copy {
            dst,
            src: src.into(),
        })
    }

    /// A non-raising opaque operation.
    #[must_use]
    pub fn op(self, dst: impl Into<Option<Variable>>, name: &str, args: Vec<Operand>) -> Self {
        self.push(Instr::Op {
            dst: dst.into(),
            name: name.to_string(),
            args,
            raises: false,
        })
    }

    /// An opaque operation that may raise.
    #[must_use]
    pub fn raising_op(
        self,
        dst: impl Into<Option<Variable>>,
        name: &str,
        args: Vec<Operand>,
    ) -> Self {
        self.push(Instr::Op {
            dst: dst.into(),
            name: name.to_string(),
            args,
            raises: true,
        })
    }

    /// A call without a block argument.
    #[must_use]
    pub fn call(
        self,
        dst: impl Into<Option<Variable>>,
        receiver: impl Into<Operand>,
        method: &str,
        args: Vec<Operand>,
    ) -> Self {
        self.push(Instr::Call {
            dst: dst.into(),
            receiver: receiver.into(),
            method: method.to_string(),
            args,
            closure: None,
        })
    }

    /// A call passing `closure` as the block argument.
    #[must_use]
    pub fn call_with_closure(
        self,
        dst: impl Into<Option<Variable>>,
        receiver: impl Into<Operand>,
        method: &str,
        args: Vec<Operand>,
        closure: impl Into<Operand>,
    ) -> Self {
        self.push(Instr::Call {
            dst: dst.into(),
            receiver: receiver.into(),
            method: method.to_string(),
            args,
            closure: Some(closure.into()),
        })
    }

    /// Yields to the block passed to the current scope.
    #[must_use]
    pub fn yield_block(self, dst: impl Into<Option<Variable>>, args: Vec<Operand>) -> Self {
        self.push(Instr::Yield {
            dst: dst.into(),
            closure: None,
            args,
        })
    }

    /// Yields to an explicit closure.
    #[must_use]
    pub fn yield_to(
        self,
        dst: impl Into<Option<Variable>>,
        closure: impl Into<Operand>,
        args: Vec<Operand>,
    ) -> Self {
        self.push(Instr::Yield {
            dst: dst.into(),
            closure: Some(closure.into()),
            args,
        })
    }

    /// Conditional branch to `target`.
    #[must_use]
    pub fn branch(self, cond: impl Into<Operand>, target: Label) -> Self {
        self.push(Instr::Branch {
            cond: cond.into(),
            target,
        })
    }

    /// Unconditional jump.
    #[must_use]
    pub fn jump(self, target: Label) -> Self {
        self.push(Instr::Jump(target))
    }

    /// Multi-way dispatch.
    #[must_use]
    pub fn case(
        self,
        value: impl Into<Operand>,
        arms: Vec<(Operand, Label)>,
        default: Label,
    ) -> Self {
        self.push(Instr::Case {
            value: value.into(),
            arms,
            default,
        })
    }

    /// `return value`
    #[must_use]
    pub fn ret(self, value: impl Into<Operand>) -> Self {
        self.push(Instr::Return(value.into()))
    }

    /// `closure_return value`
    #[must_use]
    pub fn closure_return(self, value: impl Into<Operand>) -> Self {
        self.push(Instr::ClosureReturn(value.into()))
    }

    /// `break value`
    #[must_use]
    pub fn brk(self, value: impl Into<Operand>) -> Self {
        self.push(Instr::Break(value.into()))
    }

    /// `throw value`
    #[must_use]
    pub fn throw(self, value: impl Into<Operand>) -> Self {
        self.push(Instr::Throw(value.into()))
    }

    /// Binds `%self`.
    #[must_use]
    pub fn receive_self(self) -> Self {
        self.push(Instr::ReceiveSelf(Variable::self_var()))
    }

    /// Binds argument `index` to `dst`.
    #[must_use]
    pub fn receive_arg(self, dst: Variable, index: usize) -> Self {
        self.push(Instr::ReceiveArg { dst, index })
    }

    /// Binds the passed block to `dst`.
    #[must_use]
    pub fn receive_closure(self, dst: Variable) -> Self {
        self.push(Instr::ReceiveClosure(dst))
    }

    /// Opens a protected region.
    #[must_use]
    pub fn region_start(self, rescue: Label, ensure: Option<Label>) -> Self {
        self.push(Instr::RegionStart { rescue, ensure })
    }

    /// Closes the innermost protected region.
    #[must_use]
    pub fn region_end(self) -> Self {
        self.push(Instr::RegionEnd)
    }

    /// Returns the number of instructions appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Finishes the list.
    #[must_use]
    pub fn build(self) -> Vec<Instr> {
        self.instrs
    }
}
