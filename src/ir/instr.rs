//! Instructions and their control flow classification.
//!
//! The instruction set is deliberately small. It carries exactly what graph
//! construction, inlining and linearization need to know: where control goes, what can
//! raise, which labels and variables are mentioned, and which instructions bind the
//! incoming receiver, arguments and closure of a scope.

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::ir::{ClosureId, Label, Operand, Variable};

/// The kind of an [`Instr`], without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum Operation {
    /// Label marker.
    Label,
    /// Plain copy.
    Copy,
    /// Opaque computation.
    Op,
    /// Method call.
    Call,
    /// Invoke the block passed to the current scope.
    Yield,
    /// Conditional branch.
    Branch,
    /// Unconditional jump.
    Jump,
    /// Multi-way dispatch.
    Case,
    /// Return from the method.
    Return,
    /// Return from a closure body to its yielder.
    ClosureReturn,
    /// Break out of a closure to the caller of the yielding method.
    Break,
    /// Raise an exception.
    Throw,
    /// Bind `%self`.
    ReceiveSelf,
    /// Bind a positional argument.
    ReceiveArg,
    /// Bind the passed block as a value.
    ReceiveClosure,
    /// Open a protected region.
    RegionStart,
    /// Close the innermost protected region.
    RegionEnd,
}

impl Operation {
    /// Returns `true` if control never continues with the next instruction.
    #[must_use]
    pub const fn transfers_control(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::Case
                | Self::Return
                | Self::ClosureReturn
                | Self::Break
                | Self::Throw
        )
    }

    /// Returns `true` if the instruction must be the last one of its basic block.
    #[must_use]
    pub const fn ends_basic_block(self) -> bool {
        matches!(self, Self::Branch) || self.transfers_control()
    }

    /// Returns `true` if the instruction leaves the current scope through its exit
    /// block on the normal path.
    #[must_use]
    pub const fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ClosureReturn | Self::Break)
    }

    /// Returns the lowercase mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Copy => "copy",
            Self::Op => "op",
            Self::Call => "call",
            Self::Yield => "yield",
            Self::Branch => "branch",
            Self::Jump => "jump",
            Self::Case => "case",
            Self::Return => "return",
            Self::ClosureReturn => "closure_return",
            Self::Break => "break",
            Self::Throw => "throw",
            Self::ReceiveSelf => "recv_self",
            Self::ReceiveArg => "recv_arg",
            Self::ReceiveClosure => "recv_closure",
            Self::RegionStart => "region_start",
            Self::RegionEnd => "region_end",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Marks the start of the code reached through `label`.
    Label(Label),
    /// `dst = src`
    Copy {
        /// Destination.
        dst: Variable,
        /// Source.
        src: Operand,
    },
    /// An operation whose runtime meaning is opaque to the compiler.
    Op {
        /// Optional result slot.
        dst: Option<Variable>,
        /// Operation name, used only for dumps.
        name: String,
        /// Inputs.
        args: Vec<Operand>,
        /// Whether the operation may raise.
        raises: bool,
    },
    /// `dst = receiver.method(args) &closure`
    Call {
        /// Optional result slot.
        dst: Option<Variable>,
        /// Receiver.
        receiver: Operand,
        /// Called method name.
        method: String,
        /// Positional arguments.
        args: Vec<Operand>,
        /// Block argument, literal or dynamic.
        closure: Option<Operand>,
    },
    /// `dst = yield(args)`
    ///
    /// With `closure: None` the block passed to the current scope is invoked. An
    /// explicit closure operand names the block directly; inlining produces those.
    Yield {
        /// Optional result slot.
        dst: Option<Variable>,
        /// Explicit block to invoke.
        closure: Option<Operand>,
        /// Arguments passed to the block.
        args: Vec<Operand>,
    },
    /// Jumps to `target` when `cond` is truthy, otherwise falls through.
    Branch {
        /// Condition.
        cond: Operand,
        /// Taken target.
        target: Label,
    },
    /// Unconditional jump.
    Jump(Label),
    /// Jumps to the label of the first arm whose value matches, or to `default`.
    Case {
        /// Scrutinee.
        value: Operand,
        /// `(when, target)` arms in order.
        arms: Vec<(Operand, Label)>,
        /// Target when no arm matches.
        default: Label,
    },
    /// Returns a value from the method.
    Return(Operand),
    /// Returns a value from a closure body to the yield that invoked it.
    ClosureReturn(Operand),
    /// Breaks out of a closure.
    Break(Operand),
    /// Raises an exception.
    Throw(Operand),
    /// Binds the receiver of the current invocation.
    ReceiveSelf(Variable),
    /// Binds positional argument `index`.
    ReceiveArg {
        /// Destination.
        dst: Variable,
        /// Zero-based argument position.
        index: usize,
    },
    /// Binds the block passed to the current invocation.
    ReceiveClosure(Variable),
    /// Opens a protected region whose exceptions go to `rescue` (and, if present,
    /// through `ensure`).
    RegionStart {
        /// First rescue block.
        rescue: Label,
        /// Ensure block.
        ensure: Option<Label>,
    },
    /// Closes the innermost open region.
    RegionEnd,
}

impl Instr {
    /// Returns the operation kind.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Instr::Label(_) => Operation::Label,
            Instr::Copy { .. } => Operation::Copy,
            Instr::Op { .. } => Operation::Op,
            Instr::Call { .. } => Operation::Call,
            Instr::Yield { .. } => Operation::Yield,
            Instr::Branch { .. } => Operation::Branch,
            Instr::Jump(_) => Operation::Jump,
            Instr::Case { .. } => Operation::Case,
            Instr::Return(_) => Operation::Return,
            Instr::ClosureReturn(_) => Operation::ClosureReturn,
            Instr::Break(_) => Operation::Break,
            Instr::Throw(_) => Operation::Throw,
            Instr::ReceiveSelf(_) => Operation::ReceiveSelf,
            Instr::ReceiveArg { .. } => Operation::ReceiveArg,
            Instr::ReceiveClosure(_) => Operation::ReceiveClosure,
            Instr::RegionStart { .. } => Operation::RegionStart,
            Instr::RegionEnd => Operation::RegionEnd,
        }
    }

    /// See [`Operation::ends_basic_block`].
    #[must_use]
    pub fn ends_basic_block(&self) -> bool {
        self.operation().ends_basic_block()
    }

    /// See [`Operation::transfers_control`].
    #[must_use]
    pub fn transfers_control(&self) -> bool {
        self.operation().transfers_control()
    }

    /// See [`Operation::is_return`].
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.operation().is_return()
    }

    /// Returns `true` if executing the instruction may raise an exception.
    #[must_use]
    pub fn can_raise(&self) -> bool {
        match self {
            Instr::Op { raises, .. } => *raises,
            Instr::Call { .. } | Instr::Yield { .. } | Instr::Throw(_) | Instr::Break(_) => true,
            _ => false,
        }
    }

    /// Returns the labels this instruction may jump to, in operand order.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instr::Branch { target, .. } | Instr::Jump(target) => vec![*target],
            Instr::Case { arms, default, .. } => arms
                .iter()
                .map(|(_, label)| *label)
                .chain(std::iter::once(*default))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the target if this is an unconditional jump.
    #[must_use]
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instr::Jump(target) => Some(*target),
            _ => None,
        }
    }

    /// Returns the closure literals mentioned by this instruction.
    #[must_use]
    pub fn closures(&self) -> Vec<ClosureId> {
        let mut found = Vec::new();
        self.for_each_operand(|op| {
            if let Some(id) = op.as_closure() {
                found.push(id);
            }
        });
        found
    }

    /// Returns the variable written by this instruction, if any.
    #[must_use]
    pub fn result(&self) -> Option<&Variable> {
        match self {
            Instr::Copy { dst, .. }
            | Instr::ReceiveSelf(dst)
            | Instr::ReceiveArg { dst, .. }
            | Instr::ReceiveClosure(dst) => Some(dst),
            Instr::Op { dst, .. } | Instr::Call { dst, .. } | Instr::Yield { dst, .. } => {
                dst.as_ref()
            }
            _ => None,
        }
    }

    /// Calls `f` on every operand read by this instruction.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Instr::Copy { src, .. } => f(src),
            Instr::Op { args, .. } => args.iter().for_each(f),
            Instr::Call {
                receiver,
                args,
                closure,
                ..
            } => {
                f(receiver);
                args.iter().for_each(&mut f);
                if let Some(closure) = closure {
                    f(closure);
                }
            }
            Instr::Yield { closure, args, .. } => {
                if let Some(closure) = closure {
                    f(closure);
                }
                args.iter().for_each(f);
            }
            Instr::Branch { cond, .. } => f(cond),
            Instr::Case { value, arms, .. } => {
                f(value);
                for (when, _) in arms {
                    f(when);
                }
            }
            Instr::Return(v) | Instr::ClosureReturn(v) | Instr::Break(v) | Instr::Throw(v) => {
                f(v);
            }
            Instr::Label(_)
            | Instr::Jump(_)
            | Instr::ReceiveSelf(_)
            | Instr::ReceiveArg { .. }
            | Instr::ReceiveClosure(_)
            | Instr::RegionStart { .. }
            | Instr::RegionEnd => {}
        }
    }

    /// Calls `f` on every label mentioned by this instruction, markers included.
    pub fn for_each_label_mut(&mut self, mut f: impl FnMut(&mut Label)) {
        match self {
            Instr::Label(label) | Instr::Jump(label) | Instr::Branch { target: label, .. } => {
                f(label);
            }
            Instr::Case { arms, default, .. } => {
                for (_, label) in arms {
                    f(label);
                }
                f(default);
            }
            Instr::RegionStart { rescue, ensure } => {
                f(rescue);
                if let Some(ensure) = ensure {
                    f(ensure);
                }
            }
            _ => {}
        }
    }

    /// Calls `f` on every variable read or written by this instruction.
    ///
    /// Reads are visited before the written variable.
    pub fn for_each_variable_mut(&mut self, mut f: impl FnMut(&mut Variable)) {
        fn read(op: &mut Operand, f: &mut impl FnMut(&mut Variable)) {
            if let Operand::Var(var) = op {
                f(var);
            }
        }

        match self {
            Instr::Copy { dst, src } => {
                read(src, &mut f);
                f(dst);
            }
            Instr::Op { dst, args, .. } => {
                args.iter_mut().for_each(|op| read(op, &mut f));
                if let Some(dst) = dst {
                    f(dst);
                }
            }
            Instr::Call {
                dst,
                receiver,
                args,
                closure,
                ..
            } => {
                read(receiver, &mut f);
                args.iter_mut().for_each(|op| read(op, &mut f));
                if let Some(closure) = closure {
                    read(closure, &mut f);
                }
                if let Some(dst) = dst {
                    f(dst);
                }
            }
            Instr::Yield { dst, closure, args } => {
                if let Some(closure) = closure {
                    read(closure, &mut f);
                }
                args.iter_mut().for_each(|op| read(op, &mut f));
                if let Some(dst) = dst {
                    f(dst);
                }
            }
            Instr::Branch { cond, .. } => read(cond, &mut f),
            Instr::Case { value, arms, .. } => {
                read(value, &mut f);
                for (when, _) in arms {
                    read(when, &mut f);
                }
            }
            Instr::Return(v) | Instr::ClosureReturn(v) | Instr::Break(v) | Instr::Throw(v) => {
                read(v, &mut f);
            }
            Instr::ReceiveSelf(dst)
            | Instr::ReceiveArg { dst, .. }
            | Instr::ReceiveClosure(dst) => f(dst),
            Instr::Label(_) | Instr::Jump(_) | Instr::RegionStart { .. } | Instr::RegionEnd => {}
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

fn write_dst(f: &mut fmt::Formatter<'_>, dst: Option<&Variable>) -> fmt::Result {
    match dst {
        Some(dst) => write!(f, "{dst} = "),
        None => Ok(()),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label(label) => write!(f, "{label}:"),
            Instr::Copy { dst, src } => write!(f, "{dst} = {src}"),
            Instr::Op {
                dst,
                name,
                args,
                raises,
            } => {
                write_dst(f, dst.as_ref())?;
                write!(f, "{name}{}(", if *raises { "!" } else { "" })?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Instr::Call {
                dst,
                receiver,
                method,
                args,
                closure,
            } => {
                write_dst(f, dst.as_ref())?;
                write!(f, "call {receiver}.{method}(")?;
                write_args(f, args)?;
                f.write_str(")")?;
                match closure {
                    Some(closure) => write!(f, " &{closure}"),
                    None => Ok(()),
                }
            }
            Instr::Yield { dst, closure, args } => {
                write_dst(f, dst.as_ref())?;
                f.write_str("yield(")?;
                write_args(f, args)?;
                f.write_str(")")?;
                match closure {
                    Some(closure) => write!(f, " to {closure}"),
                    None => Ok(()),
                }
            }
            Instr::Branch { cond, target } => write!(f, "branch {cond}, {target}"),
            Instr::Jump(target) => write!(f, "jump {target}"),
            Instr::Case {
                value,
                arms,
                default,
            } => {
                write!(f, "case {value} [")?;
                for (idx, (when, label)) in arms.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{when} => {label}")?;
                }
                write!(f, "] else {default}")
            }
            Instr::Return(v) => write!(f, "return {v}"),
            Instr::ClosureReturn(v) => write!(f, "closure_return {v}"),
            Instr::Break(v) => write!(f, "break {v}"),
            Instr::Throw(v) => write!(f, "throw {v}"),
            Instr::ReceiveSelf(dst) => write!(f, "{dst} = recv_self"),
            Instr::ReceiveArg { dst, index } => write!(f, "{dst} = recv_arg({index})"),
            Instr::ReceiveClosure(dst) => write!(f, "{dst} = recv_closure"),
            Instr::RegionStart { rescue, ensure } => {
                write!(f, "region_start rescue {rescue}")?;
                match ensure {
                    Some(ensure) => write!(f, " ensure {ensure}"),
                    None => Ok(()),
                }
            }
            Instr::RegionEnd => f.write_str("region_end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_block_enders() {
        let enders: Vec<Operation> = Operation::iter().filter(|op| op.ends_basic_block()).collect();
        assert_eq!(
            enders,
            vec![
                Operation::Branch,
                Operation::Jump,
                Operation::Case,
                Operation::Return,
                Operation::ClosureReturn,
                Operation::Break,
                Operation::Throw,
            ]
        );
        assert!(!Operation::Branch.transfers_control());
        assert_eq!(Operation::COUNT, 17);
    }

    #[test]
    fn test_can_raise() {
        let quiet = Instr::Op {
            dst: None,
            name: "add".into(),
            args: vec![],
            raises: false,
        };
        let loud = Instr::Op {
            dst: None,
            name: "div".into(),
            args: vec![],
            raises: true,
        };
        assert!(!quiet.can_raise());
        assert!(loud.can_raise());
        assert!(Instr::Throw(Operand::Nil).can_raise());
        assert!(!Instr::Jump(Label::new(0)).can_raise());
    }

    #[test]
    fn test_case_targets_and_relabel() {
        let mut case = Instr::Case {
            value: Operand::Fixnum(1),
            arms: vec![(Operand::Fixnum(1), Label::new(1)), (Operand::Fixnum(2), Label::new(2))],
            default: Label::new(3),
        };
        assert_eq!(case.targets(), vec![Label::new(1), Label::new(2), Label::new(3)]);

        case.for_each_label_mut(|l| *l = Label::new(l.id() + 10));
        assert_eq!(case.targets(), vec![Label::new(11), Label::new(12), Label::new(13)]);
    }

    #[test]
    fn test_variable_rewrite_covers_reads_and_writes() {
        let mut call = Instr::Call {
            dst: Some(Variable::Temp(9)),
            receiver: Operand::Var(Variable::local("obj")),
            method: "each".into(),
            args: vec![Operand::Var(Variable::Temp(1)), Operand::Fixnum(2)],
            closure: Some(Operand::Var(Variable::Temp(2))),
        };
        let mut seen = Vec::new();
        call.for_each_variable_mut(|v| seen.push(v.clone()));
        assert_eq!(
            seen,
            vec![
                Variable::local("obj"),
                Variable::Temp(1),
                Variable::Temp(2),
                Variable::Temp(9),
            ]
        );
        assert_eq!(call.to_string(), "%v9 = call obj.each(%v1, 2) &%v2");
    }

    #[test]
    fn test_display() {
        let start = Instr::RegionStart {
            rescue: Label::new(4),
            ensure: Some(Label::new(5)),
        };
        assert_eq!(start.to_string(), "region_start rescue L4 ensure L5");
        assert_eq!(Instr::Label(Label::new(2)).to_string(), "L2:");
        let yield_instr = Instr::Yield {
            dst: None,
            closure: Some(Operand::Closure(ClosureId(0))),
            args: vec![Operand::Nil],
        };
        assert_eq!(yield_instr.to_string(), "yield(nil) to closure#0");
    }
}
