//! Variables and operands.

use std::fmt;

/// Name of the local bound by [`Instr::ReceiveSelf`](crate::ir::Instr::ReceiveSelf).
pub const SELF_NAME: &str = "%self";

/// A storage location read or written by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    /// A compiler temporary, issued by [`Scope::new_temp`](crate::ir::Scope::new_temp).
    Temp(u32),
    /// A named local variable.
    ///
    /// `depth` counts lexical scopes outward from the scope the instruction belongs to:
    /// 0 is the scope's own local, 1 a local of the enclosing scope, and so on. Closure
    /// bodies reach their host's locals with depth 1.
    Local {
        /// Source-level name.
        name: String,
        /// Lexical distance to the defining scope.
        depth: u32,
    },
}

impl Variable {
    /// Creates a local of the current scope.
    pub fn local(name: impl Into<String>) -> Self {
        Variable::Local {
            name: name.into(),
            depth: 0,
        }
    }

    /// Creates a local of a scope `depth` levels out.
    pub fn outer(name: impl Into<String>, depth: u32) -> Self {
        Variable::Local {
            name: name.into(),
            depth,
        }
    }

    /// Returns `%self`.
    #[must_use]
    pub fn self_var() -> Self {
        Variable::local(SELF_NAME)
    }

    /// Returns the lexical depth (temporaries are always depth 0).
    #[must_use]
    pub fn depth(&self) -> u32 {
        match self {
            Variable::Temp(_) => 0,
            Variable::Local { depth, .. } => *depth,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Temp(n) => write!(f, "%v{n}"),
            Variable::Local { name, depth: 0 } => f.write_str(name),
            Variable::Local { name, depth } => write!(f, "{name}^{depth}"),
        }
    }
}

/// Handle of a closure literal registered in a [`Scope`](crate::ir::Scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClosureId(pub(crate) u32);

impl ClosureId {
    /// Returns the raw closure number.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "closure#{}", self.0)
    }
}

/// A value consumed by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// The current value of a variable.
    Var(Variable),
    /// An immediate integer.
    Fixnum(i64),
    /// An immediate string.
    Str(String),
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// A closure literal.
    Closure(ClosureId),
}

impl Operand {
    /// Returns the variable if this operand reads one.
    #[must_use]
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Operand::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Returns the closure id if this operand is a closure literal.
    #[must_use]
    pub fn as_closure(&self) -> Option<ClosureId> {
        match self {
            Operand::Closure(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Variable> for Operand {
    fn from(var: Variable) -> Self {
        Operand::Var(var)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Fixnum(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_string())
    }
}

impl From<ClosureId> for Operand {
    fn from(id: ClosureId) -> Self {
        Operand::Closure(id)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(var) => write!(f, "{var}"),
            Operand::Fixnum(n) => write!(f, "{n}"),
            Operand::Str(s) => write!(f, "{s:?}"),
            Operand::Nil => f.write_str("nil"),
            Operand::True => f.write_str("true"),
            Operand::False => f.write_str("false"),
            Operand::Closure(id) => write!(f, "{id}"),
        }
    }
}
