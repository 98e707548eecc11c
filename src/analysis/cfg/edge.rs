//! Control flow edge types.

use std::fmt;

use strum::{EnumCount, EnumIter};

/// The kind of control transfer an edge represents.
///
/// A block may have parallel edges of different kinds to the same target (a
/// conditional branch whose taken and fall-through targets coincide, for instance), but
/// each `(source, target, kind)` triple is stored once.
///
/// # Examples
///
/// ```rust
/// use irflow::analysis::EdgeType;
///
/// assert!(EdgeType::Exception.is_exceptional());
/// assert!(EdgeType::FallThrough.is_normal());
/// assert_eq!(EdgeType::Exit.to_string(), "exit");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum EdgeType {
    /// Control reaches the target by running off the end of the source block.
    ///
    /// A block has at most one outgoing fall-through edge.
    FallThrough,
    /// An explicit jump, branch or case arm names the target's label.
    Branch,
    /// An exception raised in the source block is delivered to the target.
    Exception,
    /// Control leaves the scope. The target is always the exit block.
    Exit,
}

impl EdgeType {
    /// Returns `true` for [`EdgeType::Exception`].
    #[must_use]
    pub const fn is_exceptional(self) -> bool {
        matches!(self, Self::Exception)
    }

    /// Returns `true` for every kind that represents normal (non-exceptional) flow.
    #[must_use]
    pub const fn is_normal(self) -> bool {
        !self.is_exceptional()
    }

    /// Returns the Graphviz edge attributes used by the CFG dump.
    #[must_use]
    pub const fn dot_style(self) -> &'static str {
        match self {
            Self::FallThrough => "color=black",
            Self::Branch => "color=blue",
            Self::Exception => "color=red, style=dashed",
            Self::Exit => "color=gray, style=dotted",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FallThrough => "fall_through",
            Self::Branch => "branch",
            Self::Exception => "exception",
            Self::Exit => "exit",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_only_exception_is_exceptional() {
        let exceptional: Vec<EdgeType> = EdgeType::iter().filter(|e| e.is_exceptional()).collect();
        assert_eq!(exceptional, vec![EdgeType::Exception]);
        assert_eq!(EdgeType::COUNT, 4);
    }
}
