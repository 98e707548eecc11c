use thiserror::Error;

use crate::{ir::Label, utils::graph::NodeId};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Why an inlining attempt was refused.
///
/// Every reason is detected before the caller graph is touched, so a rejected attempt
/// leaves the caller exactly as it was and the call simply stays a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The instruction at the requested site is not a `Call` (or not a `Yield` for
    /// closure inlining).
    NotACallSite,
    /// No callee is known under the called method name.
    UnknownCallee(String),
    /// The callee has more instructions than the configured threshold.
    CalleeTooLarge {
        /// Instruction count of the callee.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The callee defines closure literals of its own.
    CalleeDefinesClosures,
    /// A closure is passed but the callee yields from more than one place.
    MultipleYieldSites(usize),
    /// The closure argument is a variable rather than a literal.
    DynamicClosure,
    /// The closure literal is not registered in the scope.
    UnknownClosure(u32),
    /// The closure literal was already inlined somewhere else.
    ClosureConsumed(u32),
    /// The callee both yields and captures its block as a value.
    CapturedBlock,
    /// The closure body contains a `break`.
    ClosureBreaks,
    /// The closure body defines closures of its own.
    NestedClosure,
    /// The closure body does not form a valid graph; carries the construction error.
    MalformedClosure(String),
    /// The site lies in a block that does not exist in the graph.
    UnknownBlock,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotACallSite => f.write_str("instruction is not an inlinable call site"),
            Self::UnknownCallee(name) => write!(f, "no callee named `{name}`"),
            Self::CalleeTooLarge { size, limit } => {
                write!(f, "callee has {size} instructions, limit is {limit}")
            }
            Self::CalleeDefinesClosures => f.write_str("callee defines closures"),
            Self::MultipleYieldSites(n) => write!(f, "callee has {n} yield sites"),
            Self::DynamicClosure => f.write_str("closure argument is not a literal"),
            Self::UnknownClosure(id) => write!(f, "closure #{id} is not registered"),
            Self::ClosureConsumed(id) => write!(f, "closure #{id} was already inlined"),
            Self::CapturedBlock => f.write_str("callee yields and captures its block"),
            Self::ClosureBreaks => f.write_str("closure body contains break"),
            Self::NestedClosure => f.write_str("closure body defines closures"),
            Self::MalformedClosure(err) => write!(f, "closure body is malformed: {err}"),
            Self::UnknownBlock => f.write_str("call site block does not exist"),
        }
    }
}

/// The error type for every fallible operation in this crate.
///
/// Errors fall into three groups:
///
/// ## Structural errors
///
/// The instruction list handed to the graph builder is malformed. The scope cannot be
/// compiled.
/// - [`Error::UndefinedLabel`]
/// - [`Error::DuplicateLabel`]
/// - [`Error::UnbalancedRegion`]
///
/// ## Recoverable errors
///
/// - [`Error::InlineRejected`] - the call stays a call; see [`Error::is_recoverable`]
///
/// ## Internal consistency errors
///
/// A pass broke a graph invariant. These indicate a bug, not bad input; see
/// [`Error::is_internal`].
/// - [`Error::UnplacedBlock`]
/// - [`Error::Malformed`]
/// - [`Error::GraphError`]
///
/// # Examples
///
/// ```rust
/// use irflow::{ir::{InstrBuilder, Scope}, CompilerConfig, ControlFlowGraph, Error};
///
/// let mut scope = Scope::new("broken");
/// let missing = scope.new_label();
/// let instrs = InstrBuilder::new().jump(missing).build();
///
/// match ControlFlowGraph::build(&mut scope, instrs, &CompilerConfig::default()) {
///     Err(Error::UndefinedLabel { scope, label }) => {
///         assert_eq!(scope, "broken");
///         assert_eq!(label, missing);
///     }
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A jump, branch, case arm or exception region names a label that no block
    /// carries.
    #[error("{scope}: label {label} is referenced but never defined")]
    UndefinedLabel {
        /// The scope being built.
        scope: String,
        /// The missing label.
        label: Label,
    },

    /// Two blocks claim the same label.
    #[error("{scope}: label {label} is defined more than once")]
    DuplicateLabel {
        /// The scope being built.
        scope: String,
        /// The label defined twice.
        label: Label,
    },

    /// Region start and end markers do not pair up.
    #[error("{scope}: unbalanced exception region markers ({detail})")]
    UnbalancedRegion {
        /// The scope being built.
        scope: String,
        /// Which marker was out of place.
        detail: &'static str,
    },

    /// An inlining precondition failed. The caller graph was not modified.
    #[error("{scope}: inlining at {block} rejected: {reason}")]
    InlineRejected {
        /// The scope containing the call site.
        scope: String,
        /// The block containing the call site.
        block: NodeId,
        /// The failed precondition.
        reason: RejectReason,
    },

    /// A live block was not emitted by linearization.
    #[error("{scope}: block {block} was never placed during linearization")]
    UnplacedBlock {
        /// The scope being linearized.
        scope: String,
        /// The block left behind.
        block: NodeId,
    },

    /// A graph invariant does not hold.
    ///
    /// Carries the source location where the violation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of the violated invariant.
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An operation on the underlying graph arena failed.
    #[error("Graph error: {0}")]
    GraphError(String),
}

impl Error {
    /// Returns `true` for errors after which compilation of the scope can continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InlineRejected { .. })
    }

    /// Returns `true` for errors that indicate a broken invariant inside the crate
    /// rather than malformed input.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::UnplacedBlock { .. } | Self::Malformed { .. } | Self::GraphError(_)
        )
    }

    /// Returns the reject reason if this is an [`Error::InlineRejected`].
    #[must_use]
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::InlineRejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let rejected = Error::InlineRejected {
            scope: "main".into(),
            block: NodeId::new(2),
            reason: RejectReason::DynamicClosure,
        };
        assert!(rejected.is_recoverable());
        assert!(!rejected.is_internal());
        assert_eq!(rejected.reject_reason(), Some(&RejectReason::DynamicClosure));

        let unplaced = Error::UnplacedBlock {
            scope: "main".into(),
            block: NodeId::new(4),
        };
        assert!(unplaced.is_internal());
        assert!(!unplaced.is_recoverable());

        let dup = Error::DuplicateLabel {
            scope: "main".into(),
            label: Label::new(1),
        };
        assert!(!dup.is_internal());
        assert!(!dup.is_recoverable());
    }

    #[test]
    fn test_messages_carry_scope_and_ids() {
        let err = Error::InlineRejected {
            scope: "each".into(),
            block: NodeId::new(3),
            reason: RejectReason::MultipleYieldSites(2),
        };
        assert_eq!(
            err.to_string(),
            "each: inlining at B3 rejected: callee has 2 yield sites"
        );

        let err = Error::UndefinedLabel {
            scope: "main".into(),
            label: Label::new(7),
        };
        assert_eq!(err.to_string(), "main: label L7 is referenced but never defined");
    }

    #[test]
    fn test_malformed_macro_records_location() {
        let err = malformed_error!("edge {} dangles", 4);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "edge 4 dangles");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }
}
