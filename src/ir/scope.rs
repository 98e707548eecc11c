//! Per-scope id allocation and the closure table.

use crate::{
    error::RejectReason,
    ir::{ClosureId, Instr, Label, Variable},
};

/// State of one closure literal.
#[derive(Debug, Clone)]
enum ClosureSlot {
    /// Lowered body, not inlined anywhere yet.
    Available(Vec<Instr>),
    /// The body was moved into a host graph.
    Consumed,
}

/// A compiled scope: a method or closure body with its own label and temporary
/// namespaces.
///
/// The scope is the only source of fresh [`Label`]s and temporaries for everything
/// compiled into it, including code copied in by inlining, so uniqueness only has to
/// hold per scope.
///
/// Closure literals defined in the scope are registered here and referenced from
/// instructions by [`ClosureId`]. A closure body can be inlined at most once: taking it
/// out of the table leaves a consumed marker behind.
///
/// # Examples
///
/// ```rust
/// use irflow::ir::{InstrBuilder, Scope};
///
/// let mut scope = Scope::new("each_pair");
/// let l0 = scope.new_label();
/// let l1 = scope.new_label();
/// assert_ne!(l0, l1);
///
/// let body = InstrBuilder::new().closure_return(1i64).build();
/// let block = scope.define_closure(body);
/// assert!(scope.take_closure(block).is_ok());
/// assert!(scope.take_closure(block).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    next_label: u32,
    next_temp: u32,
    closures: Vec<ClosureSlot>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new(name: impl Into<String>) -> Self {
        Scope {
            name: name.into(),
            next_label: 0,
            next_temp: 0,
            closures: Vec::new(),
        }
    }

    /// Returns the scope name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issues a fresh label.
    pub fn new_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Issues a fresh temporary.
    pub fn new_temp(&mut self) -> Variable {
        let temp = Variable::Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    /// Returns the number of labels issued so far.
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.next_label
    }

    /// Returns the number of temporaries issued so far.
    #[must_use]
    pub fn temp_count(&self) -> u32 {
        self.next_temp
    }

    /// Registers a closure literal and returns its handle.
    ///
    /// The body is expected to use labels and temporaries issued by this scope, to refer
    /// to its own locals at depth 0 and to this scope's locals at depth 1.
    pub fn define_closure(&mut self, body: Vec<Instr>) -> ClosureId {
        let id = ClosureId(u32::try_from(self.closures.len()).unwrap_or(u32::MAX));
        self.closures.push(ClosureSlot::Available(body));
        id
    }

    /// Returns the number of closure literals registered, consumed or not.
    #[must_use]
    pub fn closure_count(&self) -> usize {
        self.closures.len()
    }

    /// Returns `true` if the closure's body was already inlined.
    #[must_use]
    pub fn is_consumed(&self, id: ClosureId) -> bool {
        matches!(
            self.closures.get(id.0 as usize),
            Some(ClosureSlot::Consumed)
        )
    }

    /// Borrows the body of an available closure.
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::UnknownClosure`] or [`RejectReason::ClosureConsumed`].
    pub fn closure_body(&self, id: ClosureId) -> Result<&[Instr], RejectReason> {
        match self.closures.get(id.0 as usize) {
            Some(ClosureSlot::Available(body)) => Ok(body),
            Some(ClosureSlot::Consumed) => Err(RejectReason::ClosureConsumed(id.0)),
            None => Err(RejectReason::UnknownClosure(id.0)),
        }
    }

    /// Moves the body of a closure out of the table and marks it consumed.
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::UnknownClosure`] or [`RejectReason::ClosureConsumed`].
    pub fn take_closure(&mut self, id: ClosureId) -> Result<Vec<Instr>, RejectReason> {
        let slot = self
            .closures
            .get_mut(id.0 as usize)
            .ok_or(RejectReason::UnknownClosure(id.0))?;
        match std::mem::replace(slot, ClosureSlot::Consumed) {
            ClosureSlot::Available(body) => Ok(body),
            ClosureSlot::Consumed => Err(RejectReason::ClosureConsumed(id.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    #[test]
    fn test_counters_are_monotonic() {
        let mut scope = Scope::new("main");
        assert_eq!(scope.new_label(), Label::new(0));
        assert_eq!(scope.new_label(), Label::new(1));
        assert_eq!(scope.new_temp(), Variable::Temp(0));
        assert_eq!(scope.label_count(), 2);
        assert_eq!(scope.temp_count(), 1);
    }

    #[test]
    fn test_closure_table() {
        let mut scope = Scope::new("main");
        let id = scope.define_closure(vec![Instr::ClosureReturn(Operand::Nil)]);
        assert_eq!(scope.closure_count(), 1);
        assert_eq!(scope.closure_body(id).map(<[Instr]>::len), Ok(1));

        let body = scope.take_closure(id).unwrap();
        assert_eq!(body, vec![Instr::ClosureReturn(Operand::Nil)]);
        assert!(scope.is_consumed(id));
        assert_eq!(
            scope.closure_body(id),
            Err(RejectReason::ClosureConsumed(0))
        );
        assert_eq!(
            scope.take_closure(ClosureId(5)),
            Err(RejectReason::UnknownClosure(5))
        );
    }
}
