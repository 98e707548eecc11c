//! Jump targets.

use std::fmt;

/// A jump target, unique within the [`Scope`](crate::ir::Scope) that issued it.
///
/// Labels are plain values: two labels are the same target exactly when their numbers
/// are equal. They are issued by [`Scope::new_label`](crate::ir::Scope::new_label) and
/// renamed during inlining through integer maps, so nothing ever compares labels by
/// address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    /// Wraps a raw label number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Label(id)
    }

    /// Returns the raw label number.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
