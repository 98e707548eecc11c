//! The instruction-level IR consumed and produced by the control flow passes.
//!
//! Lowering hands the back-end a flat `Vec<Instr>` per [`Scope`]. The IR is small on
//! purpose: operations the back-end does not need to understand are carried as opaque
//! [`Instr::Op`]s with a single "may raise" bit.
//!
//! # Key Components
//!
//! - [`Label`] - scope-unique jump target
//! - [`Variable`] / [`Operand`] - what instructions read and write
//! - [`Instr`] / [`Operation`] - instructions and their control flow classification
//! - [`Scope`] - label and temporary allocator plus closure table
//! - [`InstrBuilder`] - fluent list construction for lowering and tests

mod builder;
mod instr;
mod label;
mod operand;
mod scope;

pub use builder::InstrBuilder;
pub use instr::{Instr, Operation};
pub use label::Label;
pub use operand::{ClosureId, Operand, Variable, SELF_NAME};
pub use scope::Scope;
