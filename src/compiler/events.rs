//! Unified event logging for the control flow passes.
//!
//! Every pass (graph construction, inlining, linearization and the pipeline driving
//! them) records what it did into an [`EventLog`]. Events can be inspected for
//! debugging, asserted on in tests, or ignored.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event (a rewrite, a rejection, a warning)
//! - [`EventLog`] - Collection of events with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use irflow::{compiler::{EventKind, EventLog}, utils::graph::NodeId};
//!
//! let log = EventLog::new();
//! log.record(EventKind::BlockMerged)
//!     .at("each", NodeId::new(3))
//!     .message("B3 absorbed B7");
//! log.info("starting inlining pass 1");
//!
//! assert!(log.has(EventKind::BlockMerged));
//! assert_eq!(log.summary(), "1 block merged");
//! ```

use std::{collections::HashMap, fmt};

use strum::{EnumCount, EnumIter};

use crate::utils::graph::NodeId;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum EventKind {
    /// A block was split in two.
    BlockSplit,
    /// A block absorbed its straight-line successor.
    BlockMerged,
    /// A block was removed.
    BlockRemoved,
    /// Exception edges were removed from a block that cannot raise.
    EdgePruned,
    /// A call was replaced by the callee body.
    MethodInlined,
    /// A yield was replaced by the closure body.
    ClosureInlined,
    /// An inlining attempt failed a precondition.
    InlineRejected,
    /// Linearization appended a jump.
    JumpInserted,
    /// Linearization dropped a jump to the next block.
    JumpRemoved,

    /// A graph was built from an instruction list.
    ScopeBuilt,
    /// A graph was serialized back into an instruction list.
    ScopeLinearized,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::BlockSplit => "block split",
            Self::BlockMerged => "block merged",
            Self::BlockRemoved => "block removed",
            Self::EdgePruned => "exception edge pruned",
            Self::MethodInlined => "method inlined",
            Self::ClosureInlined => "closure inlined",
            Self::JumpInserted => "jump inserted",
            Self::JumpRemoved => "jump removed",
            // Decisions
            Self::InlineRejected => "inlining rejected",
            // Pipeline
            Self::ScopeBuilt => "scope built",
            Self::ScopeLinearized => "scope linearized",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a change to a graph or its output.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::BlockSplit
                | Self::BlockMerged
                | Self::BlockRemoved
                | Self::EdgePruned
                | Self::MethodInlined
                | Self::ClosureInlined
                | Self::JumpInserted
                | Self::JumpRemoved
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Scope the event belongs to, if any.
    pub scope: Option<String>,
    /// Block the event concerns, if any.
    pub block: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
}

impl Event {
    fn diagnostic(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            scope: None,
            block: None,
            message: message.into(),
        }
    }

    /// Returns `true` if the event concerns `block` of `scope`.
    #[must_use]
    pub fn concerns(&self, scope: &str, block: NodeId) -> bool {
        self.block == Some(block) && self.scope.as_deref() == Some(scope)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        match (&self.scope, self.block) {
            (Some(scope), Some(block)) => write!(f, " {scope}/{block}")?,
            (Some(scope), None) => write!(f, " {scope}")?,
            _ => {}
        }
        write!(f, " {}", self.message)
    }
}

/// Fluent construction of one event.
///
/// Created by [`EventLog::record`]. The event is appended when the builder is
/// dropped, so a bare `log.record(kind);` statement records it with the kind's
/// description as its message.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    scope: Option<String>,
    block: Option<NodeId>,
    message: Option<String>,
}

impl EventBuilder<'_> {
    /// Attaches the event to `block` of `scope`.
    pub fn at(mut self, scope: &str, block: NodeId) -> Self {
        self.scope = Some(scope.to_owned());
        self.block = Some(block);
        self
    }

    /// Attaches the event to a whole scope.
    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_owned());
        self
    }

    /// Replaces the default message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let kind = self.kind;
        self.log.events.push(Event {
            kind,
            scope: self.scope.take(),
            block: self.block.take(),
            message: self
                .message
                .take()
                .unwrap_or_else(|| kind.description().to_owned()),
        });
    }
}

/// Append-only record of what the passes did to one or more scopes.
///
/// Appending only needs `&self`, so a single log is handed by reference to the
/// builder, the inliner and the linearizer of a scope. Statistics such as
/// [`Linearization::jumps_inserted`](crate::compiler::Linearization::jumps_inserted)
/// are kept next to their results; the log is for tracing and tests.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts an event of the given kind; it is appended when the builder drops.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            kind,
            scope: None,
            block: None,
            message: None,
        }
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::diagnostic(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::diagnostic(EventKind::Warning, message));
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Returns every event in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns the events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns the events attached to `scope`.
    pub fn filter_scope<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.scope.as_deref() == Some(scope))
    }

    /// Returns the events attached to `block` of `scope`, in recording order.
    ///
    /// Block ids are only unique within a scope, so both are needed.
    pub fn for_block<'a>(
        &'a self,
        scope: &'a str,
        block: NodeId,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.concerns(scope, block))
    }

    /// Returns the warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Returns the inlining attempts that were turned down.
    pub fn rejections(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::InlineRejected)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Summarizes the transformations as `"<count> <description>"` parts, sorted.
    ///
    /// Falls back to the plain event count when nothing was transformed.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .into_iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }
        parts.sort();
        parts.join(", ")
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in self.iter() {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}
