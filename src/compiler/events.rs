//! Unified event logging for the compiler pipeline.
//!
//! Every transformation a pass performs, and every fusion it declines, is
//! recorded as an [`Event`]. Events can be inspected for debugging or safely
//! ignored when not needed; statistics are derived from them rather than tracked
//! separately.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only, thread-safe collection with query helpers
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use loopfuse::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::LoopsFused)
//!     .function("kernel")
//!     .location(2)
//!     .message("fused B6 into B2");
//! log.info("pipeline finished");
//!
//! assert_eq!(log.count_kind(EventKind::LoopsFused), 1);
//! assert_eq!(log.summary(), "1 loops fused");
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Two adjacent loops were fused into one.
    LoopsFused,
    /// A loop pair was examined and left unmerged.
    FusionRejected,
    /// The second loop's induction variable was replaced by the first one's.
    InductionVariableUnified,
    /// A header phi was moved into the surviving loop header.
    PhiRelocated,
    /// An instruction between two loops was hoisted in front of the first.
    InstructionHoisted,
    /// A basic block became unreachable and was removed.
    BlockRemoved,

    /// An SSA pass started.
    PassStarted,
    /// An SSA pass completed.
    PassCompleted,

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
            Self::LoopsFused => "loops fused",
            Self::FusionRejected => "fusion rejected",
            Self::InductionVariableUnified => "induction variable unified",
            Self::PhiRelocated => "phi relocated",
            Self::InstructionHoisted => "instruction hoisted",
            Self::BlockRemoved => "block removed",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::LoopsFused
                | Self::InductionVariableUnified
                | Self::PhiRelocated
                | Self::InstructionHoisted
                | Self::BlockRemoved
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
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The function where the event occurred (if applicable).
    pub function: Option<String>,
    /// Location within the function (block index).
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "[{}] {}: {}", self.kind, function, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<String>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the function the event belongs to.
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the block index where the event occurred.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from a compilation.
///
/// This type is thread-safe: events can be appended concurrently from multiple
/// threads using shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
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

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of every event of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| (e.kind == kind).then_some(e))
    }

    /// Returns an iterator over events for a specific function.
    pub fn filter_function<'a>(&'a self, function: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events
            .iter()
            .filter_map(move |(_, e)| (e.function.as_deref() == Some(function)).then_some(e))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_transformation().then_some(e))
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_diagnostic().then_some(e))
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of unique functions with transformation events.
    #[must_use]
    pub fn functions_affected(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .filter_map(|(_, e)| e.function.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all transformation events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Number of functions that had any transformations.
    pub functions_transformed: usize,
    /// Number of loop pairs fused.
    pub loops_fused: usize,
    /// Number of loop pairs examined and left unmerged.
    pub fusions_rejected: usize,
    /// Number of induction variables replaced.
    pub induction_variables_unified: usize,
    /// Number of header phis relocated.
    pub phis_relocated: usize,
    /// Number of inter-loop instructions hoisted.
    pub instructions_hoisted: usize,
    /// Number of blocks removed.
    pub blocks_removed: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Number of pass iterations.
    pub iterations: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            functions_transformed: log.functions_affected(),
            loops_fused: get(EventKind::LoopsFused),
            fusions_rejected: get(EventKind::FusionRejected),
            induction_variables_unified: get(EventKind::InductionVariableUnified),
            phis_relocated: get(EventKind::PhiRelocated),
            instructions_hoisted: get(EventKind::InstructionHoisted),
            blocks_removed: get(EventKind::BlockRemoved),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            iterations: 0,
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.functions_transformed > 0 {
            parts.push(format!("{} functions", self.functions_transformed));
        }
        if self.loops_fused > 0 {
            parts.push(format!("{} loops fused", self.loops_fused));
        }
        if self.induction_variables_unified > 0 {
            parts.push(format!("{} IVs unified", self.induction_variables_unified));
        }
        if self.blocks_removed > 0 {
            parts.push(format!("{} blocks removed", self.blocks_removed));
        }
        if self.fusions_rejected > 0 {
            parts.push(format!("{} rejected", self.fusions_rejected));
        }

        if self.errors > 0 {
            parts.push(format!("{} errors", self.errors));
        }
        if self.warnings > 0 {
            parts.push(format!("{} warnings", self.warnings));
        }

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!(
                "{} in {:?} ({} iterations)",
                stats, self.total_time, self.iterations
            )
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::LoopsFused));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();

        log.record(EventKind::LoopsFused)
            .function("kernel")
            .location(2)
            .message("fused B6 into B2");

        assert_eq!(log.len(), 1);
        let event = log.iter().next().unwrap();
        assert_eq!(event.function.as_deref(), Some("kernel"));
        assert_eq!(event.location, Some(2));
        assert_eq!(event.message, "fused B6 into B2");
        assert_eq!(event.to_string(), "[loops fused] kernel: fused B6 into B2");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::BlockRemoved).location(5);

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "block removed");
    }

    #[test]
    fn test_info_warn_error() {
        let log = EventLog::new();

        log.info("informational message");
        log.warn("warning message");
        log.error("error message");

        assert_eq!(log.count_kind(EventKind::Info), 1);
        assert_eq!(log.count_kind(EventKind::Warning), 1);
        assert_eq!(log.count_kind(EventKind::Error), 1);
        assert_eq!(log.diagnostics().count(), 3);
        assert_eq!(log.summary(), "3 events");
    }

    #[test]
    fn test_merge_and_filter() {
        let first = EventLog::new();
        let second = EventLog::new();

        first.record(EventKind::LoopsFused).function("a");
        second.record(EventKind::BlockRemoved).function("b");
        second.record(EventKind::FusionRejected).function("a");
        first.merge(&second);

        assert_eq!(first.len(), 3);
        assert_eq!(first.filter_function("a").count(), 2);
        assert_eq!(first.transformations().count(), 2);
        assert_eq!(first.filter_kind(EventKind::FusionRejected).count(), 1);
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();

        log.record(EventKind::LoopsFused).function("a");
        log.record(EventKind::LoopsFused).function("b");
        log.record(EventKind::BlockRemoved).function("a");
        log.record(EventKind::FusionRejected).function("c");
        log.warn("a warning");

        let stats = DerivedStats::from_log(&log);
        assert_eq!(stats.functions_transformed, 2);
        assert_eq!(stats.loops_fused, 2);
        assert_eq!(stats.blocks_removed, 1);
        assert_eq!(stats.fusions_rejected, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(
            stats.summary(),
            "2 functions, 2 loops fused, 1 blocks removed, 1 rejected, 1 warnings"
        );
    }

    #[test]
    fn test_thread_safe_append() {
        use std::{sync::Arc, thread};

        let log = Arc::new(EventLog::new());
        let mut handles = vec![];

        for i in 0..4 {
            let log_clone = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    log_clone
                        .record(EventKind::BlockRemoved)
                        .function(format!("f{i}"))
                        .location(j);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 400);
        assert_eq!(log.functions_affected(), 4);
    }
}
