//! Compiler context shared by every pass.
//!
//! The [`CompilerContext`] owns the functions being optimized together with the
//! state passes share: the event log, the set of changed functions and the
//! configuration. All collection fields use thread-safe types so the scheduler
//! can process functions in parallel.

use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::SsaFunction,
    compiler::{config::CompilerConfig, events::EventLog},
    Error, Result,
};

/// Shared state of one compilation.
pub struct CompilerContext {
    /// SSA form of every function, keyed by name.
    pub functions: DashMap<String, SsaFunction>,

    /// Functions that at least one pass changed.
    pub changed: DashSet<String>,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Pipeline configuration.
    pub config: CompilerConfig,

    /// When compilation started.
    start_time: Instant,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl CompilerContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            functions: DashMap::new(),
            changed: DashSet::new(),
            events: EventLog::new(),
            config,
            start_time: Instant::now(),
        }
    }

    /// Adds a function, replacing any function with the same name.
    pub fn add_function(&self, ssa: SsaFunction) {
        self.functions.insert(ssa.name().to_string(), ssa);
    }

    /// Removes and returns a function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FunctionNotFound`] if no function has that name.
    pub fn take_function(&self, name: &str) -> Result<SsaFunction> {
        self.functions
            .remove(name)
            .map(|(_, ssa)| ssa)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
    }

    /// Executes a closure with a reference to a function.
    pub fn with_function<R, F>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&SsaFunction) -> R,
    {
        self.functions.get(name).map(|entry| f(&entry))
    }

    /// Returns all function names in sorted order.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Marks a function as changed.
    pub fn mark_changed(&self, name: &str) {
        self.changed.insert(name.to_string());
    }

    /// Checks if a function was changed by any pass.
    #[must_use]
    pub fn was_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
