//! Pass scheduler for orchestrating SSA pass execution.
//!
//! The `PassScheduler` runs its passes over every function of a
//! [`CompilerContext`], repeating the whole sequence until no pass reports a
//! change or the iteration limit is reached.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    Result,
};

/// Orchestrates SSA pass execution to a fixpoint.
///
/// Per-function work runs in parallel: each function is removed from the
/// context, transformed with no locks held, and reinserted. Passes never see
/// two functions at once, so a pass only needs to be `Send + Sync`.
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Passes, run in order within one iteration.
    passes: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PassScheduler {
    /// Creates a new scheduler.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Creates a scheduler using the context's iteration limit.
    #[must_use]
    pub fn from_context(ctx: &CompilerContext) -> Self {
        Self::new(ctx.config.max_iterations)
    }

    /// Appends a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn SsaPass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Returns the number of registered passes.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Runs one pass once over all functions.
    ///
    /// Returns `true` if the pass changed any function.
    fn run_pass(ctx: &CompilerContext, pass: &mut Box<dyn SsaPass>) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        pass.initialize(ctx)?;
        ctx.events
            .record(EventKind::PassStarted)
            .pass(pass.name())
            .message(pass.description());

        let names = ctx.function_names();
        let pass_ref: &dyn SsaPass = pass.as_ref();
        names.par_iter().try_for_each(|name| -> Result<()> {
            // Remove SSA (brief lock, then released)
            let Some((key, mut ssa)) = ctx.functions.remove(name) else {
                return Ok(());
            };

            if !pass_ref.should_run(&ssa, ctx) {
                ctx.functions.insert(key, ssa);
                return Ok(());
            }

            // Run the pass with no locks held
            let result = pass_ref.run_on_function(&mut ssa, ctx);

            // Reinsert SSA even on failure so the caller can inspect it
            ctx.functions.insert(key, ssa);

            if result? {
                any_changed.store(true, Ordering::Relaxed);
                ctx.mark_changed(name);
            }
            Ok(())
        })?;

        pass.finalize(ctx)?;

        let changed = any_changed.load(Ordering::Relaxed);
        ctx.events
            .record(EventKind::PassCompleted)
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        Ok(changed)
    }

    /// Runs the complete pipeline.
    ///
    /// Executes every pass over every function, repeating until an iteration
    /// makes no change or `max_iterations` is reached.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns the first error any pass reports; the pipeline stops there.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext) -> Result<usize> {
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut iteration_changed = false;

            for pass in &mut self.passes {
                if Self::run_pass(ctx, pass)? {
                    iteration_changed = true;
                }
            }

            debug!(
                "pipeline iteration {} {}",
                iterations,
                if iteration_changed { "changed" } else { "stable" }
            );

            if !iteration_changed {
                return Ok(iterations);
            }
        }

        if self.max_iterations > 0 {
            warn!(
                "pass pipeline hit the iteration limit ({}) before reaching a fixpoint",
                self.max_iterations
            );
            ctx.events.warn(format!(
                "iteration limit {} reached before fixpoint",
                self.max_iterations
            ));
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        analysis::{SsaFunction, SsaFunctionBuilder},
        compiler::config::CompilerConfig,
        Error,
    };

    /// Reports a change a fixed number of times per function.
    struct CountdownPass {
        remaining: AtomicUsize,
    }

    impl SsaPass for CountdownPass {
        fn name(&self) -> &'static str {
            "countdown"
        }

        fn run_on_function(&self, _ssa: &mut SsaFunction, _ctx: &CompilerContext) -> Result<bool> {
            let previous = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            Ok(previous.is_ok())
        }
    }

    struct FailingPass;

    impl SsaPass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run_on_function(&self, _ssa: &mut SsaFunction, _ctx: &CompilerContext) -> Result<bool> {
            Err(invariant_error!("broken"))
        }
    }

    fn context() -> CompilerContext {
        let ctx = CompilerContext::new(CompilerConfig::default());
        ctx.add_function(SsaFunctionBuilder::new("f").build_with(|f| f.block(0, |b| b.ret())));
        ctx
    }

    #[test]
    fn test_runs_to_fixpoint() {
        let ctx = context();
        let mut scheduler = PassScheduler::from_context(&ctx);
        scheduler.add_pass(Box::new(CountdownPass {
            remaining: AtomicUsize::new(2),
        }));

        // two changing iterations, then one stable one
        assert_eq!(scheduler.run_pipeline(&ctx).expect("pipeline"), 3);
        assert!(ctx.was_changed("f"));
        assert_eq!(ctx.events.count_kind(EventKind::PassStarted), 3);
        assert_eq!(ctx.functions.len(), 1);
    }

    #[test]
    fn test_iteration_limit() {
        let ctx = context();
        let mut scheduler = PassScheduler::new(2);
        scheduler.add_pass(Box::new(CountdownPass {
            remaining: AtomicUsize::new(10),
        }));

        assert_eq!(scheduler.run_pipeline(&ctx).expect("pipeline"), 2);
        assert_eq!(ctx.events.count_kind(EventKind::Warning), 1);
    }

    #[test]
    fn test_errors_propagate() {
        let ctx = context();
        let mut scheduler = PassScheduler::default();
        scheduler.add_pass(Box::new(FailingPass));

        assert!(matches!(
            scheduler.run_pipeline(&ctx),
            Err(Error::InvariantViolation { .. })
        ));
        // the function is put back even though the pass failed
        assert_eq!(ctx.functions.len(), 1);
    }
}
