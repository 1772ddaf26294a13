//! Concrete interpreter for SSA functions.
//!
//! The evaluator executes a function on concrete arguments: 64-bit wrapping
//! integers and heap-allocated integer arrays. It exists to check that a
//! transformation preserves behaviour: run the function before and after, then
//! compare return values, final memory, and (optionally) the ordered trace of
//! memory accesses.
//!
//! # Memory model
//!
//! Arrays live in a heap indexed by handle. Array arguments occupy handles
//! `0..k` in argument order; every executed `Alloc` appends a fresh zeroed array.
//! Out-of-bounds accesses are runtime faults ([`Error::Execution`]).
//!
//! # Calls
//!
//! Calls are opaque to the analyses but the evaluator needs a result. A call
//! handler can be installed with [`SsaEvaluator::with_call_handler`]; without one
//! every call is a fault.

use std::fmt;

use crate::{
    analysis::ssa::{SsaFunction, SsaOp, SsaVarId},
    Error, Result,
};

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// 64-bit integer.
    Int(i64),
    /// Handle of a heap array.
    Array(usize),
}

impl Value {
    fn as_int(self) -> Result<i64> {
        match self {
            Value::Int(value) => Ok(value),
            Value::Array(handle) => Err(Error::Execution(format!(
                "array handle {handle} used as an integer"
            ))),
        }
    }

    fn as_array(self) -> Result<usize> {
        match self {
            Value::Array(handle) => Ok(handle),
            Value::Int(value) => Err(Error::Execution(format!(
                "integer {value} used as an array"
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Array(handle) => write!(f, "@{handle}"),
        }
    }
}

/// An argument passed to [`SsaEvaluator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Integer argument.
    Int(i64),
    /// Array argument; its contents are copied into the heap.
    Array(Vec<i64>),
}

/// Kind of a traced memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryEventKind {
    /// An element was read.
    Load,
    /// An element was written.
    Store,
}

/// One traced memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEvent {
    /// Read or write.
    pub kind: MemoryEventKind,
    /// Array handle.
    pub array: usize,
    /// Element index.
    pub index: usize,
    /// Value read or written.
    pub value: i64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Value returned by the function.
    pub return_value: Option<Value>,
    /// Final heap contents, indexed by handle.
    pub memory: Vec<Vec<i64>>,
    /// Memory accesses in execution order (empty unless tracing was enabled).
    pub trace: Vec<MemoryEvent>,
    /// Number of instructions executed.
    pub steps: usize,
}

type CallHandler<'a> = Box<dyn FnMut(&str, &[i64]) -> i64 + 'a>;

/// Interpreter for an [`SsaFunction`].
pub struct SsaEvaluator<'a> {
    ssa: &'a SsaFunction,
    step_limit: usize,
    trace_memory: bool,
    call_handler: Option<CallHandler<'a>>,
}

impl<'a> SsaEvaluator<'a> {
    /// Default maximum number of executed instructions.
    pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

    /// Creates an evaluator for `ssa`.
    #[must_use]
    pub fn new(ssa: &'a SsaFunction) -> Self {
        Self {
            ssa,
            step_limit: Self::DEFAULT_STEP_LIMIT,
            trace_memory: false,
            call_handler: None,
        }
    }

    /// Sets the maximum number of executed instructions.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Records every load and store in [`ExecutionResult::trace`].
    #[must_use]
    pub fn with_memory_trace(mut self) -> Self {
        self.trace_memory = true;
        self
    }

    /// Installs a handler computing the result of every `Call`.
    ///
    /// Array arguments are passed as their handle.
    #[must_use]
    pub fn with_call_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &[i64]) -> i64 + 'a,
    {
        self.call_handler = Some(Box::new(handler));
        self
    }

    /// Runs the function on `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionLimit`] when the step limit is exceeded and
    /// [`Error::Execution`] on runtime faults (undefined values, out-of-bounds
    /// accesses, calls without a handler, control reaching a dead block).
    pub fn run(&mut self, args: &[Argument]) -> Result<ExecutionResult> {
        let ssa = self.ssa;
        if args.len() != ssa.params().len() {
            return Err(Error::Execution(format!(
                "expected {} arguments, got {}",
                ssa.params().len(),
                args.len()
            )));
        }

        let mut env: Vec<Option<Value>> = vec![None; ssa.var_count()];
        let mut heap: Vec<Vec<i64>> = Vec::new();
        for (&param, arg) in ssa.params().iter().zip(args) {
            env[param.index()] = Some(match arg {
                Argument::Int(value) => Value::Int(*value),
                Argument::Array(contents) => {
                    heap.push(contents.clone());
                    Value::Array(heap.len() - 1)
                }
            });
        }

        let mut trace = Vec::new();
        let mut steps = 0usize;
        let mut previous: Option<usize> = None;
        let mut current = ssa.entry();

        loop {
            let block = match ssa.block(current) {
                Some(block) if !block.is_empty() => block,
                _ => {
                    return Err(Error::Execution(format!(
                        "control reached dead block B{current}"
                    )))
                }
            };

            if !block.phi_nodes().is_empty() {
                let Some(pred) = previous else {
                    return Err(Error::Execution(format!("phi in entry block B{current}")));
                };
                // all phis read before any writes
                let mut incoming = Vec::with_capacity(block.phi_nodes().len());
                for phi in block.phi_nodes() {
                    let operand = phi.operand_from(pred).ok_or_else(|| {
                        Error::Execution(format!(
                            "{} in B{current} has no operand for B{pred}",
                            phi.result()
                        ))
                    })?;
                    incoming.push((phi.result(), read(&env, operand.value)?));
                }
                for (result, value) in incoming {
                    env[result.index()] = Some(value);
                }
            }

            let mut next = None;
            for op in block.instructions() {
                steps += 1;
                if steps > self.step_limit {
                    return Err(Error::ExecutionLimit(self.step_limit));
                }

                match op {
                    SsaOp::Const { dest, value } => write(&mut env, *dest, Value::Int(*value)),
                    SsaOp::Add { dest, left, right } => {
                        let value = int(&env, *left)?.wrapping_add(int(&env, *right)?);
                        write(&mut env, *dest, Value::Int(value));
                    }
                    SsaOp::Sub { dest, left, right } => {
                        let value = int(&env, *left)?.wrapping_sub(int(&env, *right)?);
                        write(&mut env, *dest, Value::Int(value));
                    }
                    SsaOp::Mul { dest, left, right } => {
                        let value = int(&env, *left)?.wrapping_mul(int(&env, *right)?);
                        write(&mut env, *dest, Value::Int(value));
                    }
                    SsaOp::Cmp {
                        dest,
                        kind,
                        left,
                        right,
                    } => {
                        let holds = kind.evaluate(int(&env, *left)?, int(&env, *right)?);
                        write(&mut env, *dest, Value::Int(i64::from(holds)));
                    }
                    SsaOp::Alloc { dest, len } => {
                        let len = usize::try_from(int(&env, *len)?)
                            .map_err(|_| Error::Execution("negative allocation".to_string()))?;
                        heap.push(vec![0; len]);
                        write(&mut env, *dest, Value::Array(heap.len() - 1));
                    }
                    SsaOp::Load { dest, base, index } => {
                        let (array, slot) = element(&env, &heap, *base, *index)?;
                        let value = heap[array][slot];
                        if self.trace_memory {
                            trace.push(MemoryEvent {
                                kind: MemoryEventKind::Load,
                                array,
                                index: slot,
                                value,
                            });
                        }
                        write(&mut env, *dest, Value::Int(value));
                    }
                    SsaOp::Store { base, index, value } => {
                        let (array, slot) = element(&env, &heap, *base, *index)?;
                        let value = int(&env, *value)?;
                        heap[array][slot] = value;
                        if self.trace_memory {
                            trace.push(MemoryEvent {
                                kind: MemoryEventKind::Store,
                                array,
                                index: slot,
                                value,
                            });
                        }
                    }
                    SsaOp::Call { dest, callee, args } => {
                        let mut values = Vec::with_capacity(args.len());
                        for arg in args {
                            values.push(match read(&env, *arg)? {
                                Value::Int(value) => value,
                                Value::Array(handle) => handle as i64,
                            });
                        }
                        let Some(handler) = self.call_handler.as_mut() else {
                            return Err(Error::Execution(format!(
                                "call to '{callee}' without a call handler"
                            )));
                        };
                        let result = handler(callee, &values);
                        if let Some(dest) = dest {
                            write(&mut env, *dest, Value::Int(result));
                        }
                    }
                    SsaOp::Jump { target } => next = Some(*target),
                    SsaOp::Branch {
                        condition,
                        true_target,
                        false_target,
                    } => {
                        next = Some(if int(&env, *condition)? != 0 {
                            *true_target
                        } else {
                            *false_target
                        });
                    }
                    SsaOp::Return { value } => {
                        let return_value = value.map(|v| read(&env, v)).transpose()?;
                        return Ok(ExecutionResult {
                            return_value,
                            memory: heap,
                            trace,
                            steps,
                        });
                    }
                }
            }

            let Some(target) = next else {
                return Err(Error::Execution(format!("B{current} fell off its end")));
            };
            previous = Some(current);
            current = target;
        }
    }
}

fn read(env: &[Option<Value>], var: SsaVarId) -> Result<Value> {
    env.get(var.index())
        .copied()
        .flatten()
        .ok_or_else(|| Error::Execution(format!("{var} read before definition")))
}

fn int(env: &[Option<Value>], var: SsaVarId) -> Result<i64> {
    read(env, var)?.as_int()
}

fn write(env: &mut [Option<Value>], var: SsaVarId, value: Value) {
    if let Some(slot) = env.get_mut(var.index()) {
        *slot = Some(value);
    }
}

fn element(
    env: &[Option<Value>],
    heap: &[Vec<i64>],
    base: SsaVarId,
    index: SsaVarId,
) -> Result<(usize, usize)> {
    let array = read(env, base)?.as_array()?;
    let index = int(env, index)?;
    let len = heap.get(array).map_or(0, Vec::len);
    match usize::try_from(index) {
        Ok(slot) if slot < len => Ok((array, slot)),
        _ => Err(Error::Execution(format!(
            "index {index} out of bounds for array @{array} of length {len}"
        ))),
    }
}
