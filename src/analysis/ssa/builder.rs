//! Builder pattern for programmatic SSA construction.
//!
//! The builder uses a closure-based API where all blocks are defined within a
//! single expression, which keeps the CFG shape of a test fixture readable:
//!
//! ```rust
//! use loopfuse::analysis::{CmpKind, SsaFunctionBuilder};
//!
//! // for (i = 0; i < n; i++) {}
//! let ssa = SsaFunctionBuilder::new("count").build_with(|f| {
//!     let n = f.param();
//!     let i_next = f.var();
//!     let (zero, one) = f.block(0, |b| {
//!         let consts = (b.const_i64(0), b.const_i64(1));
//!         b.jump(1);
//!         consts
//!     });
//!     let i = f.block(1, |b| {
//!         let i = b.phi(&[(0, zero), (2, i_next)]);
//!         let c = b.cmp(CmpKind::Lt, i, n);
//!         b.branch(c, 2, 3);
//!         i
//!     });
//!     f.block(2, |b| {
//!         b.add_into(i_next, i, one);
//!         b.jump(1);
//!     });
//!     f.block(3, |b| b.ret());
//! });
//! assert!(ssa.validate().is_ok());
//! ```
//!
//! # Variable Management
//!
//! Operations that produce values allocate their result and return it. Values
//! needed before their definition (loop-carried updates feeding a header phi) are
//! reserved with [`SsaFunctionContext::var`] and defined later with one of the
//! `*_into` helpers.

use crate::analysis::ssa::{CmpKind, PhiNode, SsaBlock, SsaFunction, SsaOp, SsaVarId};

/// Builder for constructing SSA functions programmatically.
#[derive(Debug)]
pub struct SsaFunctionBuilder {
    function: SsaFunction,
}

impl SsaFunctionBuilder {
    /// Creates a builder for a function called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: SsaFunction::new(name),
        }
    }

    /// Builds the function using a closure that defines all blocks.
    ///
    /// Block ids that the closure never defines are left as dead (empty) blocks.
    pub fn build_with<F>(mut self, f: F) -> SsaFunction
    where
        F: FnOnce(&mut SsaFunctionContext<'_>),
    {
        let mut ctx = SsaFunctionContext {
            function: &mut self.function,
        };
        f(&mut ctx);
        self.function
    }
}

/// Context passed to the build closure for defining parameters and blocks.
pub struct SsaFunctionContext<'a> {
    function: &'a mut SsaFunction,
}

impl SsaFunctionContext<'_> {
    /// Declares the next function parameter.
    pub fn param(&mut self) -> SsaVarId {
        self.function.add_param()
    }

    /// Reserves a variable id to be defined later.
    #[must_use]
    pub fn var(&mut self) -> SsaVarId {
        self.function.new_var()
    }

    /// Defines block `id` using a closure and returns whatever the closure returns.
    pub fn block<F, R>(&mut self, id: usize, f: F) -> R
    where
        F: FnOnce(&mut SsaBlockBuilder<'_>) -> R,
    {
        let mut builder = SsaBlockBuilder {
            function: &mut *self.function,
            block: SsaBlock::new(id),
        };
        let result = f(&mut builder);
        let SsaBlockBuilder { function, block } = builder;
        function.set_block(block);
        result
    }
}

/// Builder for the contents of a single block.
pub struct SsaBlockBuilder<'a> {
    function: &'a mut SsaFunction,
    block: SsaBlock,
}

impl SsaBlockBuilder<'_> {
    fn emit(&mut self, build: impl FnOnce(SsaVarId) -> SsaOp) -> SsaVarId {
        let dest = self.function.new_var();
        self.block.add_instruction(build(dest));
        dest
    }

    /// Adds: dest = const value
    #[must_use]
    pub fn const_i64(&mut self, value: i64) -> SsaVarId {
        self.emit(|dest| SsaOp::Const { dest, value })
    }

    /// Defines a reserved variable as a constant.
    pub fn const_into(&mut self, dest: SsaVarId, value: i64) {
        self.block.add_instruction(SsaOp::Const { dest, value });
    }

    /// Adds: dest = left + right
    pub fn add(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Add { dest, left, right })
    }

    /// Defines a reserved variable as `left + right`.
    pub fn add_into(&mut self, dest: SsaVarId, left: SsaVarId, right: SsaVarId) {
        self.block.add_instruction(SsaOp::Add { dest, left, right });
    }

    /// Adds: dest = left - right
    pub fn sub(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Sub { dest, left, right })
    }

    /// Defines a reserved variable as `left - right`.
    pub fn sub_into(&mut self, dest: SsaVarId, left: SsaVarId, right: SsaVarId) {
        self.block.add_instruction(SsaOp::Sub { dest, left, right });
    }

    /// Adds: dest = left * right
    pub fn mul(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Mul { dest, left, right })
    }

    /// Adds: dest = left <kind> right
    pub fn cmp(&mut self, kind: CmpKind, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Cmp {
            dest,
            kind,
            left,
            right,
        })
    }

    /// Adds: dest = alloc len
    pub fn alloc(&mut self, len: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Alloc { dest, len })
    }

    /// Adds: dest = base[index]
    pub fn load(&mut self, base: SsaVarId, index: SsaVarId) -> SsaVarId {
        self.emit(|dest| SsaOp::Load { dest, base, index })
    }

    /// Adds: base[index] = value
    pub fn store(&mut self, base: SsaVarId, index: SsaVarId, value: SsaVarId) {
        self.block
            .add_instruction(SsaOp::Store { base, index, value });
    }

    /// Adds: dest = callee(args)
    pub fn call(&mut self, callee: &str, args: &[SsaVarId]) -> SsaVarId {
        self.emit(|dest| SsaOp::Call {
            dest: Some(dest),
            callee: callee.to_string(),
            args: args.to_vec(),
        })
    }

    /// Adds a call whose result is discarded.
    pub fn call_void(&mut self, callee: &str, args: &[SsaVarId]) {
        self.block.add_instruction(SsaOp::Call {
            dest: None,
            callee: callee.to_string(),
            args: args.to_vec(),
        });
    }

    /// Adds a phi node and returns the result variable.
    ///
    /// # Arguments
    ///
    /// * `operands` - Pairs of (predecessor_block_id, value) for each incoming edge
    #[must_use]
    pub fn phi(&mut self, operands: &[(usize, SsaVarId)]) -> SsaVarId {
        let result = self.function.new_var();
        self.phi_into(result, operands);
        result
    }

    /// Adds a phi node defining a reserved variable.
    pub fn phi_into(&mut self, result: SsaVarId, operands: &[(usize, SsaVarId)]) {
        let pairs: Vec<(SsaVarId, usize)> = operands.iter().map(|&(pred, v)| (v, pred)).collect();
        self.block.add_phi(PhiNode::with_operands(result, &pairs));
    }

    /// Adds a raw operation.
    pub fn op(&mut self, op: SsaOp) {
        self.block.add_instruction(op);
    }

    /// Adds: jump target
    pub fn jump(&mut self, target: usize) {
        self.block.add_instruction(SsaOp::Jump { target });
    }

    /// Adds: branch condition, true_target, false_target
    pub fn branch(&mut self, condition: SsaVarId, true_target: usize, false_target: usize) {
        self.block.add_instruction(SsaOp::Branch {
            condition,
            true_target,
            false_target,
        });
    }

    /// Adds: ret
    pub fn ret(&mut self) {
        self.block.add_instruction(SsaOp::Return { value: None });
    }

    /// Adds: ret value
    pub fn ret_val(&mut self, value: SsaVarId) {
        self.block
            .add_instruction(SsaOp::Return { value: Some(value) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_function() {
        let ssa = SsaFunctionBuilder::new("sum").build_with(|f| {
            let (a, b) = (f.param(), f.param());
            f.block(0, |blk| {
                let sum = blk.add(a, b);
                blk.ret_val(sum);
            });
        });

        assert_eq!(ssa.params().len(), 2);
        assert_eq!(ssa.block_count(), 1);
        assert_eq!(ssa.block(0).map(|b| b.instructions().len()), Some(2));
        assert!(ssa.validate().is_ok());
    }

    #[test]
    fn test_gaps_become_dead_blocks() {
        let ssa = SsaFunctionBuilder::new("gap").build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });

        assert_eq!(ssa.block_count(), 3);
        assert_eq!(ssa.live_block_count(), 2);
        assert!(!ssa.is_live(1));
    }

    #[test]
    fn test_phi_operand_order() {
        let ssa = SsaFunctionBuilder::new("phi").build_with(|f| {
            let x = f.param();
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                let p = b.phi(&[(0, x)]);
                b.ret_val(p);
            });
        });

        let phi = &ssa.block(1).expect("block").phi_nodes()[0];
        assert_eq!(phi.operand_from(0).map(|op| op.value), Some(ssa.params()[0]));
    }
}
