//! SSA operations.
//!
//! [`SsaOp`] is the instruction set of the IR. It is intentionally small: integer
//! arithmetic, signed comparisons, array memory, opaque calls and three
//! terminators. That is enough to express counted loops, their bounds and guards,
//! and the memory traffic whose ordering fusion must preserve.
//!
//! # Instruction Categories
//!
//! | Category | Ops | Pure |
//! |----------|-----|------|
//! | Values | `Const`, `Add`, `Sub`, `Mul`, `Cmp` | yes |
//! | Memory | `Alloc`, `Load`, `Store` | no |
//! | Calls | `Call` | no (reads and writes anything) |
//! | Control | `Jump`, `Branch`, `Return` | terminators |
//!
//! `Alloc` is impure because each execution yields a fresh array; moving or
//! duplicating it would change which array later accesses touch.

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::analysis::ssa::SsaVarId;

bitflags! {
    /// Memory side effects of an operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryEffects: u8 {
        /// The operation may read memory.
        const READ = 0b01;
        /// The operation may write memory.
        const WRITE = 0b10;
    }
}

/// Signed integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum CmpKind {
    /// `left == right`
    Eq,
    /// `left != right`
    Ne,
    /// `left < right`
    Lt,
    /// `left <= right`
    Le,
    /// `left > right`
    Gt,
    /// `left >= right`
    Ge,
}

impl CmpKind {
    /// Returns the predicate with operands exchanged: `a < b` is `b > a`.
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            CmpKind::Eq => CmpKind::Eq,
            CmpKind::Ne => CmpKind::Ne,
            CmpKind::Lt => CmpKind::Gt,
            CmpKind::Le => CmpKind::Ge,
            CmpKind::Gt => CmpKind::Lt,
            CmpKind::Ge => CmpKind::Le,
        }
    }

    /// Returns the logical negation: `!(a < b)` is `a >= b`.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            CmpKind::Eq => CmpKind::Ne,
            CmpKind::Ne => CmpKind::Eq,
            CmpKind::Lt => CmpKind::Ge,
            CmpKind::Le => CmpKind::Gt,
            CmpKind::Gt => CmpKind::Le,
            CmpKind::Ge => CmpKind::Lt,
        }
    }

    /// Evaluates the predicate on concrete values.
    #[must_use]
    pub fn evaluate(self, left: i64, right: i64) -> bool {
        match self {
            CmpKind::Eq => left == right,
            CmpKind::Ne => left != right,
            CmpKind::Lt => left < right,
            CmpKind::Le => left <= right,
            CmpKind::Gt => left > right,
            CmpKind::Ge => left >= right,
        }
    }

    /// Returns the mnemonic used when printing.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpKind::Eq => "eq",
            CmpKind::Ne => "ne",
            CmpKind::Lt => "lt",
            CmpKind::Le => "le",
            CmpKind::Gt => "gt",
            CmpKind::Ge => "ge",
        }
    }
}

/// An SSA operation.
///
/// Block targets are indices into [`SsaFunction::blocks`](crate::analysis::SsaFunction::blocks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaOp {
    /// `dest = value`
    Const {
        /// Result variable.
        dest: SsaVarId,
        /// Constant value.
        value: i64,
    },
    /// `dest = left + right` (wrapping)
    Add {
        /// Result variable.
        dest: SsaVarId,
        /// Left operand.
        left: SsaVarId,
        /// Right operand.
        right: SsaVarId,
    },
    /// `dest = left - right` (wrapping)
    Sub {
        /// Result variable.
        dest: SsaVarId,
        /// Left operand.
        left: SsaVarId,
        /// Right operand.
        right: SsaVarId,
    },
    /// `dest = left * right` (wrapping)
    Mul {
        /// Result variable.
        dest: SsaVarId,
        /// Left operand.
        left: SsaVarId,
        /// Right operand.
        right: SsaVarId,
    },
    /// `dest = (left <kind> right) ? 1 : 0`
    Cmp {
        /// Result variable.
        dest: SsaVarId,
        /// Comparison predicate.
        kind: CmpKind,
        /// Left operand.
        left: SsaVarId,
        /// Right operand.
        right: SsaVarId,
    },
    /// `dest = new [0; len]`
    Alloc {
        /// Result variable (array handle).
        dest: SsaVarId,
        /// Number of elements.
        len: SsaVarId,
    },
    /// `dest = base[index]`
    Load {
        /// Result variable.
        dest: SsaVarId,
        /// Array handle.
        base: SsaVarId,
        /// Element index.
        index: SsaVarId,
    },
    /// `base[index] = value`
    Store {
        /// Array handle.
        base: SsaVarId,
        /// Element index.
        index: SsaVarId,
        /// Stored value.
        value: SsaVarId,
    },
    /// `dest = callee(args...)`, opaque to every analysis.
    Call {
        /// Optional result variable.
        dest: Option<SsaVarId>,
        /// Callee name.
        callee: String,
        /// Arguments.
        args: Vec<SsaVarId>,
    },
    /// Unconditional jump.
    Jump {
        /// Target block.
        target: usize,
    },
    /// Two-way conditional branch on a non-zero condition.
    Branch {
        /// Condition value.
        condition: SsaVarId,
        /// Target when the condition is non-zero.
        true_target: usize,
        /// Target when the condition is zero.
        false_target: usize,
    },
    /// Function return.
    Return {
        /// Optional returned value.
        value: Option<SsaVarId>,
    },
}

impl SsaOp {
    /// Returns the variable defined by this operation, if any.
    #[must_use]
    pub fn dest(&self) -> Option<SsaVarId> {
        match self {
            SsaOp::Const { dest, .. }
            | SsaOp::Add { dest, .. }
            | SsaOp::Sub { dest, .. }
            | SsaOp::Mul { dest, .. }
            | SsaOp::Cmp { dest, .. }
            | SsaOp::Alloc { dest, .. }
            | SsaOp::Load { dest, .. } => Some(*dest),
            SsaOp::Call { dest, .. } => *dest,
            SsaOp::Store { .. } | SsaOp::Jump { .. } | SsaOp::Branch { .. } | SsaOp::Return { .. } => {
                None
            }
        }
    }

    /// Returns the variables read by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        match self {
            SsaOp::Const { .. } | SsaOp::Jump { .. } => Vec::new(),
            SsaOp::Add { left, right, .. }
            | SsaOp::Sub { left, right, .. }
            | SsaOp::Mul { left, right, .. }
            | SsaOp::Cmp { left, right, .. } => vec![*left, *right],
            SsaOp::Alloc { len, .. } => vec![*len],
            SsaOp::Load { base, index, .. } => vec![*base, *index],
            SsaOp::Store { base, index, value } => vec![*base, *index, *value],
            SsaOp::Call { args, .. } => args.clone(),
            SsaOp::Branch { condition, .. } => vec![*condition],
            SsaOp::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Replaces every read of `old` with `new`. Returns the number of operands changed.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut replaced = 0;
        let mut swap = |slot: &mut SsaVarId| {
            if *slot == old {
                *slot = new;
                replaced += 1;
            }
        };

        match self {
            SsaOp::Const { .. } | SsaOp::Jump { .. } => {}
            SsaOp::Add { left, right, .. }
            | SsaOp::Sub { left, right, .. }
            | SsaOp::Mul { left, right, .. }
            | SsaOp::Cmp { left, right, .. } => {
                swap(left);
                swap(right);
            }
            SsaOp::Alloc { len, .. } => swap(len),
            SsaOp::Load { base, index, .. } => {
                swap(base);
                swap(index);
            }
            SsaOp::Store { base, index, value } => {
                swap(base);
                swap(index);
                swap(value);
            }
            SsaOp::Call { args, .. } => {
                for arg in args.iter_mut() {
                    swap(arg);
                }
            }
            SsaOp::Branch { condition, .. } => swap(condition),
            SsaOp::Return { value } => {
                if let Some(value) = value {
                    swap(value);
                }
            }
        }

        replaced
    }

    /// Returns `true` for control-flow operations that end a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            SsaOp::Jump { .. } | SsaOp::Branch { .. } | SsaOp::Return { .. }
        )
    }

    /// Returns the successor block indices of a terminator (empty otherwise).
    ///
    /// A branch whose targets coincide reports the target once.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            SsaOp::Jump { target } => vec![*target],
            SsaOp::Branch {
                true_target,
                false_target,
                ..
            } => {
                if true_target == false_target {
                    vec![*true_target]
                } else {
                    vec![*true_target, *false_target]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Redirects every edge to `old_target` so it leads to `new_target`.
    ///
    /// Returns `true` if any target changed.
    pub fn redirect_target(&mut self, old_target: usize, new_target: usize) -> bool {
        let mut changed = false;
        let mut redirect = |slot: &mut usize| {
            if *slot == old_target {
                *slot = new_target;
                changed = true;
            }
        };

        match self {
            SsaOp::Jump { target } => redirect(target),
            SsaOp::Branch {
                true_target,
                false_target,
                ..
            } => {
                redirect(true_target);
                redirect(false_target);
            }
            _ => {}
        }

        changed
    }

    /// Returns `true` if the operation has no side effects and can be moved or
    /// deleted freely once its operands are available.
    #[must_use]
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            SsaOp::Const { .. }
                | SsaOp::Add { .. }
                | SsaOp::Sub { .. }
                | SsaOp::Mul { .. }
                | SsaOp::Cmp { .. }
        )
    }

    /// Returns the memory side effects of this operation.
    #[must_use]
    pub fn memory_effects(&self) -> MemoryEffects {
        match self {
            SsaOp::Load { .. } => MemoryEffects::READ,
            SsaOp::Store { .. } => MemoryEffects::WRITE,
            SsaOp::Call { .. } => MemoryEffects::READ | MemoryEffects::WRITE,
            _ => MemoryEffects::empty(),
        }
    }
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaOp::Const { dest, value } => write!(f, "{dest} = const {value}"),
            SsaOp::Add { dest, left, right } => write!(f, "{dest} = add {left}, {right}"),
            SsaOp::Sub { dest, left, right } => write!(f, "{dest} = sub {left}, {right}"),
            SsaOp::Mul { dest, left, right } => write!(f, "{dest} = mul {left}, {right}"),
            SsaOp::Cmp {
                dest,
                kind,
                left,
                right,
            } => write!(f, "{dest} = cmp.{} {left}, {right}", kind.mnemonic()),
            SsaOp::Alloc { dest, len } => write!(f, "{dest} = alloc {len}"),
            SsaOp::Load { dest, base, index } => write!(f, "{dest} = load {base}[{index}]"),
            SsaOp::Store { base, index, value } => write!(f, "store {base}[{index}], {value}"),
            SsaOp::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            SsaOp::Jump { target } => write!(f, "jump B{target}"),
            SsaOp::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "branch {condition}, B{true_target}, B{false_target}"),
            SsaOp::Return { value: Some(value) } => write!(f, "ret {value}"),
            SsaOp::Return { value: None } => write!(f, "ret"),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn v(index: usize) -> SsaVarId {
        SsaVarId::new(index)
    }

    #[test]
    fn test_cmp_kind_algebra() {
        for kind in CmpKind::iter() {
            assert_eq!(kind.swapped().swapped(), kind);
            assert_eq!(kind.negated().negated(), kind);
            for (a, b) in [(-3, 4), (4, 4), (9, 2)] {
                assert_eq!(kind.evaluate(a, b), kind.swapped().evaluate(b, a));
                assert_eq!(kind.evaluate(a, b), !kind.negated().evaluate(a, b));
            }
        }
        assert_eq!(CmpKind::COUNT, 6);
    }

    #[test]
    fn test_uses_and_replace() {
        let mut op = SsaOp::Store {
            base: v(1),
            index: v(2),
            value: v(2),
        };
        assert_eq!(op.uses(), vec![v(1), v(2), v(2)]);
        assert_eq!(op.replace_uses(v(2), v(5)), 2);
        assert_eq!(op.uses(), vec![v(1), v(5), v(5)]);
        assert_eq!(op.dest(), None);
    }

    #[test]
    fn test_redirect_target() {
        let mut op = SsaOp::Branch {
            condition: v(0),
            true_target: 3,
            false_target: 7,
        };
        assert!(op.redirect_target(7, 9));
        assert_eq!(op.successors(), vec![3, 9]);
        assert!(!op.redirect_target(7, 1));

        let mut same = SsaOp::Branch {
            condition: v(0),
            true_target: 2,
            false_target: 2,
        };
        assert_eq!(same.successors(), vec![2]);
        assert!(same.redirect_target(2, 4));
        assert_eq!(same.successors(), vec![4]);
    }

    #[test]
    fn test_effects_and_purity() {
        let load = SsaOp::Load {
            dest: v(3),
            base: v(0),
            index: v(1),
        };
        assert_eq!(load.memory_effects(), MemoryEffects::READ);
        assert!(!load.is_pure());

        let call = SsaOp::Call {
            dest: None,
            callee: "opaque".into(),
            args: vec![],
        };
        assert!(call.memory_effects().contains(MemoryEffects::WRITE));

        let add = SsaOp::Add {
            dest: v(2),
            left: v(0),
            right: v(1),
        };
        assert!(add.is_pure());
        assert!(add.memory_effects().is_empty());
        assert!(!add.is_terminator());
        assert!(SsaOp::Return { value: None }.is_terminator());
    }

    #[test]
    fn test_display() {
        let op = SsaOp::Cmp {
            dest: v(4),
            kind: CmpKind::Lt,
            left: v(1),
            right: v(2),
        };
        assert_eq!(op.to_string(), "v4 = cmp.lt v1, v2");
        assert_eq!(SsaOp::Jump { target: 3 }.to_string(), "jump B3");
    }
}
