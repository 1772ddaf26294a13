//! Memory dependence testing between accesses of two loops.
//!
//! Each access is reduced to a base object and an index expression. Indices are
//! rewritten per loop as `base + stride * k` over the normalized iteration number
//! `k` (see [`ScalarEvolution::evolve`]); two accesses touch the same element in
//! iterations `i` (source) and `j` (destination) iff
//!
//! ```text
//! b_src + a_src * i == b_dst + a_dst * j
//! ```
//!
//! With equal strides and a constant offset the equation is solved exactly and
//! yields a distance `j - i`. Otherwise the GCD test can only disprove the
//! dependence; whatever it cannot disprove is reported with
//! [`Direction::Unknown`].
//!
//! # Base objects
//!
//! Function parameters and `alloc` results are distinct objects. Two accesses
//! through different such roots never alias; accesses through the same variable
//! always do; anything else may.

use std::fmt;

use crate::{
    analysis::{
        cfg::{LoopForest, LoopInfo},
        scev::{gcd, LinearEvolution, ScalarEvolution},
        ssa::{DefSite, MemoryEffects, SsaFunction, SsaOp, SsaVarId},
    },
    utils::graph::NodeId,
};

/// Position of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrRef {
    /// Block holding the instruction.
    pub block: NodeId,
    /// Index within the block's instruction list.
    pub index: usize,
}

impl fmt::Display for InstrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.index)
    }
}

/// One memory-touching instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccess {
    /// Where the instruction is.
    pub site: InstrRef,
    /// Whether it reads, writes or both.
    pub effects: MemoryEffects,
    /// Array accessed, `None` for opaque calls.
    pub base: Option<SsaVarId>,
    /// Element index, `None` for opaque calls.
    pub index: Option<SsaVarId>,
}

impl MemoryAccess {
    /// Returns `true` if the access may write memory.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.effects.contains(MemoryEffects::WRITE)
    }

    /// Returns `true` if the access may read memory.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.effects.contains(MemoryEffects::READ)
    }

    /// Returns `true` for an opaque call.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.base.is_none()
    }
}

/// Classification of a dependence from a source access to a later destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependenceKind {
    /// Write then read (true dependence).
    Flow,
    /// Read then write.
    Anti,
    /// Write then write.
    Output,
    /// An opaque call is involved.
    Unknown,
}

/// Relative iteration order of the two conflicting accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Same iteration.
    Equal,
    /// The destination conflicts with a source from an earlier iteration.
    Forward,
    /// The destination conflicts with a source from a later iteration.
    Backward,
    /// Not determined.
    Unknown,
}

/// A possible dependence between two accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependence {
    /// Dependence kind.
    pub kind: DependenceKind,
    /// Iteration direction.
    pub direction: Direction,
    /// `j - i` when it is a single known value.
    pub distance: Option<i64>,
}

impl Dependence {
    fn unknown(kind: DependenceKind) -> Self {
        Self {
            kind,
            direction: Direction::Unknown,
            distance: None,
        }
    }

    /// Returns `true` if the dependence only relates accesses of the same
    /// iteration.
    #[must_use]
    pub fn is_loop_independent(&self) -> bool {
        self.direction == Direction::Equal
    }
}

/// Alias relation between two base objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    /// Never the same object.
    NoAlias,
    /// Always the same object.
    MustAlias,
    /// Possibly the same object.
    MayAlias,
}

/// Dependence queries over one function.
pub struct DependenceAnalysis<'a> {
    ssa: &'a SsaFunction,
    scev: ScalarEvolution<'a>,
}

impl<'a> DependenceAnalysis<'a> {
    /// Creates the analysis.
    #[must_use]
    pub fn new(ssa: &'a SsaFunction, forest: &'a LoopForest) -> Self {
        Self {
            ssa,
            scev: ScalarEvolution::new(ssa, forest),
        }
    }

    /// Collects the memory accesses of every block of `loop_info` in block order.
    #[must_use]
    pub fn accesses(&self, loop_info: &LoopInfo) -> Vec<MemoryAccess> {
        let mut accesses = Vec::new();
        for &block in &loop_info.body {
            let Some(ssa_block) = self.ssa.block(block.index()) else {
                continue;
            };
            for (index, op) in ssa_block.instructions().iter().enumerate() {
                let effects = op.memory_effects();
                if effects.is_empty() {
                    continue;
                }
                let (base, index_var) = match op {
                    SsaOp::Load { base, index, .. } | SsaOp::Store { base, index, .. } => {
                        (Some(*base), Some(*index))
                    }
                    _ => (None, None),
                };
                accesses.push(MemoryAccess {
                    site: InstrRef { block, index },
                    effects,
                    base,
                    index: index_var,
                });
            }
        }
        accesses
    }

    /// Relates two base objects.
    #[must_use]
    pub fn alias(&self, a: SsaVarId, b: SsaVarId) -> AliasResult {
        if a == b {
            return AliasResult::MustAlias;
        }
        if self.is_identified_object(a) && self.is_identified_object(b) {
            AliasResult::NoAlias
        } else {
            AliasResult::MayAlias
        }
    }

    fn is_identified_object(&self, var: SsaVarId) -> bool {
        match self.ssa.definition(var) {
            Some(DefSite::Param(_)) => true,
            Some(DefSite::Instruction { .. }) => {
                matches!(self.ssa.defining_op(var), Some(SsaOp::Alloc { .. }))
            }
            _ => false,
        }
    }

    /// Tests whether `dst` (in `dst_loop`, executed after all of `src_loop`)
    /// may touch the element `src` touches.
    ///
    /// Returns `None` when no dependence exists, including for read/read pairs.
    #[must_use]
    pub fn depends(
        &self,
        src: &MemoryAccess,
        src_loop: &LoopInfo,
        dst: &MemoryAccess,
        dst_loop: &LoopInfo,
    ) -> Option<Dependence> {
        let kind = match (src.is_write(), dst.is_write()) {
            (false, false) => return None,
            _ if src.is_opaque() || dst.is_opaque() => DependenceKind::Unknown,
            (true, true) => DependenceKind::Output,
            (true, false) => DependenceKind::Flow,
            (false, true) => DependenceKind::Anti,
        };

        let (Some(src_base), Some(dst_base), Some(src_index), Some(dst_index)) =
            (src.base, dst.base, src.index, dst.index)
        else {
            return Some(Dependence::unknown(kind));
        };

        match self.alias(src_base, dst_base) {
            AliasResult::NoAlias => return None,
            AliasResult::MayAlias => return Some(Dependence::unknown(kind)),
            AliasResult::MustAlias => {}
        }

        let src_evolution = self
            .scev
            .evolve(&self.scev.affine(src_index), src_loop);
        let dst_evolution = self
            .scev
            .evolve(&self.scev.affine(dst_index), dst_loop);
        let (Some(src_evolution), Some(dst_evolution)) = (src_evolution, dst_evolution) else {
            return Some(Dependence::unknown(kind));
        };

        log::trace!(
            "dependence {} -> {}: ({}) + {}k vs ({}) + {}k",
            src.site,
            dst.site,
            src_evolution.base,
            src_evolution.stride,
            dst_evolution.base,
            dst_evolution.stride
        );

        solve(kind, &src_evolution, &dst_evolution)
    }
}

/// Solves `src.base + src.stride * i == dst.base + dst.stride * j`.
fn solve(
    kind: DependenceKind,
    src: &LinearEvolution,
    dst: &LinearEvolution,
) -> Option<Dependence> {
    let Some(offset) = src
        .base
        .checked_sub(&dst.base)
        .and_then(|delta| delta.as_constant())
    else {
        return Some(Dependence::unknown(kind));
    };

    if src.stride == dst.stride {
        let stride = src.stride;
        if stride == 0 {
            // every iteration touches one fixed element
            return (offset == 0).then(|| Dependence::unknown(kind));
        }
        // stride * (j - i) == offset
        let (Some(remainder), Some(distance)) =
            (offset.checked_rem(stride), offset.checked_div(stride))
        else {
            return Some(Dependence::unknown(kind));
        };
        if remainder != 0 {
            return None;
        }
        let direction = match distance {
            0 => Direction::Equal,
            d if d > 0 => Direction::Forward,
            _ => Direction::Backward,
        };
        return Some(Dependence {
            kind,
            direction,
            distance: Some(distance),
        });
    }

    // dst.stride * j - src.stride * i == offset
    let divisor = gcd(src.stride.unsigned_abs(), dst.stride.unsigned_abs());
    if divisor != 0 && offset.unsigned_abs() % divisor != 0 {
        return None;
    }
    Some(Dependence::unknown(kind))
}
