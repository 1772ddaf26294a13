//! Scalar evolution: affine expressions, add-recurrences and trip counts.
//!
//! # Model
//!
//! Every integer value is expanded into an [`AffineExpr`], a constant plus a
//! weighted sum of *atoms* (SSA variables the expansion does not look through:
//! parameters, phis, loads, calls). A header phi that advances by a constant each
//! iteration is an add-recurrence `{start, +, step}<header>`, described by
//! [`Recurrence`].
//!
//! Substituting every recurrence of a loop by `start + step * k` rewrites an
//! expression as a function of the normalized iteration number `k`; see
//! [`ScalarEvolution::evolve`]. Trip counts and dependence distances are both
//! derived from that form.
//!
//! # Trip counts
//!
//! For a header that exits through `branch (L <kind> R)`, the continue condition
//! becomes `D(k) <kind'> 0` with `D(k) = L(k) - R(k) = d0 + ds * k`. The number
//! of iterations is then `max(0, ceil(numerator / divisor))`:
//!
//! | continue while | requires | numerator | divisor |
//! |----------------|----------|-----------|---------|
//! | `D < 0`  | `ds > 0` | `-d0`     | `ds`  |
//! | `D <= 0` | `ds > 0` | `1 - d0`  | `ds`  |
//! | `D > 0`  | `ds < 0` | `d0`      | `-ds` |
//! | `D >= 0` | `ds < 0` | `d0 + 1`  | `-ds` |
//! | `D != 0` | `ds = 1`, constant `d0 <= 0` | `-d0` | `1` |
//! | `D != 0` | `ds = -1`, constant `d0 >= 0`| `d0`  | `1` |
//!
//! Values wrap at 64 bits, so a `!=` loop whose start lies past the bound runs
//! until the counter wraps around. Its count is only known when `d0` is a
//! constant on the right side of zero.
//!
//! Any other shape is [`TripCount::Unknown`].

use std::{collections::BTreeMap, fmt};

use crate::{
    analysis::{
        cfg::{LoopForest, LoopInfo},
        ssa::{CmpKind, DefSite, PhiOperand, SsaFunction, SsaOp, SsaVarId},
    },
    utils::graph::NodeId,
};

/// Expansion stops at this depth and treats the value as an atom.
const MAX_EXPANSION_DEPTH: usize = 16;

/// `constant + sum(coefficient * atom)` with zero coefficients dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AffineExpr {
    constant: i64,
    terms: BTreeMap<SsaVarId, i64>,
}

impl AffineExpr {
    /// Creates a constant expression.
    #[must_use]
    pub fn constant(value: i64) -> Self {
        Self {
            constant: value,
            terms: BTreeMap::new(),
        }
    }

    /// Creates the expression `1 * var`.
    #[must_use]
    pub fn var(var: SsaVarId) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(var, 1);
        Self { constant: 0, terms }
    }

    /// Returns the constant term.
    #[must_use]
    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    /// Returns the non-zero `(atom, coefficient)` terms in atom order.
    pub fn terms(&self) -> impl Iterator<Item = (SsaVarId, i64)> + '_ {
        self.terms.iter().map(|(&v, &c)| (v, c))
    }

    /// Returns the coefficient of `var` (0 if absent).
    #[must_use]
    pub fn coefficient(&self, var: SsaVarId) -> i64 {
        self.terms.get(&var).copied().unwrap_or(0)
    }

    /// Returns the value if the expression has no atoms.
    #[must_use]
    pub fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    /// Returns `self + other`, or `None` on overflow.
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut result = self.clone();
        result.constant = result.constant.checked_add(other.constant)?;
        for (&var, &coeff) in &other.terms {
            let entry = result.terms.entry(var).or_insert(0);
            *entry = entry.checked_add(coeff)?;
            if *entry == 0 {
                result.terms.remove(&var);
            }
        }
        Some(result)
    }

    /// Returns `self - other`, or `None` on overflow.
    #[must_use]
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    /// Returns `factor * self`, or `None` on overflow.
    #[must_use]
    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        if factor == 0 {
            return Some(Self::default());
        }
        let mut terms = BTreeMap::new();
        for (&var, &coeff) in &self.terms {
            terms.insert(var, coeff.checked_mul(factor)?);
        }
        Some(Self {
            constant: self.constant.checked_mul(factor)?,
            terms,
        })
    }

    /// Greatest common divisor of the constant and every coefficient (0 for the
    /// zero expression).
    #[must_use]
    pub fn content(&self) -> u64 {
        self.terms
            .values()
            .fold(self.constant.unsigned_abs(), |acc, c| gcd(acc, c.unsigned_abs()))
    }

    fn exact_div(&self, divisor: i64) -> Self {
        Self {
            constant: self.constant / divisor,
            terms: self
                .terms
                .iter()
                .map(|(&v, &c)| (v, c / divisor))
                .collect(),
        }
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, coeff) in self.terms() {
            let sign = if coeff < 0 { "-" } else { "+" };
            let magnitude = coeff.unsigned_abs();
            if first {
                if coeff < 0 {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {sign} ")?;
            }
            if magnitude == 1 {
                write!(f, "{var}")?;
            } else {
                write!(f, "{magnitude}*{var}")?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", self.constant.unsigned_abs())
        } else {
            Ok(())
        }
    }
}

/// Greatest common divisor.
#[must_use]
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// The add-recurrence `{start, +, step}<header>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recurrence {
    /// Value on entry to the loop.
    pub start: AffineExpr,
    /// Constant added on every iteration (never 0).
    pub step: i64,
    /// Header of the loop the recurrence belongs to.
    pub header: NodeId,
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, +, {}}}<{}>", self.start, self.step, self.header)
    }
}

/// A header phi that merges one value from outside the loop with one value
/// computed inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionVar {
    /// The phi node result variable at the loop header.
    pub phi_result: SsaVarId,
    /// The initial value.
    pub init_value: SsaVarId,
    /// The block providing the initial value.
    pub init_block: NodeId,
    /// The updated value.
    pub update_value: SsaVarId,
    /// The block providing the updated value.
    pub update_block: NodeId,
    /// The constant added per iteration, if the update is `phi + c`.
    pub stride: Option<i64>,
}

/// An expression as a function of the normalized iteration number `k`:
/// `base + stride * k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearEvolution {
    /// Value in the first iteration (loop invariant).
    pub base: AffineExpr,
    /// Change per iteration.
    pub stride: i64,
}

/// Closed-form number of body executions: `max(0, ceil(numerator / divisor))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripCountExpr {
    numerator: AffineExpr,
    divisor: u64,
}

impl TripCountExpr {
    /// Creates a normalized expression. Returns `None` for a zero divisor.
    #[must_use]
    pub fn new(numerator: AffineExpr, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        let common = gcd(numerator.content(), divisor);
        if common > 1 {
            let common_signed = i64::try_from(common).ok()?;
            return Some(Self {
                numerator: numerator.exact_div(common_signed),
                divisor: divisor / common,
            });
        }
        Some(Self { numerator, divisor })
    }

    /// Returns the numerator.
    #[must_use]
    pub fn numerator(&self) -> &AffineExpr {
        &self.numerator
    }

    /// Returns the divisor.
    #[must_use]
    pub fn divisor(&self) -> u64 {
        self.divisor
    }

    /// Returns the iteration count when the numerator is constant.
    #[must_use]
    pub fn as_constant(&self) -> Option<u64> {
        let numerator = self.numerator.as_constant()?;
        if numerator <= 0 {
            return Some(0);
        }
        Some(numerator.unsigned_abs().div_ceil(self.divisor))
    }

    /// Returns `true` if both expressions denote the same count for every
    /// assignment of their atoms.
    #[must_use]
    pub fn provably_equal(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        matches!((self.as_constant(), other.as_constant()), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for TripCountExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.divisor == 1 {
            write!(f, "max(0, {})", self.numerator)
        } else {
            write!(f, "max(0, ceil(({}) / {}))", self.numerator, self.divisor)
        }
    }
}

/// Result of a trip-count query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TripCount {
    /// Closed form found.
    Known(TripCountExpr),
    /// The count cannot be represented.
    Unknown,
}

impl TripCount {
    /// Returns `true` only when both counts are known and provably equal.
    #[must_use]
    pub fn provably_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (TripCount::Known(a), TripCount::Known(b)) => a.provably_equal(b),
            _ => false,
        }
    }

    /// Returns `true` for a known count.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, TripCount::Known(_))
    }
}

impl fmt::Display for TripCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripCount::Known(expr) => write!(f, "{expr}"),
            TripCount::Unknown => write!(f, "unknown"),
        }
    }
}

/// Scalar evolution queries over one function and its loop forest.
///
/// Borrowed and stateless: build one whenever the function changed.
pub struct ScalarEvolution<'a> {
    ssa: &'a SsaFunction,
    forest: &'a LoopForest,
}

impl<'a> ScalarEvolution<'a> {
    /// Creates the analysis.
    #[must_use]
    pub fn new(ssa: &'a SsaFunction, forest: &'a LoopForest) -> Self {
        Self { ssa, forest }
    }

    /// Expands `var` into an affine expression.
    #[must_use]
    pub fn affine(&self, var: SsaVarId) -> AffineExpr {
        self.expand(var, 0)
    }

    fn expand(&self, var: SsaVarId, depth: usize) -> AffineExpr {
        if depth >= MAX_EXPANSION_DEPTH {
            return AffineExpr::var(var);
        }
        let expanded = match self.ssa.defining_op(var) {
            Some(SsaOp::Const { value, .. }) => Some(AffineExpr::constant(*value)),
            Some(SsaOp::Add { left, right, .. }) => self
                .expand(*left, depth + 1)
                .checked_add(&self.expand(*right, depth + 1)),
            Some(SsaOp::Sub { left, right, .. }) => self
                .expand(*left, depth + 1)
                .checked_sub(&self.expand(*right, depth + 1)),
            Some(SsaOp::Mul { left, right, .. }) => {
                let (l, r) = (self.expand(*left, depth + 1), self.expand(*right, depth + 1));
                match (l.as_constant(), r.as_constant()) {
                    (_, Some(c)) => l.checked_scale(c),
                    (Some(c), None) => r.checked_scale(c),
                    (None, None) => None,
                }
            }
            _ => None,
        };
        expanded.unwrap_or_else(|| AffineExpr::var(var))
    }

    /// Returns `true` if `var` is not defined inside `loop_info`.
    #[must_use]
    pub fn is_invariant(&self, var: SsaVarId, loop_info: &LoopInfo) -> bool {
        match self.ssa.definition(var).and_then(DefSite::block) {
            Some(block) => !loop_info.contains(NodeId::new(block)),
            None => true,
        }
    }

    /// Returns the header phis of `loop_info` shaped as induction variables.
    #[must_use]
    pub fn induction_vars(&self, loop_info: &LoopInfo) -> Vec<InductionVar> {
        let Some(header) = self.ssa.block(loop_info.header.index()) else {
            return Vec::new();
        };

        header
            .phi_nodes()
            .iter()
            .filter_map(|phi| {
                let (inside, outside): (Vec<&PhiOperand>, Vec<&PhiOperand>) = phi
                    .operands()
                    .iter()
                    .partition(|op| loop_info.contains(NodeId::new(op.predecessor)));
                let ([init], [update]) = (outside.as_slice(), inside.as_slice()) else {
                    return None;
                };
                let stride = self
                    .affine(update.value)
                    .checked_sub(&AffineExpr::var(phi.result()))
                    .and_then(|diff| diff.as_constant());
                Some(InductionVar {
                    phi_result: phi.result(),
                    init_value: init.value,
                    init_block: NodeId::new(init.predecessor),
                    update_value: update.value,
                    update_block: NodeId::new(update.predecessor),
                    stride,
                })
            })
            .collect()
    }

    /// Derives the add-recurrence of a header phi.
    ///
    /// Returns `None` unless `phi` sits in a loop header, has exactly one
    /// operand from outside the loop and one from inside, and the inside operand
    /// is `phi + step` for a non-zero constant `step`.
    #[must_use]
    pub fn recurrence(&self, phi: SsaVarId) -> Option<Recurrence> {
        let (block, _) = self.ssa.find_phi(phi)?;
        let header = NodeId::new(block);
        let loop_id = self.forest.loop_for_header(header)?;
        let loop_info = self.forest.get(loop_id)?;

        let iv = self
            .induction_vars(loop_info)
            .into_iter()
            .find(|iv| iv.phi_result == phi)?;
        let step = iv.stride.filter(|&s| s != 0)?;

        Some(Recurrence {
            start: self.affine(iv.init_value),
            step,
            header,
        })
    }

    /// Rewrites `expr` as `base + stride * k` for the iterations of `loop_info`.
    ///
    /// Every recurrence of the loop is replaced by `start + step * k`. Returns
    /// `None` if an atom is defined inside the loop and is not one of its
    /// recurrences.
    #[must_use]
    pub fn evolve(&self, expr: &AffineExpr, loop_info: &LoopInfo) -> Option<LinearEvolution> {
        let mut base = AffineExpr::constant(expr.constant_term());
        let mut stride: i64 = 0;

        for (atom, coeff) in expr.terms() {
            if self.is_invariant(atom, loop_info) {
                base = base.checked_add(&AffineExpr::var(atom).checked_scale(coeff)?)?;
                continue;
            }
            let rec = self
                .recurrence(atom)
                .filter(|rec| rec.header == loop_info.header)?;
            base = base.checked_add(&rec.start.checked_scale(coeff)?)?;
            stride = stride.checked_add(rec.step.checked_mul(coeff)?)?;
        }

        Some(LinearEvolution { base, stride })
    }

    /// Computes the trip count of `loop_info`.
    #[must_use]
    pub fn trip_count(&self, loop_info: &LoopInfo) -> TripCount {
        self.compute_trip_count(loop_info)
            .map_or(TripCount::Unknown, TripCount::Known)
    }

    fn compute_trip_count(&self, loop_info: &LoopInfo) -> Option<TripCountExpr> {
        let exit = loop_info.single_exit()?;
        if exit.exiting_block != loop_info.header {
            return None;
        }

        let header = self.ssa.block(loop_info.header.index())?;
        let SsaOp::Branch {
            condition,
            true_target,
            false_target,
        } = header.terminator()?
        else {
            return None;
        };

        let true_inside = loop_info.contains(NodeId::new(*true_target));
        let false_inside = loop_info.contains(NodeId::new(*false_target));
        let SsaOp::Cmp {
            kind, left, right, ..
        } = self.ssa.defining_op(*condition)?
        else {
            return None;
        };
        let kind = match (true_inside, false_inside) {
            (true, false) => *kind,
            (false, true) => kind.negated(),
            _ => return None,
        };

        let difference = self.affine(*left).checked_sub(&self.affine(*right))?;
        let LinearEvolution {
            base: d0,
            stride: ds,
        } = self.evolve(&difference, loop_info)?;

        let (numerator, divisor) = match kind {
            CmpKind::Lt if ds > 0 => (d0.checked_scale(-1)?, ds),
            CmpKind::Le if ds > 0 => (AffineExpr::constant(1).checked_sub(&d0)?, ds),
            CmpKind::Gt if ds < 0 => (d0, ds.checked_neg()?),
            CmpKind::Ge if ds < 0 => (d0.checked_add(&AffineExpr::constant(1))?, ds.checked_neg()?),
            // anything else wraps around before reaching the bound
            CmpKind::Ne if ds == 1 && d0.as_constant().is_some_and(|c| c <= 0) => {
                (d0.checked_scale(-1)?, 1)
            }
            CmpKind::Ne if ds == -1 && d0.as_constant().is_some_and(|c| c >= 0) => (d0, 1),
            _ => return None,
        };

        TripCountExpr::new(numerator, divisor.unsigned_abs())
    }
}
