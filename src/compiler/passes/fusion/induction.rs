//! Induction variable resolution for fusion candidates.

use crate::{
    analysis::{AffineExpr, LoopInfo, Recurrence, ScalarEvolution, SsaFunction, SsaOp, SsaVarId},
    utils::graph::NodeId,
};

/// The induction variable a loop is counted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIv {
    /// The header phi.
    pub phi: SsaVarId,
    /// Its add-recurrence.
    pub recurrence: Recurrence,
    /// `true` if found through the canonical `{0, +, 1}` fast path.
    pub canonical: bool,
}

impl ResolvedIv {
    /// Returns `true` if both variables take the same value in every iteration.
    #[must_use]
    pub fn same_sequence(&self, other: &ResolvedIv) -> bool {
        self.recurrence.step == other.recurrence.step
            && self.recurrence.start == other.recurrence.start
    }
}

/// Resolves the induction variable of `loop_info`.
///
/// A loop in canonical form with a counter starting at constant zero and
/// stepping by one returns that counter directly. Otherwise the header phis are
/// scanned in order and the first one whose recurrence is anchored to this
/// loop's header wins. Returns `None` if no header phi qualifies.
#[must_use]
pub fn resolve_induction_variable(
    ssa: &SsaFunction,
    scev: &ScalarEvolution<'_>,
    loop_info: &LoopInfo,
) -> Option<ResolvedIv> {
    if loop_info.is_canonical() {
        let canonical = scev.induction_vars(loop_info).into_iter().find(|iv| {
            iv.stride == Some(1)
                && matches!(ssa.defining_op(iv.init_value), Some(SsaOp::Const { value: 0, .. }))
        });
        if let Some(iv) = canonical {
            return Some(ResolvedIv {
                phi: iv.phi_result,
                recurrence: Recurrence {
                    start: AffineExpr::constant(0),
                    step: 1,
                    header: loop_info.header,
                },
                canonical: true,
            });
        }
    }

    let header = ssa.block(loop_info.header.index())?;
    header.phi_nodes().iter().find_map(|phi| {
        let recurrence = scev
            .recurrence(phi.result())
            .filter(|rec| rec.header == loop_info.header)?;
        Some(ResolvedIv {
            phi: phi.result(),
            recurrence,
            canonical: false,
        })
    })
}

/// Returns the block holding the phi of `iv`, if it still exists.
#[must_use]
pub fn iv_block(ssa: &SsaFunction, iv: &ResolvedIv) -> Option<NodeId> {
    ssa.find_phi(iv.phi).map(|(block, _)| NodeId::new(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CmpKind, SsaFunctionBuilder};

    /// A loop with a pointer-like phi `p` ahead of its counter; `start` and
    /// `step` shape the counter.
    fn loop_with(start: i64, step: i64, with_counter: bool) -> SsaFunction {
        SsaFunctionBuilder::new("iv").build_with(|f| {
            let a = f.param();
            let n = f.param();
            let i_next = f.var();
            let p_next = f.var();
            let (init, stride, p0) = f.block(0, |b| {
                let init = b.const_i64(start);
                let stride = b.const_i64(step);
                let p0 = b.load(a, init);
                b.jump(1);
                (init, stride, p0)
            });
            let i = f.block(1, |b| {
                // not a recurrence: the update is a load
                let p = b.phi(&[(0, p0), (3, p_next)]);
                let i = with_counter.then(|| b.phi(&[(0, init), (3, i_next)]));
                let bound = b.cmp(CmpKind::Lt, i.unwrap_or(p), n);
                b.branch(bound, 2, 4);
                i
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                match i {
                    Some(i) => b.add_into(i_next, i, stride),
                    None => b.const_into(i_next, 0),
                }
                let v = b.load(a, n);
                b.op(SsaOp::Add {
                    dest: p_next,
                    left: v,
                    right: v,
                });
                b.jump(1);
            });
            f.block(4, |b| b.ret());
        })
    }

    #[test]
    fn test_canonical_fast_path() {
        let ssa = loop_with(0, 1, true);
        let forest = ssa.analyze_loops();
        let (_, info) = forest.iter().next().expect("loop");
        let scev = ScalarEvolution::new(&ssa, &forest);

        let iv = resolve_induction_variable(&ssa, &scev, info).expect("iv");
        assert!(iv.canonical);
        assert_eq!(iv.phi, SsaVarId::new(8));
        assert_eq!(iv.recurrence.step, 1);
        assert_eq!(iv_block(&ssa, &iv), Some(NodeId::new(1)));
    }

    #[test]
    fn test_scan_fallback() {
        let ssa = loop_with(4, -2, true);
        let forest = ssa.analyze_loops();
        let (_, info) = forest.iter().next().expect("loop");
        let scev = ScalarEvolution::new(&ssa, &forest);

        let iv = resolve_induction_variable(&ssa, &scev, info).expect("iv");
        assert!(!iv.canonical);
        assert_eq!(iv.phi, SsaVarId::new(8));
        assert_eq!(iv.recurrence.start, AffineExpr::constant(4));
        assert_eq!(iv.recurrence.step, -2);
    }

    #[test]
    fn test_no_induction_variable() {
        let ssa = loop_with(0, 1, false);
        let forest = ssa.analyze_loops();
        let (_, info) = forest.iter().next().expect("loop");
        let scev = ScalarEvolution::new(&ssa, &forest);

        assert_eq!(resolve_induction_variable(&ssa, &scev, info), None);
    }
}
