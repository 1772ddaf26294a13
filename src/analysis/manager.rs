//! Per-function memoization of the analyses the fusion checks query.
//!
//! The manager never borrows the function: every query takes the current
//! [`SsaFunction`] and loop forest, computes on a miss and remembers the answer.
//! Answers stay valid only while the function is unchanged, so any mutation must
//! be followed by [`AnalysisManager::invalidate`], which drops everything at once.
//!
//! ```rust,ignore
//! let mut analyses = AnalysisManager::new();
//! let equal = analyses
//!     .trip_count(&ssa, &forest, prev)
//!     .provably_equal(&analyses.trip_count(&ssa, &forest, next));
//! // ... merge ...
//! analyses.invalidate();
//! ```

use std::sync::OnceLock;

use dashmap::DashMap;

use crate::{
    analysis::{
        cfg::{LoopForest, LoopId, LoopInfo},
        dependence::{Dependence, DependenceAnalysis, InstrRef, MemoryAccess},
        scev::{ScalarEvolution, TripCount},
        ssa::{SsaCfg, SsaFunction},
    },
    utils::graph::{algorithms::DominatorTree, NodeId},
};

/// Memoizing analysis cache scoped to one function invocation.
#[derive(Debug, Default)]
pub struct AnalysisManager {
    /// Dominator tree (lazily computed on first access).
    dominators: OnceLock<DominatorTree>,
    /// Post-dominator tree (lazily computed on first access).
    post_dominators: OnceLock<DominatorTree>,
    /// Trip counts keyed by loop header.
    trip_counts: DashMap<NodeId, TripCount>,
    /// Memory accesses keyed by loop header.
    accesses: DashMap<NodeId, Vec<MemoryAccess>>,
    /// Dependence answers keyed by (source, destination) site.
    dependences: DashMap<(InstrRef, InstrRef), Option<Dependence>>,
    /// Number of times the cache was dropped.
    invalidations: usize,
}

impl AnalysisManager {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dominator tree of `ssa`.
    pub fn dominators(&self, ssa: &SsaFunction) -> &DominatorTree {
        self.dominators
            .get_or_init(|| SsaCfg::from_ssa(ssa).dominators())
    }

    /// Returns the post-dominator tree of `ssa`.
    pub fn post_dominators(&self, ssa: &SsaFunction) -> &DominatorTree {
        self.post_dominators
            .get_or_init(|| SsaCfg::from_ssa(ssa).post_dominators())
    }

    /// Returns `true` if block `a` dominates block `b`.
    pub fn dominates(&self, ssa: &SsaFunction, a: NodeId, b: NodeId) -> bool {
        self.dominators(ssa).dominates(a, b)
    }

    /// Returns `true` if block `a` post-dominates block `b`.
    pub fn post_dominates(&self, ssa: &SsaFunction, a: NodeId, b: NodeId) -> bool {
        self.post_dominators(ssa).dominates(a, b)
    }

    /// Returns the trip count of loop `id`, or [`TripCount::Unknown`] if the loop
    /// no longer exists.
    pub fn trip_count(&self, ssa: &SsaFunction, forest: &LoopForest, id: LoopId) -> TripCount {
        let Some(info) = forest.get(id) else {
            return TripCount::Unknown;
        };
        self.trip_counts
            .entry(info.header)
            .or_insert_with(|| ScalarEvolution::new(ssa, forest).trip_count(info))
            .clone()
    }

    /// Returns the memory accesses of `loop_info`.
    pub fn accesses(
        &self,
        ssa: &SsaFunction,
        forest: &LoopForest,
        loop_info: &LoopInfo,
    ) -> Vec<MemoryAccess> {
        self.accesses
            .entry(loop_info.header)
            .or_insert_with(|| DependenceAnalysis::new(ssa, forest).accesses(loop_info))
            .clone()
    }

    /// Returns the dependence from `src` to `dst`; see
    /// [`DependenceAnalysis::depends`].
    pub fn dependence(
        &self,
        ssa: &SsaFunction,
        forest: &LoopForest,
        src: (&MemoryAccess, &LoopInfo),
        dst: (&MemoryAccess, &LoopInfo),
    ) -> Option<Dependence> {
        *self
            .dependences
            .entry((src.0.site, dst.0.site))
            .or_insert_with(|| {
                DependenceAnalysis::new(ssa, forest).depends(src.0, src.1, dst.0, dst.1)
            })
    }

    /// Drops every cached answer.
    pub fn invalidate(&mut self) {
        self.dominators.take();
        self.post_dominators.take();
        self.trip_counts.clear();
        self.accesses.clear();
        self.dependences.clear();
        self.invalidations += 1;
    }

    /// Returns how many times [`AnalysisManager::invalidate`] ran.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dominators.get().is_none()
            && self.post_dominators.get().is_none()
            && self.trip_counts.is_empty()
            && self.accesses.is_empty()
            && self.dependences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::{CmpKind, SsaFunctionBuilder};

    fn counted() -> SsaFunction {
        SsaFunctionBuilder::new("counted").build_with(|f| {
            let n = f.param();
            let next = f.var();
            let (zero, one) = f.block(0, |b| {
                let c = (b.const_i64(0), b.const_i64(1));
                b.jump(1);
                c
            });
            let i = f.block(1, |b| {
                let i = b.phi(&[(0, zero), (2, next)]);
                let c = b.cmp(CmpKind::Lt, i, n);
                b.branch(c, 2, 3);
                i
            });
            f.block(2, |b| {
                b.add_into(next, i, one);
                b.jump(1);
            });
            f.block(3, |b| b.ret());
        })
    }

    #[test]
    fn test_caches_and_invalidates() {
        let ssa = counted();
        let forest = ssa.analyze_loops();
        let id = forest.top_level_loops()[0];
        let mut analyses = AnalysisManager::new();
        assert!(analyses.is_empty());

        assert!(analyses.trip_count(&ssa, &forest, id).is_known());
        assert!(analyses.dominates(&ssa, NodeId::new(0), NodeId::new(3)));
        assert!(analyses.post_dominates(&ssa, NodeId::new(3), NodeId::new(0)));
        assert!(!analyses.is_empty());

        analyses.invalidate();
        assert!(analyses.is_empty());
        assert_eq!(analyses.invalidations(), 1);
    }

    #[test]
    fn test_erased_loop_has_unknown_trip_count() {
        let ssa = counted();
        let mut forest = ssa.analyze_loops();
        let id = forest.top_level_loops()[0];
        forest.erase(id);
        let analyses = AnalysisManager::new();
        assert_eq!(analyses.trip_count(&ssa, &forest, id), TripCount::Unknown);
    }
}
