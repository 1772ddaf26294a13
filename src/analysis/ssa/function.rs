//! SSA function representation.
//!
//! An [`SsaFunction`] owns its blocks, parameters and variable counter. It is the
//! unit every analysis and pass works on.
//!
//! # Block indices are stable
//!
//! Blocks are addressed by position. Removing a block clears it in place instead
//! of shifting the vector, so loop descriptors, phi operands and branch targets
//! that mention other blocks stay valid across transformations. Cleared blocks
//! are *dead* and ignored by the CFG view.
//!
//! # Mutation primitives
//!
//! The loop merger is written entirely against the primitives here:
//!
//! | Primitive | Method |
//! |-----------|--------|
//! | replace branch target | [`SsaBlock::redirect_target`] |
//! | move instructions | [`SsaFunction::move_body_before_terminator`] |
//! | replace all uses | [`SsaFunction::replace_uses`] |
//! | remove a merge node | [`SsaFunction::remove_phi`] |
//! | eliminate unreachable blocks | [`SsaFunction::remove_unreachable_blocks`] |

use std::{collections::HashMap, fmt};

use crate::{
    analysis::{
        cfg::{detect_loops, LoopForest},
        ssa::{DefSite, PhiNode, SsaBlock, SsaCfg, SsaOp, SsaVarId},
    },
    utils::graph::{
        algorithms::{compute_dominators, reachable_from},
        NodeId, RootedGraph,
    },
    Result,
};

/// A function in SSA form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaFunction {
    name: String,
    params: Vec<SsaVarId>,
    blocks: Vec<SsaBlock>,
    var_count: usize,
}

impl SsaFunction {
    /// Creates an empty function.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: Vec::new(),
            var_count: 0,
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter variables in declaration order.
    #[must_use]
    pub fn params(&self) -> &[SsaVarId] {
        &self.params
    }

    /// Declares a new parameter and returns its variable.
    pub fn add_param(&mut self) -> SsaVarId {
        let var = self.new_var();
        self.params.push(var);
        var
    }

    /// Allocates a fresh variable id.
    pub fn new_var(&mut self) -> SsaVarId {
        let var = SsaVarId::new(self.var_count);
        self.var_count += 1;
        var
    }

    /// Returns the number of variable ids allocated so far.
    #[must_use]
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Returns all blocks, dead ones included.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SsaBlock> {
        self.blocks.get(index)
    }

    /// Returns mutable access to the block at `index`.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut SsaBlock> {
        self.blocks.get_mut(index)
    }

    /// Appends a new empty block and returns its index.
    pub fn add_block(&mut self) -> usize {
        let id = self.blocks.len();
        self.blocks.push(SsaBlock::new(id));
        id
    }

    /// Installs `block` at its own index, growing the block list with empty
    /// blocks if needed.
    pub fn set_block(&mut self, block: SsaBlock) {
        let id = block.id();
        while self.blocks.len() <= id {
            let next = self.blocks.len();
            self.blocks.push(SsaBlock::new(next));
        }
        self.blocks[id] = block;
    }

    /// Returns the number of block slots, dead ones included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the block exists and is not dead.
    #[must_use]
    pub fn is_live(&self, index: usize) -> bool {
        self.blocks.get(index).is_some_and(|b| !b.is_empty())
    }

    /// Returns the number of live blocks.
    #[must_use]
    pub fn live_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.is_empty()).count()
    }

    /// Returns the entry block index (always 0).
    #[must_use]
    pub fn entry(&self) -> usize {
        0
    }

    /// Iterates over live blocks together with their indices.
    pub fn iter_blocks(&self) -> impl Iterator<Item = (usize, &SsaBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| !block.is_empty())
    }

    /// Returns every CFG edge `(from, to)` between live blocks, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .iter_blocks()
            .flat_map(|(id, block)| block.successors().into_iter().map(move |s| (id, s)))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Returns the predecessors of `block` among live blocks, in ascending order.
    #[must_use]
    pub fn predecessors(&self, block: usize) -> Vec<usize> {
        self.iter_blocks()
            .filter(|(_, b)| b.successors().contains(&block))
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns where `var` is defined.
    #[must_use]
    pub fn definition(&self, var: SsaVarId) -> Option<DefSite> {
        if let Some(position) = self.params.iter().position(|&p| p == var) {
            return Some(DefSite::Param(position));
        }
        for (id, block) in self.iter_blocks() {
            if block.find_phi_defining(var).is_some() {
                return Some(DefSite::Phi { block: id });
            }
            if let Some(index) = block
                .instructions()
                .iter()
                .position(|op| op.dest() == Some(var))
            {
                return Some(DefSite::Instruction { block: id, index });
            }
        }
        None
    }

    /// Returns the instruction defining `var`, if it is defined by one.
    #[must_use]
    pub fn defining_op(&self, var: SsaVarId) -> Option<&SsaOp> {
        match self.definition(var)? {
            DefSite::Instruction { block, index } => self.blocks[block].instructions().get(index),
            _ => None,
        }
    }

    /// Returns the phi defining `var` together with its block.
    #[must_use]
    pub fn find_phi(&self, var: SsaVarId) -> Option<(usize, &PhiNode)> {
        self.iter_blocks()
            .find_map(|(id, block)| block.find_phi_defining(var).map(|phi| (id, phi)))
    }

    /// Replaces every use of `old` with `new`, phi operands included.
    ///
    /// Returns the number of uses replaced.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        self.blocks
            .iter_mut()
            .map(|block| block.replace_uses(old, new))
            .sum()
    }

    /// Counts the uses of `var` across live blocks.
    #[must_use]
    pub fn use_count(&self, var: SsaVarId) -> usize {
        self.iter_blocks()
            .map(|(_, block)| {
                let in_phis = block
                    .phi_nodes()
                    .iter()
                    .flat_map(PhiNode::used_variables)
                    .filter(|&v| v == var)
                    .count();
                let in_ops = block
                    .instructions()
                    .iter()
                    .flat_map(SsaOp::uses)
                    .filter(|&v| v == var)
                    .count();
                in_phis + in_ops
            })
            .sum()
    }

    /// Removes the phi defining `result` from `block` and returns it.
    pub fn remove_phi(&mut self, block: usize, result: SsaVarId) -> Option<PhiNode> {
        let phis = self.blocks.get_mut(block)?.phi_nodes_mut();
        let position = phis.iter().position(|phi| phi.result() == result)?;
        Some(phis.remove(position))
    }

    /// Moves every non-terminator instruction of `from` to just before the
    /// terminator of `to`, preserving their order. Returns the number moved.
    pub fn move_body_before_terminator(&mut self, from: usize, to: usize) -> usize {
        if from == to || from >= self.blocks.len() || to >= self.blocks.len() {
            return 0;
        }
        let moved = self.blocks[from].take_body();
        let count = moved.len();
        self.blocks[to].insert_before_terminator(moved);
        count
    }

    /// Returns a bitmap of blocks reachable from the entry.
    #[must_use]
    pub fn reachable_blocks(&self) -> Vec<bool> {
        let cfg = SsaCfg::from_ssa(self);
        reachable_from(&cfg, cfg.entry())
    }

    /// Clears every block unreachable from the entry and prunes phi operands that
    /// arrived from a cleared block.
    ///
    /// Returns the indices of the blocks removed.
    pub fn remove_unreachable_blocks(&mut self) -> Vec<usize> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let reachable = self.reachable_blocks();

        let mut removed = Vec::new();
        for (id, block) in self.blocks.iter_mut().enumerate() {
            if !block.is_empty() && !reachable[id] {
                block.clear();
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            for block in &mut self.blocks {
                for phi in block.phi_nodes_mut() {
                    phi.retain_predecessors(|pred| reachable.get(pred).copied().unwrap_or(false));
                }
            }
        }

        removed
    }

    /// Discovers the natural loops of this function.
    #[must_use]
    pub fn analyze_loops(&self) -> LoopForest {
        let cfg = SsaCfg::from_ssa(self);
        let dominators = compute_dominators(&cfg, cfg.entry());
        detect_loops(&cfg, &dominators)
    }

    /// Checks the structural rules every pass relies on.
    ///
    /// - each block's id matches its position
    /// - each live block ends in exactly one terminator, targeting live blocks
    /// - every variable is defined once and every use has a definition
    /// - phi operands correspond one-to-one with the block's predecessors
    /// - in reachable code, every definition dominates its uses
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(malformed_error!("function '{}' has no blocks", self.name));
        }
        if !self.is_live(self.entry()) {
            return Err(malformed_error!("entry block of '{}' is empty", self.name));
        }

        let mut defs: HashMap<SsaVarId, DefSite> = HashMap::new();
        for (position, &param) in self.params.iter().enumerate() {
            defs.insert(param, DefSite::Param(position));
        }

        for (id, block) in self.blocks.iter().enumerate() {
            if block.id() != id {
                return Err(malformed_error!("block at position {} has id {}", id, block.id()));
            }
            if block.is_empty() {
                continue;
            }

            let ops = block.instructions();
            match ops.last() {
                Some(last) if last.is_terminator() => {}
                _ => return Err(malformed_error!("B{} does not end in a terminator", id)),
            }
            if ops[..ops.len() - 1].iter().any(SsaOp::is_terminator) {
                return Err(malformed_error!("B{} has a terminator before its end", id));
            }
            for target in block.successors() {
                if !self.is_live(target) {
                    return Err(malformed_error!("B{} branches to missing block B{}", id, target));
                }
            }

            for phi in block.phi_nodes() {
                if defs.insert(phi.result(), DefSite::Phi { block: id }).is_some() {
                    return Err(malformed_error!("{} is defined more than once", phi.result()));
                }
            }
            for (index, op) in ops.iter().enumerate() {
                if let Some(dest) = op.dest() {
                    if defs
                        .insert(dest, DefSite::Instruction { block: id, index })
                        .is_some()
                    {
                        return Err(malformed_error!("{} is defined more than once", dest));
                    }
                }
            }
        }

        for (id, block) in self.iter_blocks() {
            let mut preds = self.predecessors(id);
            preds.sort_unstable();
            for phi in block.phi_nodes() {
                let mut incoming: Vec<usize> =
                    phi.operands().iter().map(|op| op.predecessor).collect();
                incoming.sort_unstable();
                if incoming != preds {
                    return Err(malformed_error!(
                        "{} in B{} has operands from {:?} but predecessors are {:?}",
                        phi.result(),
                        id,
                        incoming,
                        preds
                    ));
                }
            }
        }

        self.validate_dominance(&defs)
    }

    fn validate_dominance(&self, defs: &HashMap<SsaVarId, DefSite>) -> Result<()> {
        let cfg = SsaCfg::from_ssa(self);
        let dominators = compute_dominators(&cfg, cfg.entry());
        let available = |var: SsaVarId, block: usize, before: usize| -> Result<()> {
            let Some(site) = defs.get(&var) else {
                return Err(malformed_error!("{} is used in B{} but never defined", var, block));
            };
            let ok = match *site {
                DefSite::Param(_) => true,
                DefSite::Phi { block: def } => {
                    dominators.dominates(NodeId::new(def), NodeId::new(block))
                }
                DefSite::Instruction { block: def, index } => {
                    if def == block {
                        index < before
                    } else {
                        dominators.dominates(NodeId::new(def), NodeId::new(block))
                    }
                }
            };
            if ok {
                Ok(())
            } else {
                Err(malformed_error!("use of {} in B{} is not dominated by its definition", var, block))
            }
        };

        for (id, block) in self.iter_blocks() {
            if !dominators.is_reachable(NodeId::new(id)) {
                continue;
            }
            for phi in block.phi_nodes() {
                for operand in phi.operands() {
                    if !dominators.is_reachable(NodeId::new(operand.predecessor)) {
                        continue;
                    }
                    // phi operands are read at the end of the predecessor
                    available(operand.value, operand.predecessor, usize::MAX)?;
                }
            }
            for (index, op) in block.instructions().iter().enumerate() {
                for var in op.uses() {
                    available(var, id, index)?;
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, ") {{")?;
        for (_, block) in self.iter_blocks() {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::ssa::{CmpKind, SsaFunctionBuilder};

    use super::*;

    /// `for i in 0..n {}` plus a stray block 4 that nothing reaches.
    fn counted_loop() -> SsaFunction {
        SsaFunctionBuilder::new("counted").build_with(|f| {
            let n = f.param();
            let i_next = f.var();
            let (zero, one) = f.block(0, |b| {
                let zero = b.const_i64(0);
                let one = b.const_i64(1);
                b.jump(1);
                (zero, one)
            });
            let i = f.block(1, |b| {
                let i = b.phi(&[(0, zero), (2, i_next)]);
                let c = b.cmp(CmpKind::Lt, i, n);
                b.branch(c, 2, 3);
                i
            });
            f.block(2, |b| {
                b.add_into(i_next, i, one);
                b.jump(1);
            });
            f.block(3, |b| b.ret());
            f.block(4, |b| b.jump(3));
        })
    }

    #[test]
    fn test_predecessors_and_edges() {
        let ssa = counted_loop();
        assert_eq!(ssa.predecessors(1), vec![0, 2]);
        assert_eq!(ssa.predecessors(3), vec![1, 4]);
        assert_eq!(ssa.edges(), vec![(0, 1), (1, 2), (1, 3), (2, 1), (4, 3)]);
    }

    #[test]
    fn test_remove_unreachable_blocks() {
        let mut ssa = counted_loop();
        assert!(ssa.validate().is_ok());
        assert_eq!(ssa.live_block_count(), 5);
        assert_eq!(ssa.remove_unreachable_blocks(), vec![4]);
        assert_eq!(ssa.live_block_count(), 4);
        assert!(ssa.block(4).is_some_and(SsaBlock::is_empty));
        assert!(ssa.remove_unreachable_blocks().is_empty());
        assert!(ssa.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_undominated_use() {
        let ssa = SsaFunctionBuilder::new("bad").build_with(|f| {
            let late = f.var();
            f.block(0, |b| {
                let one = b.const_i64(1);
                b.add(late, one);
                b.jump(1);
            });
            f.block(1, |b| {
                b.const_into(late, 4);
                b.ret();
            });
        });
        assert!(matches!(ssa.validate(), Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn test_validate_rejects_phi_from_non_predecessor() {
        let ssa = SsaFunctionBuilder::new("bad_phi").build_with(|f| {
            let zero = f.block(0, |b| {
                let zero = b.const_i64(0);
                b.jump(1);
                zero
            });
            f.block(1, |b| {
                let _ = b.phi(&[(0, zero), (5, zero)]);
                b.ret();
            });
        });
        assert!(ssa.validate().is_err());
    }

    #[test]
    fn test_definition_lookup() {
        let ssa = counted_loop();
        let n = ssa.params()[0];
        assert_eq!(ssa.definition(n), Some(DefSite::Param(0)));
        // n, i_next, zero, one, then the phi
        let (block, phi) = ssa.find_phi(SsaVarId::new(4)).expect("header phi");
        assert_eq!(block, 1);
        assert_eq!(phi.operands().len(), 2);
        assert_eq!(ssa.use_count(n), 1);
        assert!(matches!(
            ssa.defining_op(SsaVarId::new(1)),
            Some(SsaOp::Add { .. })
        ));
    }

    #[test]
    fn test_move_body_before_terminator() {
        let mut ssa = counted_loop();
        assert_eq!(ssa.move_body_before_terminator(2, 0), 1);
        let entry = ssa.block(0).expect("entry");
        assert_eq!(entry.instructions().len(), 4);
        assert!(entry.terminator().is_some());
        assert_eq!(ssa.block(2).map(|b| b.instructions().len()), Some(1));
    }
}
