//! SSA basic blocks containing phi nodes and instructions.
//!
//! ```text
//! Block B:
//!   // Phi nodes (executed "simultaneously" at block entry)
//!   v3 = phi [v1, B0], [v2, B1]
//!
//!   // Instructions (executed sequentially, last one is the terminator)
//!   v7 = add v3, v5
//!   jump B2
//! ```
//!
//! A block with neither phis nor instructions is *dead*: removing a block from a
//! function clears it in place so that every other block keeps its index.

use std::fmt;

use crate::analysis::ssa::{PhiNode, SsaOp, SsaVarId};

/// An SSA basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaBlock {
    /// Block index (position in the owning function).
    id: usize,
    /// Phi nodes at block entry.
    phi_nodes: Vec<PhiNode>,
    /// Operations in execution order.
    instructions: Vec<SsaOp>,
}

impl SsaBlock {
    /// Creates a new empty block.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Returns the block index.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the phi nodes.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phi_nodes
    }

    /// Returns mutable access to the phi nodes.
    pub fn phi_nodes_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phi_nodes
    }

    /// Returns the instructions.
    #[must_use]
    pub fn instructions(&self) -> &[SsaOp] {
        &self.instructions
    }

    /// Returns mutable access to the instructions.
    pub fn instructions_mut(&mut self) -> &mut Vec<SsaOp> {
        &mut self.instructions
    }

    /// Appends a phi node. Phis always precede every instruction.
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Appends an instruction.
    pub fn add_instruction(&mut self, op: SsaOp) {
        self.instructions.push(op);
    }

    /// Inserts `ops` immediately before the terminator (or at the end if the block
    /// has none).
    pub fn insert_before_terminator(&mut self, ops: impl IntoIterator<Item = SsaOp>) {
        let at = match self.instructions.last() {
            Some(last) if last.is_terminator() => self.instructions.len() - 1,
            _ => self.instructions.len(),
        };
        let tail = self.instructions.split_off(at);
        self.instructions.extend(ops);
        self.instructions.extend(tail);
    }

    /// Removes and returns the instruction at `index`.
    pub fn remove_instruction(&mut self, index: usize) -> Option<SsaOp> {
        (index < self.instructions.len()).then(|| self.instructions.remove(index))
    }

    /// Removes every non-terminator instruction and returns them in order.
    pub fn take_body(&mut self) -> Vec<SsaOp> {
        let keep_last = self
            .instructions
            .last()
            .is_some_and(SsaOp::is_terminator);
        let end = if keep_last {
            self.instructions.len() - 1
        } else {
            self.instructions.len()
        };
        self.instructions.drain(..end).collect()
    }

    /// Returns the non-terminator instructions.
    #[must_use]
    pub fn body(&self) -> &[SsaOp] {
        match self.instructions.last() {
            Some(last) if last.is_terminator() => &self.instructions[..self.instructions.len() - 1],
            _ => &self.instructions,
        }
    }

    /// Returns `true` if the block has neither phis nor instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phi_nodes.is_empty() && self.instructions.is_empty()
    }

    /// Clears the block, turning it into a dead block.
    pub fn clear(&mut self) {
        self.phi_nodes.clear();
        self.instructions.clear();
    }

    /// Returns the terminator, if the last instruction is one.
    #[must_use]
    pub fn terminator(&self) -> Option<&SsaOp> {
        self.instructions.last().filter(|op| op.is_terminator())
    }

    /// Returns the successor block indices.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        self.terminator().map_or_else(Vec::new, SsaOp::successors)
    }

    /// Redirects control flow from `old_target` to `new_target`.
    ///
    /// Returns `true` if any target was changed.
    pub fn redirect_target(&mut self, old_target: usize, new_target: usize) -> bool {
        match self.instructions.last_mut() {
            Some(terminator) if terminator.is_terminator() => {
                terminator.redirect_target(old_target, new_target)
            }
            _ => false,
        }
    }

    /// Replaces all uses of `old_var` with `new_var` in phis and instructions.
    ///
    /// Returns the number of uses replaced.
    pub fn replace_uses(&mut self, old_var: SsaVarId, new_var: SsaVarId) -> usize {
        let mut replaced = 0;
        for phi in &mut self.phi_nodes {
            replaced += phi.replace_uses(old_var, new_var);
        }
        for op in &mut self.instructions {
            replaced += op.replace_uses(old_var, new_var);
        }
        replaced
    }

    /// Returns the phi defining `var`, if it lives in this block.
    #[must_use]
    pub fn find_phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        self.phi_nodes.iter().find(|phi| phi.result() == var)
    }

    /// Returns every variable defined in this block.
    pub fn defined_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.phi_nodes
            .iter()
            .map(PhiNode::result)
            .chain(self.instructions.iter().filter_map(SsaOp::dest))
    }
}

impl fmt::Display for SsaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "B{}:", self.id)?;
        for phi in &self.phi_nodes {
            writeln!(f, "  {phi}")?;
        }
        for op in &self.instructions {
            writeln!(f, "  {op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(index: usize) -> SsaVarId {
        SsaVarId::new(index)
    }

    fn sample() -> SsaBlock {
        let mut block = SsaBlock::new(2);
        block.add_phi(PhiNode::with_operands(v(3), &[(v(1), 1), (v(4), 3)]));
        block.add_instruction(SsaOp::Add {
            dest: v(4),
            left: v(3),
            right: v(2),
        });
        block.add_instruction(SsaOp::Jump { target: 2 });
        block
    }

    #[test]
    fn test_insert_before_terminator() {
        let mut block = sample();
        block.insert_before_terminator([SsaOp::Const {
            dest: v(9),
            value: 1,
        }]);
        assert_eq!(block.instructions().len(), 3);
        assert_eq!(block.instructions()[1].dest(), Some(v(9)));
        assert!(block.terminator().is_some());
    }

    #[test]
    fn test_take_body_keeps_terminator() {
        let mut block = sample();
        let body = block.take_body();
        assert_eq!(body.len(), 1);
        assert_eq!(block.instructions(), &[SsaOp::Jump { target: 2 }]);
        assert!(block.body().is_empty());
    }

    #[test]
    fn test_redirect_and_replace() {
        let mut block = sample();
        assert!(block.redirect_target(2, 5));
        assert_eq!(block.successors(), vec![5]);
        assert_eq!(block.replace_uses(v(3), v(8)), 1);
        assert_eq!(block.replace_uses(v(4), v(6)), 1);
        assert_eq!(
            block.defined_variables().collect::<Vec<_>>(),
            vec![v(3), v(4)]
        );
    }

    #[test]
    fn test_clear_makes_dead() {
        let mut block = sample();
        assert!(!block.is_empty());
        block.clear();
        assert!(block.is_empty());
        assert!(block.terminator().is_none());
        assert!(!block.redirect_target(2, 3));
    }
}
