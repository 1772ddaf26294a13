//! Phi nodes: the merge points of SSA form.
//!
//! A phi node at the head of a block selects one of its operands depending on
//! which predecessor control arrived from:
//!
//! ```text
//! B2:
//!   v3 = phi [v1, B1], [v7, B4]     // v1 on entry from B1, v7 around the back edge
//! ```
//!
//! Loop headers hold the phis that carry values across iterations: the induction
//! variable and any accumulators.

use std::fmt;

use crate::analysis::ssa::SsaVarId;

/// One incoming value of a phi node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhiOperand {
    /// Value flowing in.
    pub value: SsaVarId,
    /// Predecessor block the value arrives from.
    pub predecessor: usize,
}

impl PhiOperand {
    /// Creates a new operand.
    #[must_use]
    pub fn new(value: SsaVarId, predecessor: usize) -> Self {
        Self { value, predecessor }
    }
}

/// A phi node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    result: SsaVarId,
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a phi node without operands.
    #[must_use]
    pub fn new(result: SsaVarId) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }

    /// Creates a phi node from `(value, predecessor)` pairs.
    #[must_use]
    pub fn with_operands(result: SsaVarId, operands: &[(SsaVarId, usize)]) -> Self {
        Self {
            result,
            operands: operands
                .iter()
                .map(|&(value, predecessor)| PhiOperand::new(value, predecessor))
                .collect(),
        }
    }

    /// Returns the variable this phi defines.
    #[must_use]
    pub fn result(&self) -> SsaVarId {
        self.result
    }

    /// Returns the operands.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Returns mutable access to the operands.
    pub fn operands_mut(&mut self) -> &mut Vec<PhiOperand> {
        &mut self.operands
    }

    /// Appends an operand.
    pub fn add_operand(&mut self, operand: PhiOperand) {
        self.operands.push(operand);
    }

    /// Returns the operand arriving from `predecessor`.
    #[must_use]
    pub fn operand_from(&self, predecessor: usize) -> Option<&PhiOperand> {
        self.operands.iter().find(|op| op.predecessor == predecessor)
    }

    /// Returns the values read by this phi.
    pub fn used_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.operands.iter().map(|op| op.value)
    }

    /// Rewrites the incoming-block reference `old` to `new`.
    ///
    /// Returns `true` if an operand was changed.
    pub fn replace_predecessor(&mut self, old: usize, new: usize) -> bool {
        let mut changed = false;
        for operand in &mut self.operands {
            if operand.predecessor == old {
                operand.predecessor = new;
                changed = true;
            }
        }
        changed
    }

    /// Replaces every incoming value `old` with `new`. Returns the number replaced.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut replaced = 0;
        for operand in &mut self.operands {
            if operand.value == old {
                operand.value = new;
                replaced += 1;
            }
        }
        replaced
    }

    /// Drops operands whose predecessor fails `keep`. Returns the number removed.
    pub fn retain_predecessors<F: Fn(usize) -> bool>(&mut self, keep: F) -> usize {
        let before = self.operands.len();
        self.operands.retain(|op| keep(op.predecessor));
        before - self.operands.len()
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi", self.result)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}[{}, B{}]", op.value, op.predecessor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_predecessor_rewrite() {
        let mut phi = PhiNode::with_operands(
            SsaVarId::new(3),
            &[(SsaVarId::new(1), 1), (SsaVarId::new(7), 4)],
        );
        assert!(phi.replace_predecessor(4, 9));
        assert_eq!(phi.operand_from(9).map(|op| op.value), Some(SsaVarId::new(7)));
        assert!(phi.operand_from(4).is_none());
        assert!(!phi.replace_predecessor(4, 2));
    }

    #[test]
    fn test_phi_retain_and_display() {
        let mut phi = PhiNode::with_operands(
            SsaVarId::new(3),
            &[(SsaVarId::new(1), 1), (SsaVarId::new(7), 4)],
        );
        assert_eq!(phi.to_string(), "v3 = phi [v1, B1], [v7, B4]");
        assert_eq!(phi.retain_predecessors(|pred| pred != 1), 1);
        assert_eq!(phi.operands().len(), 1);
        assert_eq!(phi.used_variables().collect::<Vec<_>>(), vec![SsaVarId::new(7)]);
    }
}
