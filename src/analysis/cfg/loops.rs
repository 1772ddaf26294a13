//! Natural loop detection and the loop-nest registry.
//!
//! # Loop Structure
//!
//! ```text
//!     [guard] ----------------+   <- optional: conditional branch that can skip the loop
//!        |                    |
//!        v                    |
//!     [preheader]             |   <- single entry predecessor, only successor is the header
//!        |                    |
//!        v                    |
//!     [header] <------+       |   <- single entry point, dominates all loop nodes
//!        |   \        |       |
//!        |    v       |       |
//!        |  [body...] |       |
//!        |    |       |       |
//!        |    v       |       |
//!        |  [latch] --+       |   <- back edge source
//!        v                    |
//!     [exit] ---------------->+   <- outside the loop
//! ```
//!
//! # Registry
//!
//! [`LoopForest`] is an arena: loops are addressed by [`LoopId`], and erasing a
//! loop empties its slot without moving any other loop. A `LoopId` held across a
//! transformation therefore either still names the same loop or resolves to
//! `None`; it never silently names a different loop.
//!
//! # Ordering
//!
//! [`LoopForest::top_level_loops`] lists outermost loops in *discovery order*:
//! descending reverse post-order of their headers, i.e. the last loop in program
//! order comes first. Walking the list backwards visits loops in program order.
//!
//! ```rust,ignore
//! use loopfuse::analysis::cfg::detect_loops;
//! use loopfuse::utils::graph::algorithms::compute_dominators;
//!
//! let dominators = compute_dominators(&graph, graph.entry());
//! let forest = detect_loops(&graph, &dominators);
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::utils::graph::{
    algorithms::{reverse_postorder, DominatorTree},
    GraphBase, NodeId, Predecessors, Successors,
};

/// Stable identifier of a loop in a [`LoopForest`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(usize);

impl LoopId {
    /// Creates a loop id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        LoopId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Exit edge information for a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopExit {
    /// The block inside the loop that branches out.
    pub exiting_block: NodeId,
    /// The block outside the loop that is the exit target.
    pub exit_block: NodeId,
}

/// Structural information about one natural loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop nodes).
    pub header: NodeId,

    /// All blocks in the loop, header and nested loops included.
    pub body: BTreeSet<NodeId>,

    /// Back edge sources, ascending.
    pub latches: Vec<NodeId>,

    /// The unique out-of-loop predecessor of the header, if that block's only
    /// successor is the header.
    pub preheader: Option<NodeId>,

    /// Exit edges from the loop.
    pub exits: Vec<LoopExit>,

    /// Block ending in the conditional branch that can skip the loop entirely.
    pub guard: Option<NodeId>,

    /// Loop nesting depth (0 = outermost).
    pub depth: usize,

    /// Enclosing loop, if nested.
    pub parent: Option<LoopId>,

    /// Immediately nested loops.
    pub children: Vec<LoopId>,
}

impl LoopInfo {
    /// Creates a loop containing only its header.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        let mut body = BTreeSet::new();
        body.insert(header);
        Self {
            header,
            body,
            latches: Vec::new(),
            preheader: None,
            exits: Vec::new(),
            guard: None,
            depth: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns the single latch if there is exactly one.
    #[must_use]
    pub fn single_latch(&self) -> Option<NodeId> {
        match self.latches.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// Returns the single exit edge if there is exactly one.
    #[must_use]
    pub fn single_exit(&self) -> Option<LoopExit> {
        match self.exits.as_slice() {
            [exit] => Some(*exit),
            _ => None,
        }
    }

    /// Returns true if the loop has a preheader and a single latch.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.preheader.is_some() && self.latches.len() == 1
    }

    /// Returns true if the header is also an exiting block (pre-tested loop).
    #[must_use]
    pub fn header_is_exiting(&self) -> bool {
        self.exits.iter().any(|e| e.exiting_block == self.header)
    }

    /// Returns true if this is an outermost loop.
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.parent.is_none()
    }
}

/// The loop-nest registry of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopForest {
    loops: Vec<Option<LoopInfo>>,
    top_level: Vec<LoopId>,
}

impl LoopForest {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loop with the given id, or `None` if it was erased.
    #[must_use]
    pub fn get(&self, id: LoopId) -> Option<&LoopInfo> {
        self.loops.get(id.0).and_then(Option::as_ref)
    }

    /// Returns mutable access to the loop with the given id.
    pub fn get_mut(&mut self, id: LoopId) -> Option<&mut LoopInfo> {
        self.loops.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Returns the number of live loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.iter().flatten().count()
    }

    /// Returns true if no live loop remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over live loops with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (LoopId, &LoopInfo)> {
        self.loops
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|l| (LoopId(i), l)))
    }

    /// Returns the outermost loops in discovery order.
    #[must_use]
    pub fn top_level_loops(&self) -> Vec<LoopId> {
        self.top_level.clone()
    }

    /// Returns the loop whose header is `header`.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<LoopId> {
        self.iter()
            .find(|(_, info)| info.header == header)
            .map(|(id, _)| id)
    }

    /// Returns the innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<LoopId> {
        self.iter()
            .filter(|(_, info)| info.contains(block))
            .max_by_key(|(_, info)| info.depth)
            .map(|(id, _)| id)
    }

    /// Returns true if a block is in any loop.
    #[must_use]
    pub fn is_in_loop(&self, block: NodeId) -> bool {
        self.iter().any(|(_, info)| info.contains(block))
    }

    /// Adds `block` to loop `id` and to all its ancestors.
    ///
    /// Returns `false` if the loop does not exist.
    pub fn add_block_to_loop(&mut self, id: LoopId, block: NodeId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let mut current = Some(id);
        while let Some(loop_id) = current {
            match self.get_mut(loop_id) {
                Some(info) => {
                    info.body.insert(block);
                    current = info.parent;
                }
                None => break,
            }
        }
        true
    }

    /// Removes `block` from loop `id` only. Returns `true` if it was a member.
    pub fn remove_block_from_loop(&mut self, id: LoopId, block: NodeId) -> bool {
        self.get_mut(id).is_some_and(|info| info.body.remove(&block))
    }

    /// Makes `child` a direct child of `new_parent`, fixing depths of the moved
    /// subtree.
    pub fn reparent(&mut self, child: LoopId, new_parent: LoopId) {
        let old_parent = self.get(child).and_then(|info| info.parent);
        if let Some(old) = old_parent {
            if let Some(info) = self.get_mut(old) {
                info.children.retain(|&c| c != child);
            }
        } else {
            self.top_level.retain(|&c| c != child);
        }

        let parent_depth = self.get(new_parent).map_or(0, |info| info.depth);
        if let Some(info) = self.get_mut(new_parent) {
            if !info.children.contains(&child) {
                info.children.push(child);
            }
        }
        if let Some(info) = self.get_mut(child) {
            info.parent = Some(new_parent);
        }
        self.set_depth(child, parent_depth + 1);
    }

    fn set_depth(&mut self, id: LoopId, depth: usize) {
        let mut stack = vec![(id, depth)];
        while let Some((loop_id, depth)) = stack.pop() {
            if let Some(info) = self.get_mut(loop_id) {
                info.depth = depth;
                stack.extend(info.children.iter().map(|&c| (c, depth + 1)));
            }
        }
    }

    /// Erases loop `id` from the registry.
    ///
    /// The slot is emptied, the loop is unlinked from its parent or from the
    /// top-level list, and any remaining children are promoted to the erased
    /// loop's parent. Returns the erased descriptor.
    pub fn erase(&mut self, id: LoopId) -> Option<LoopInfo> {
        let info = self.loops.get_mut(id.0)?.take()?;

        match info.parent {
            Some(parent) => {
                if let Some(parent_info) = self.get_mut(parent) {
                    parent_info.children.retain(|&c| c != id);
                }
            }
            None => self.top_level.retain(|&c| c != id),
        }

        for &child in &info.children {
            match info.parent {
                Some(parent) => self.reparent(child, parent),
                None => {
                    if let Some(child_info) = self.get_mut(child) {
                        child_info.parent = None;
                    }
                    self.top_level.push(child);
                    self.set_depth(child, 0);
                }
            }
        }

        Some(info)
    }

    /// Removes `blocks` from every loop body, latch list and exit list.
    pub fn prune_blocks(&mut self, blocks: &[NodeId]) {
        for info in self.loops.iter_mut().flatten() {
            for block in blocks {
                info.body.remove(block);
            }
            info.latches.retain(|l| !blocks.contains(l));
            info.exits
                .retain(|e| !blocks.contains(&e.exiting_block) && !blocks.contains(&e.exit_block));
            if info.preheader.is_some_and(|p| blocks.contains(&p)) {
                info.preheader = None;
            }
            if info.guard.is_some_and(|g| blocks.contains(&g)) {
                info.guard = None;
            }
        }
    }
}

/// Detects all natural loops in a graph using dominance-based back edge detection.
///
/// # Algorithm
///
/// 1. Finds back edges using dominance (n → h where h dominates n)
/// 2. For each back edge, computes the natural loop body
/// 3. Computes preheaders, exits and guards
/// 4. Establishes nesting relationships and discovery order
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut loops_by_header: HashMap<NodeId, LoopInfo> = HashMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let loop_info = loops_by_header
                    .entry(succ)
                    .or_insert_with(|| LoopInfo::new(succ));
                if !loop_info.latches.contains(&node) {
                    loop_info.latches.push(node);
                }
                expand_loop_body(graph, loop_info, node);
            }
        }
    }

    for loop_info in loops_by_header.values_mut() {
        loop_info.latches.sort_unstable();
        compute_preheader(graph, loop_info);
        compute_exits(graph, loop_info);
        loop_info.guard = compute_guard(graph, loop_info);
    }

    // Discovery order: descending reverse post-order of the header.
    let rpo = reverse_postorder(graph, dominators.root());
    let mut rpo_index = vec![usize::MAX; graph.node_count()];
    for (position, node) in rpo.iter().enumerate() {
        rpo_index[node.index()] = position;
    }
    let mut loops: Vec<LoopInfo> = loops_by_header.into_values().collect();
    loops.sort_by_key(|l| std::cmp::Reverse(rpo_index[l.header.index()]));

    let mut forest = LoopForest {
        loops: loops.into_iter().map(Some).collect(),
        top_level: Vec::new(),
    };
    compute_nesting(&mut forest);
    forest
}

/// Expands the loop body to include all nodes that can reach the latch
/// without passing through the header.
fn expand_loop_body<G>(graph: &G, loop_info: &mut LoopInfo, latch: NodeId)
where
    G: Predecessors,
{
    let mut worklist = vec![latch];

    while let Some(node) = worklist.pop() {
        if loop_info.body.insert(node) {
            for pred in graph.predecessors(node) {
                if pred != loop_info.header && !loop_info.body.contains(&pred) {
                    worklist.push(pred);
                }
            }
        }
    }
}

fn compute_preheader<G>(graph: &G, loop_info: &mut LoopInfo)
where
    G: Successors + Predecessors,
{
    let outside: BTreeSet<NodeId> = graph
        .predecessors(loop_info.header)
        .filter(|pred| !loop_info.body.contains(pred))
        .collect();

    loop_info.preheader = match outside.iter().next() {
        Some(&pred) if outside.len() == 1 && graph.successors(pred).count() == 1 => Some(pred),
        _ => None,
    };
}

fn compute_exits<G>(graph: &G, loop_info: &mut LoopInfo)
where
    G: Successors,
{
    loop_info.exits.clear();

    for &body_block in &loop_info.body {
        for succ in graph.successors(body_block) {
            if !loop_info.body.contains(&succ) {
                loop_info.exits.push(LoopExit {
                    exiting_block: body_block,
                    exit_block: succ,
                });
            }
        }
    }
}

/// A loop is guarded when its preheader's only predecessor ends in a two-way
/// branch whose other target is where the loop exits to (directly, or through
/// the exit block's single successor).
fn compute_guard<G>(graph: &G, loop_info: &LoopInfo) -> Option<NodeId>
where
    G: Successors + Predecessors,
{
    let preheader = loop_info.preheader?;
    let exit = loop_info.single_exit()?.exit_block;

    let mut preds = graph.predecessors(preheader);
    let guard = preds.next()?;
    if preds.next().is_some() || loop_info.contains(guard) {
        return None;
    }

    let succs: Vec<NodeId> = graph.successors(guard).collect();
    if succs.len() != 2 {
        return None;
    }
    let skip = if succs[0] == preheader { succs[1] } else { succs[0] };

    let exit_succs: Vec<NodeId> = graph.successors(exit).collect();
    if skip == exit || exit_succs.as_slice() == [skip] {
        Some(guard)
    } else {
        None
    }
}

/// Computes parent/children links, depths and the top-level list.
///
/// `forest.loops` is already in discovery order, so the top-level list inherits it.
fn compute_nesting(forest: &mut LoopForest) {
    let n = forest.loops.len();

    for i in 0..n {
        let Some(header) = forest.loops[i].as_ref().map(|l| l.header) else {
            continue;
        };
        // parent is the smallest other loop containing this header
        let parent = (0..n)
            .filter(|&j| j != i)
            .filter_map(|j| forest.loops[j].as_ref().map(|l| (j, l)))
            .filter(|(_, l)| l.body.contains(&header))
            .min_by_key(|(_, l)| l.size())
            .map(|(j, _)| LoopId(j));
        if let Some(info) = forest.loops[i].as_mut() {
            info.parent = parent;
        }
    }

    for i in 0..n {
        let parent = forest.loops[i].as_ref().and_then(|l| l.parent);
        match parent {
            Some(parent) => {
                if let Some(parent_info) = forest.get_mut(parent) {
                    parent_info.children.push(LoopId(i));
                }
            }
            None => forest.top_level.push(LoopId(i)),
        }
    }

    for root in forest.top_level.clone() {
        forest.set_depth(root, 0);
    }
}
