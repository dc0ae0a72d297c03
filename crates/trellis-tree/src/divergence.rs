use crate::arena::{NodeId, TreeArena};

/// Subtree-equality predicate used to decide whether two adjacent
/// siblings can merge.
pub type SubtreeEq<'a> = &'a dyn Fn(&TreeArena, NodeId, NodeId) -> bool;

/// Default predicate: structural shape equality. Two nodes are equal
/// when they have the same child count and their children are pairwise
/// structurally equal; values are not consulted.
pub fn structural_eq(arena: &TreeArena, a: NodeId, b: NodeId) -> bool {
    let (Some(left), Some(right)) = (arena.node(a), arena.node(b)) else {
        return false;
    };
    left.children.len() == right.children.len()
        && left
            .children
            .iter()
            .zip(right.children.iter())
            .all(|(&x, &y)| structural_eq(arena, x, y))
}

/// Number of un-mergeable boundaries in an ordered sibling list.
///
/// An empty list is an unmerged remainder and counts as 1. Otherwise
/// consecutive equal siblings form runs; a run of even length cancels
/// out entirely, a run of odd length propagates the divergence of its
/// children upward. A leaf's empty child list contributes 1, so a lone
/// leaf sibling yields 1 and two identical siblings yield 0.
pub fn divergence_with(arena: &TreeArena, siblings: &[NodeId], eq: SubtreeEq<'_>) -> usize {
    if siblings.is_empty() {
        return 1;
    }
    let mut total = 0;
    let mut start = 0;
    while start < siblings.len() {
        let mut end = start + 1;
        while end < siblings.len() && eq(arena, siblings[start], siblings[end]) {
            end += 1;
        }
        let run_len = end - start;
        if run_len % 2 == 1 {
            total += divergence_with(arena, arena.children(siblings[start]), eq);
        }
        start = end;
    }
    total
}

/// `divergence_with` using the structural predicate.
pub fn divergence(arena: &TreeArena, siblings: &[NodeId]) -> usize {
    divergence_with(arena, siblings, &structural_eq)
}

/// Rendering-layer facade over the pure divergence function. The value
/// is computed once for the sibling list passed at construction;
/// composing with a parent level that fully merges yields 0.
pub struct DivergenceComparator<'a> {
    arena: &'a TreeArena,
    siblings: Vec<NodeId>,
    parent_divergence: Option<usize>,
}

impl<'a> DivergenceComparator<'a> {
    pub fn new(arena: &'a TreeArena, siblings: impl Into<Vec<NodeId>>) -> Self {
        DivergenceComparator {
            arena,
            siblings: siblings.into(),
            parent_divergence: None,
        }
    }

    pub fn with_parent(
        arena: &'a TreeArena,
        siblings: impl Into<Vec<NodeId>>,
        parent_divergence: usize,
    ) -> Self {
        DivergenceComparator {
            arena,
            siblings: siblings.into(),
            parent_divergence: Some(parent_divergence),
        }
    }

    pub fn get_divergence(&self) -> usize {
        if self.parent_divergence == Some(0) {
            return 0;
        }
        divergence(self.arena, &self.siblings)
    }
}
