//! Structural checks for `BPlusTree`, used by tests after every mutation.
//!
//! A full walk from the root verifies:
//! - keys sorted within every node and bounded by the ancestors' separators
//! - occupancy bounds for every non-root node
//! - uniform leaf depth
//! - parent back-references
//! - the leaf chain visits the same leaves as the walk, in order
//! - every live arena slot is reachable

use crate::storage::btree::node::{Key, Node, NodeId};
use crate::storage::btree::tree::BPlusTree;

/// The first structural defect found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    UnsortedKeys { node: NodeId },
    OutOfBounds { node: NodeId, key: Key },
    Overfull { node: NodeId, degree: usize },
    Underfull { node: NodeId, degree: usize },
    ChildCountMismatch { node: NodeId, keys: usize, children: usize },
    UnevenDepth { leaf: NodeId, depth: usize, expected: usize },
    ParentMismatch { node: NodeId, expected: Option<NodeId>, actual: Option<NodeId> },
    BrokenLeafChain { node: NodeId },
    EmptyLocationChain { node: NodeId, key: Key },
    Unreachable { reachable: usize, live: usize },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsortedKeys { node } => write!(f, "node {node}: keys not strictly ascending"),
            Self::OutOfBounds { node, key } => {
                write!(f, "node {node}: key {key} outside its separator range")
            }
            Self::Overfull { node, degree } => write!(f, "node {node}: overfull at {degree}"),
            Self::Underfull { node, degree } => write!(f, "node {node}: underfull at {degree}"),
            Self::ChildCountMismatch {
                node,
                keys,
                children,
            } => write!(f, "node {node}: {keys} keys but {children} children"),
            Self::UnevenDepth {
                leaf,
                depth,
                expected,
            } => write!(f, "leaf {leaf} at depth {depth}, expected {expected}"),
            Self::ParentMismatch {
                node,
                expected,
                actual,
            } => write!(f, "node {node}: parent {actual:?}, expected {expected:?}"),
            Self::BrokenLeafChain { node } => write!(f, "leaf chain broken at node {node}"),
            Self::EmptyLocationChain { node, key } => {
                write!(f, "node {node}: key {key} has no locations")
            }
            Self::Unreachable { reachable, live } => {
                write!(f, "{reachable} nodes reachable but {live} live")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// Separator range a subtree's keys must fall in: `[lower, upper)`.
#[derive(Clone, Copy)]
struct Bounds {
    lower: Option<Key>,
    upper: Option<Key>,
}

impl Bounds {
    fn contains(&self, key: &Key) -> bool {
        self.lower.is_none_or(|lower| *key >= lower) && self.upper.is_none_or(|upper| *key < upper)
    }
}

/// State collected during the walk.
struct Walk {
    leaves: Vec<NodeId>,
    leaf_depth: Option<usize>,
    reachable: usize,
}

impl BPlusTree {
    /// Verify every structural invariant, returning the first violation.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let Some(root) = self.root else {
            let live = self.node_count();
            return if live == 0 {
                Ok(())
            } else {
                Err(InvariantViolation::Unreachable { reachable: 0, live })
            };
        };

        let mut walk = Walk {
            leaves: Vec::new(),
            leaf_depth: None,
            reachable: 0,
        };
        let unbounded = Bounds {
            lower: None,
            upper: None,
        };
        self.check_node(root, None, unbounded, 0, &mut walk)?;

        let live = self.node_count();
        if walk.reachable != live {
            return Err(InvariantViolation::Unreachable {
                reachable: walk.reachable,
                live,
            });
        }
        self.check_leaf_chain(&walk.leaves)
    }

    fn check_node(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        bounds: Bounds,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<(), InvariantViolation> {
        walk.reachable += 1;
        let node = self.node(id);
        if node.parent() != parent {
            return Err(InvariantViolation::ParentMismatch {
                node: id,
                expected: parent,
                actual: node.parent(),
            });
        }

        let degree = node.degree();
        let max = match node {
            Node::Internal(_) => self.fan_out.max_children(),
            Node::Leaf(_) => self.fan_out.max_leaf_keys(),
        };
        if degree > max {
            return Err(InvariantViolation::Overfull { node: id, degree });
        }
        if parent.is_some() && node.is_underfull(self.fan_out) {
            return Err(InvariantViolation::Underfull { node: id, degree });
        }

        match node {
            Node::Leaf(leaf) => {
                let keys: Vec<Key> = leaf.entries.iter().map(|e| e.key).collect();
                check_keys(id, &keys, bounds)?;
                if let Some(entry) = leaf.entries.iter().find(|e| e.locations.is_empty()) {
                    return Err(InvariantViolation::EmptyLocationChain {
                        node: id,
                        key: entry.key,
                    });
                }
                match walk.leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(InvariantViolation::UnevenDepth {
                            leaf: id,
                            depth,
                            expected,
                        });
                    }
                    _ => walk.leaf_depth = Some(depth),
                }
                walk.leaves.push(id);
            }
            Node::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 || internal.keys.is_empty() {
                    return Err(InvariantViolation::ChildCountMismatch {
                        node: id,
                        keys: internal.keys.len(),
                        children: internal.children.len(),
                    });
                }
                check_keys(id, &internal.keys, bounds)?;
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_bounds = Bounds {
                        lower: if i == 0 {
                            bounds.lower
                        } else {
                            Some(internal.keys[i - 1])
                        },
                        upper: internal.keys.get(i).copied().or(bounds.upper),
                    };
                    self.check_node(child, Some(id), child_bounds, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }

    fn check_leaf_chain(&self, leaves: &[NodeId]) -> Result<(), InvariantViolation> {
        if self.first_leaf() != leaves.first().copied() {
            return Err(InvariantViolation::BrokenLeafChain {
                node: leaves.first().copied().unwrap_or_default(),
            });
        }
        for (i, &id) in leaves.iter().enumerate() {
            let Node::Leaf(leaf) = self.node(id) else {
                return Err(InvariantViolation::BrokenLeafChain { node: id });
            };
            let expected_prev = i.checked_sub(1).map(|p| leaves[p]);
            let expected_next = leaves.get(i + 1).copied();
            if leaf.prev != expected_prev || leaf.next != expected_next {
                return Err(InvariantViolation::BrokenLeafChain { node: id });
            }
        }
        Ok(())
    }
}

fn check_keys(node: NodeId, keys: &[Key], bounds: Bounds) -> Result<(), InvariantViolation> {
    if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(InvariantViolation::UnsortedKeys { node });
    }
    if let Some(key) = keys.iter().find(|key| !bounds.contains(key)) {
        return Err(InvariantViolation::OutOfBounds { node, key: *key });
    }
    Ok(())
}
