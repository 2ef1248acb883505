//! B+ tree node types.
//!
//! Nodes live in an arena owned by the tree and refer to each other by
//! `NodeId`:
//! - Internal nodes: store separator keys and child ids
//! - Leaf nodes: store keys with their location chains, doubly-linked for
//!   range scans

use crate::access::{NodeKind, NodeVisit};
use crate::storage::Location;
use crate::storage::btree::overflow::LocationChain;
use crate::storage::record::{Record, Tconst};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// An index key: `num_votes` with an optional `tconst` tie-break.
///
/// Keys order by `primary`, then `secondary`, with `None` before any value,
/// so `Key::primary(p)` is the smallest key with primary `p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub primary: i32,
    pub secondary: Option<Tconst>,
}

impl Key {
    #[must_use]
    pub const fn primary(primary: i32) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    #[must_use]
    pub const fn with_secondary(primary: i32, secondary: Tconst) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// The index key for a record. Records with equal `num_votes` share a key.
    #[must_use]
    pub const fn from_record(record: &Record) -> Self {
        Self::primary(record.num_votes)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.secondary {
            Some(secondary) => write!(f, "{}/{secondary}", self.primary),
            None => write!(f, "{}", self.primary),
        }
    }
}

/// Occupancy bounds derived from the fan-out `n`.
///
/// - leaf: `[floor((n+1)/2), n]` keys
/// - internal: `[floor(n/2) + 1, n + 1]` children
///
/// The root is exempt from the lower bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    n: usize,
}

impl FanOut {
    /// # Panics
    ///
    /// Panics if `n < 2`; smaller trees cannot keep both split halves legal.
    #[must_use]
    pub fn new(n: usize) -> Self {
        assert!(n >= 2, "fan-out must be at least 2, got {n}");
        Self { n }
    }

    #[must_use]
    pub const fn n(self) -> usize {
        self.n
    }

    #[must_use]
    pub const fn max_leaf_keys(self) -> usize {
        self.n
    }

    #[must_use]
    pub const fn min_leaf_keys(self) -> usize {
        (self.n + 1) / 2
    }

    #[must_use]
    pub const fn max_children(self) -> usize {
        self.n + 1
    }

    #[must_use]
    pub const fn min_children(self) -> usize {
        self.n / 2 + 1
    }
}

/// A key with every location stored under it.
#[derive(Debug, Clone)]
pub struct LeafEntry {
    pub key: Key,
    pub locations: LocationChain,
}

/// A leaf node.
#[derive(Debug, Clone, Default)]
pub struct LeafNode {
    pub parent: Option<NodeId>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Entries in ascending key order, one per distinct key.
    pub entries: Vec<LeafEntry>,
}

impl LeafNode {
    #[must_use]
    pub fn new(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            ..Self::default()
        }
    }

    /// Find the entry for `key`, or where it would be inserted.
    pub fn find_index(&self, key: &Key) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }

    /// Index of the first entry whose key is `>= key`.
    #[must_use]
    pub fn lower_bound(&self, key: &Key) -> usize {
        self.entries.partition_point(|e| e.key < *key)
    }

    /// Add `location` under `key`.
    ///
    /// Returns true if a new entry was created, false if the key already
    /// existed and only its chain grew.
    pub fn insert(&mut self, key: Key, location: Location, chunk_capacity: usize) -> bool {
        match self.find_index(&key) {
            Ok(i) => {
                self.entries[i].locations.push(location);
                false
            }
            Err(i) => {
                let mut locations = LocationChain::new(chunk_capacity);
                locations.push(location);
                self.entries.insert(i, LeafEntry { key, locations });
                true
            }
        }
    }

    /// Remove the entry for `key`.
    pub fn remove(&mut self, key: &Key) -> Option<LeafEntry> {
        self.find_index(key).ok().map(|i| self.entries.remove(i))
    }

    /// Split off the upper half, keeping `ceil(len / 2)` entries here.
    ///
    /// The new node inherits this node's parent and right neighbour; the
    /// caller links the two halves.
    #[must_use]
    pub fn split(&mut self) -> Self {
        let keep = self.entries.len().div_ceil(2);
        let right_entries = self.entries.split_off(keep);
        Self {
            parent: self.parent,
            prev: None,
            next: self.next,
            entries: right_entries,
        }
    }

    #[must_use]
    pub fn first_key(&self) -> Option<Key> {
        self.entries.first().map(|e| e.key)
    }
}

/// An internal node.
///
/// Stores N keys and N+1 child ids.
/// `children[i]` holds keys < `keys[i]`
/// `children[i+1]` holds keys >= `keys[i]`
#[derive(Debug, Clone, Default)]
pub struct InternalNode {
    pub parent: Option<NodeId>,
    pub keys: Vec<Key>,
    pub children: Vec<NodeId>,
}

impl InternalNode {
    /// Create an internal node over two children.
    #[must_use]
    pub fn with_children(left_child: NodeId, key: Key, right_child: NodeId) -> Self {
        Self {
            parent: None,
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Child index for a key: the number of separators `<= key`.
    #[must_use]
    pub fn find_child_index(&self, key: &Key) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Position of `child` among this node's children.
    #[must_use]
    pub fn position_of(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Insert a separator and the child to its right at the sorted position.
    pub fn insert(&mut self, key: Key, right_child: NodeId) {
        let idx = self.find_child_index(&key);
        self.keys.insert(idx, key);
        self.children.insert(idx + 1, right_child);
    }

    /// Remove `children[child_idx]` and the separator to its left.
    ///
    /// # Panics
    ///
    /// Panics if `child_idx` is 0 or out of range.
    pub fn remove_child(&mut self, child_idx: usize) -> (Key, NodeId) {
        assert!(
            child_idx > 0 && child_idx < self.children.len(),
            "removed child index {child_idx} out of range"
        );
        let key = self.keys.remove(child_idx - 1);
        let child = self.children.remove(child_idx);
        (key, child)
    }

    /// Split an overfull node, returning the promoted key and the right half.
    ///
    /// With `k` keys, `mid = k / 2`: keys `[0, mid)` stay, key `mid` moves up,
    /// keys `(mid, k)` move right with their children.
    #[must_use]
    pub fn split(&mut self) -> (Key, Self) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let Some(promoted) = self.keys.pop() else {
            unreachable!("split of an internal node with no keys");
        };

        let right = Self {
            parent: self.parent,
            keys: right_keys,
            children: right_children,
        };
        (promoted, right)
    }
}

/// A tree node.
#[derive(Debug, Clone)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Internal(node) => node.parent,
            Self::Leaf(node) => node.parent,
        }
    }

    pub const fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Self::Internal(node) => node.parent = parent,
            Self::Leaf(node) => node.parent = parent,
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Occupied slots: entries for a leaf, children for an internal node.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn degree(&self) -> usize {
        match self {
            Self::Internal(node) => node.children.len(),
            Self::Leaf(node) => node.entries.len(),
        }
    }

    /// Whether a non-root node has fallen below its lower bound.
    #[must_use]
    pub fn is_underfull(&self, fan_out: FanOut) -> bool {
        match self {
            Self::Internal(node) => node.children.len() < fan_out.min_children(),
            Self::Leaf(node) => node.entries.len() < fan_out.min_leaf_keys(),
        }
    }

    /// Whether the node can give one slot to a sibling and stay legal.
    #[must_use]
    pub fn can_lend(&self, fan_out: FanOut) -> bool {
        match self {
            Self::Internal(node) => node.children.len() > fan_out.min_children(),
            Self::Leaf(node) => node.entries.len() > fan_out.min_leaf_keys(),
        }
    }

    /// Primary keys shown in reports.
    #[must_use]
    pub fn primary_keys(&self) -> Vec<i32> {
        match self {
            Self::Internal(node) => node.keys.iter().map(|k| k.primary).collect(),
            Self::Leaf(node) => node.entries.iter().map(|e| e.key.primary).collect(),
        }
    }

    /// A report snapshot of this node.
    #[must_use]
    pub fn visit(&self, id: NodeId) -> NodeVisit {
        NodeVisit {
            node: id,
            kind: if self.is_leaf() {
                NodeKind::Leaf
            } else {
                NodeKind::Internal
            },
            keys: self.primary_keys(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(i: usize) -> Location {
        Location::new(i, 0)
    }

    fn leaf_with(keys: &[i32]) -> LeafNode {
        let mut leaf = LeafNode::new(None);
        for (i, &k) in keys.iter().enumerate() {
            leaf.insert(Key::primary(k), loc(i), 4);
        }
        leaf
    }

    fn leaf_keys(leaf: &LeafNode) -> Vec<i32> {
        leaf.entries.iter().map(|e| e.key.primary).collect()
    }

    #[test]
    fn test_key_ordering() {
        let t = Tconst::parse("tt1").expect("tconst");
        assert!(Key::primary(5) < Key::with_secondary(5, t));
        assert!(Key::with_secondary(5, t) < Key::primary(6));
        assert_eq!(Key::primary(7).to_string(), "7");
        assert_eq!(Key::with_secondary(7, t).to_string(), "7/tt1");
    }

    #[test]
    fn test_fan_out_bounds() {
        let f = FanOut::new(10);
        assert_eq!(f.max_leaf_keys(), 10);
        assert_eq!(f.min_leaf_keys(), 5);
        assert_eq!(f.max_children(), 11);
        assert_eq!(f.min_children(), 6);

        let f = FanOut::new(27);
        assert_eq!(f.min_leaf_keys(), 14);
        assert_eq!(f.min_children(), 14);
    }

    #[test]
    #[should_panic(expected = "fan-out must be at least 2")]
    fn test_fan_out_too_small() {
        let _ = FanOut::new(1);
    }

    #[test]
    fn test_leaf_insert_sorted_and_duplicates() {
        let mut leaf = leaf_with(&[30, 10, 20]);
        assert_eq!(leaf_keys(&leaf), vec![10, 20, 30]);

        assert!(!leaf.insert(Key::primary(20), loc(9), 4));
        assert_eq!(leaf.entries.len(), 3);
        assert_eq!(leaf.entries[1].locations.len(), 2);
    }

    #[test]
    fn test_leaf_lower_bound() {
        let leaf = leaf_with(&[10, 20, 30]);
        assert_eq!(leaf.lower_bound(&Key::primary(5)), 0);
        assert_eq!(leaf.lower_bound(&Key::primary(20)), 1);
        assert_eq!(leaf.lower_bound(&Key::primary(25)), 2);
        assert_eq!(leaf.lower_bound(&Key::primary(35)), 3);
    }

    #[test]
    fn test_leaf_remove() {
        let mut leaf = leaf_with(&[1, 2, 3]);
        let removed = leaf.remove(&Key::primary(2)).expect("present");
        assert_eq!(removed.key, Key::primary(2));
        assert!(leaf.remove(&Key::primary(2)).is_none());
        assert_eq!(leaf_keys(&leaf), vec![1, 3]);
    }

    #[test]
    fn test_leaf_split() {
        // n = 10, split of 11 entries keeps 6 on the left.
        let mut leaf = leaf_with(&(0..11).collect::<Vec<_>>());
        leaf.next = Some(42);
        let right = leaf.split();
        assert_eq!(leaf.entries.len(), 6);
        assert_eq!(right.entries.len(), 5);
        assert_eq!(right.first_key(), Some(Key::primary(6)));
        assert_eq!(right.next, Some(42));
    }

    #[test]
    fn test_internal_find_child() {
        let node = InternalNode {
            parent: None,
            keys: vec![Key::primary(10), Key::primary(20), Key::primary(30)],
            children: vec![100, 200, 300, 400],
        };

        assert_eq!(node.find_child_index(&Key::primary(5)), 0);
        // Equal to a separator: the right subtree holds it.
        assert_eq!(node.find_child_index(&Key::primary(10)), 1);
        assert_eq!(node.find_child_index(&Key::primary(15)), 1);
        assert_eq!(node.find_child_index(&Key::primary(35)), 3);
        assert_eq!(node.position_of(300), Some(2));
        assert_eq!(node.position_of(999), None);
    }

    #[test]
    fn test_internal_insert_and_remove_child() {
        let mut node = InternalNode::with_children(1, Key::primary(10), 2);
        node.insert(Key::primary(20), 3);
        node.insert(Key::primary(5), 4);
        assert_eq!(
            node.keys,
            vec![Key::primary(5), Key::primary(10), Key::primary(20)]
        );
        assert_eq!(node.children, vec![1, 4, 2, 3]);

        let (key, child) = node.remove_child(2);
        assert_eq!(key, Key::primary(10));
        assert_eq!(child, 2);
        assert_eq!(node.children, vec![1, 4, 3]);
    }

    #[test]
    fn test_internal_split_even_fan_out() {
        // n = 10: 11 keys and 12 children split 5 | 1 | 5.
        let mut node = InternalNode {
            parent: Some(7),
            keys: (0..11).map(Key::primary).collect(),
            children: (100..112).collect(),
        };
        let (promoted, right) = node.split();
        assert_eq!(promoted, Key::primary(5));
        assert_eq!(node.keys.len(), 5);
        assert_eq!(node.children.len(), 6);
        assert_eq!(right.keys.len(), 5);
        assert_eq!(right.children, (106..112).collect::<Vec<_>>());
        assert_eq!(right.parent, Some(7));
    }

    #[test]
    fn test_internal_split_odd_fan_out() {
        // n = 9: 10 keys and 11 children, both halves keep >= 5 children.
        let mut node = InternalNode {
            parent: None,
            keys: (0..10).map(Key::primary).collect(),
            children: (0..11).collect(),
        };
        let (promoted, right) = node.split();
        assert_eq!(promoted, Key::primary(5));
        assert_eq!(node.children.len(), 6);
        assert_eq!(right.children.len(), 5);
    }

    #[test]
    fn test_node_occupancy() {
        let fan_out = FanOut::new(4);
        let leaf = Node::Leaf(leaf_with(&[1]));
        assert!(leaf.is_underfull(fan_out));
        let leaf = Node::Leaf(leaf_with(&[1, 2, 3]));
        assert!(!leaf.is_underfull(fan_out));
        assert!(leaf.can_lend(fan_out));

        let mut internal = InternalNode::with_children(1, Key::primary(3), 2);
        assert!(Node::Internal(internal.clone()).is_underfull(fan_out));
        internal.insert(Key::primary(6), 5);
        let internal = Node::Internal(internal);
        assert!(!internal.is_underfull(fan_out));
        assert!(!internal.can_lend(fan_out));
        assert_eq!(internal.degree(), 3);
    }

    #[test]
    fn test_visit_snapshot() {
        let node = Node::Leaf(leaf_with(&[4, 8]));
        let visit = node.visit(3);
        assert_eq!(visit.to_string(), "Leaf Node: [4, 8]");
        assert_eq!(visit.node, 3);
    }
}
