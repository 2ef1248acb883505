//! B+ tree over `num_votes`, mapping each key to the locations of its records.
//!
//! Nodes live in an arena (`Vec<Option<Node>>` plus a free list); parent and
//! sibling links are plain `NodeId`s. Records sharing a key are stored in one
//! leaf entry's overflow chain, so a key never spans two leaves.
//!
//! Insert and delete recurse from the root. Each level returns a
//! `StepResult` telling its caller whether a child split (a key and right
//! node to insert) or a child disappeared in a merge (a child index to
//! remove), and whether the target key was found at all.

use crate::access::{AccessLog, NodeVisit};
use crate::config::StoreConfig;
use crate::storage::btree::node::{FanOut, InternalNode, Key, LeafNode, Node, NodeId};
use crate::storage::record::Record;
use crate::storage::{BlockStore, Location, StoreError};

/// Signal passed from a recursive step to its caller.
#[derive(Debug)]
struct StepResult {
    /// The child split: insert this separator and right node.
    promoted: Option<(Key, NodeId)>,
    /// The child at this index was merged away: drop it and its separator.
    removed_child: Option<usize>,
    /// The key being deleted was present.
    found: bool,
}

impl StepResult {
    const fn split(key: Key, right: NodeId) -> Self {
        Self {
            promoted: Some((key, right)),
            removed_child: None,
            found: true,
        }
    }

    const fn done() -> Self {
        Self {
            promoted: None,
            removed_child: None,
            found: true,
        }
    }

    const fn removed(removed_child: Option<usize>) -> Self {
        Self {
            promoted: None,
            removed_child,
            found: true,
        }
    }

    const fn not_found() -> Self {
        Self {
            promoted: None,
            removed_child: None,
            found: false,
        }
    }
}

/// Outcome of one `delete` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Distinct keys removed from the index.
    pub keys_removed: usize,
    /// Records tombstoned in the block store.
    pub records_removed: usize,
    /// Tree nodes freed by merges and root collapses.
    pub nodes_deleted: usize,
}

/// An in-memory B+ tree index.
#[derive(Debug)]
pub struct BPlusTree {
    pub(super) nodes: Vec<Option<Node>>,
    pub(super) free_nodes: Vec<NodeId>,
    pub(super) root: Option<NodeId>,
    pub(super) fan_out: FanOut,
    chunk_capacity: usize,
    nodes_deleted: usize,
}

impl BPlusTree {
    /// Create an empty tree.
    #[must_use]
    pub const fn new(fan_out: FanOut, chunk_capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: None,
            fan_out,
            chunk_capacity,
            nodes_deleted: 0,
        }
    }

    /// Create an empty tree shaped for the store's block size.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            FanOut::new(config.fan_out()),
            config.overflow_chunk_capacity(),
        )
    }

    /// Index every live record, scanning blocks and slots in storage order.
    pub fn build(store: &BlockStore) -> Result<Self, StoreError> {
        let mut tree = Self::from_config(store.config());
        for (location, record) in store.scan()? {
            tree.insert(&record, location);
        }
        tracing::info!(
            keys = tree.key_count(),
            nodes = tree.node_count(),
            height = tree.height(),
            "built index"
        );
        Ok(tree)
    }

    // ========== Search ==========

    /// Locations of every record whose key equals `key`.
    pub fn search(&self, key: i32, log: &mut AccessLog) -> Vec<Location> {
        self.search_range(key, key, log)
    }

    /// Locations of every record with `lower <= key <= upper`, in key order.
    ///
    /// Every node visited is recorded in `log`.
    pub fn search_range(&self, lower: i32, upper: i32, log: &mut AccessLog) -> Vec<Location> {
        let mut result = Vec::new();
        if lower > upper {
            return result;
        }
        let Some(root) = self.root else {
            return result;
        };

        let low = Key::primary(lower);
        let mut current = root;
        while let Node::Internal(internal) = self.node(current) {
            log.record_node(|| self.node(current).visit(current));
            current = internal.children[internal.find_child_index(&low)];
        }

        let mut next_leaf = Some(current);
        while let Some(leaf_id) = next_leaf {
            log.record_node(|| self.node(leaf_id).visit(leaf_id));
            let leaf = self.leaf(leaf_id);
            for entry in &leaf.entries[leaf.lower_bound(&low)..] {
                if entry.key.primary > upper {
                    return result;
                }
                result.extend(entry.locations.iter());
            }
            next_leaf = leaf.next;
        }

        result
    }

    // ========== Insert ==========

    /// Index a record stored at `location`.
    pub fn insert(&mut self, record: &Record, location: Location) {
        self.insert_key(Key::from_record(record), location);
    }

    /// Add `location` under `key`, splitting nodes as needed.
    pub fn insert_key(&mut self, key: Key, location: Location) {
        let Some(root) = self.root else {
            let mut leaf = LeafNode::new(None);
            leaf.insert(key, location, self.chunk_capacity);
            self.root = Some(self.alloc(Node::Leaf(leaf)));
            return;
        };

        if let Some((separator, right)) = self.insert_into(root, key, location).promoted {
            let new_root = self.alloc(Node::Internal(InternalNode::with_children(
                root, separator, right,
            )));
            self.node_mut(root).set_parent(Some(new_root));
            self.node_mut(right).set_parent(Some(new_root));
            self.root = Some(new_root);
            tracing::debug!(root = new_root, height = self.height(), "root split");
        }
    }

    fn insert_into(&mut self, node_id: NodeId, key: Key, location: Location) -> StepResult {
        let child = match self.node(node_id) {
            Node::Leaf(_) => return self.insert_into_leaf(node_id, key, location),
            Node::Internal(internal) => internal.children[internal.find_child_index(&key)],
        };

        let Some((separator, right)) = self.insert_into(child, key, location).promoted else {
            return StepResult::done();
        };

        self.node_mut(right).set_parent(Some(node_id));
        let max_children = self.fan_out.max_children();
        let internal = self.internal_mut(node_id);
        internal.insert(separator, right);
        if internal.children.len() <= max_children {
            return StepResult::done();
        }

        let (promoted, right_half) = internal.split();
        let moved_children = right_half.children.clone();
        let right_id = self.alloc(Node::Internal(right_half));
        for moved in moved_children {
            self.node_mut(moved).set_parent(Some(right_id));
        }
        tracing::debug!(node = node_id, right = right_id, %promoted, "internal split");
        StepResult::split(promoted, right_id)
    }

    fn insert_into_leaf(&mut self, leaf_id: NodeId, key: Key, location: Location) -> StepResult {
        let max_keys = self.fan_out.max_leaf_keys();
        let chunk_capacity = self.chunk_capacity;
        let leaf = self.leaf_mut(leaf_id);
        leaf.insert(key, location, chunk_capacity);
        if leaf.entries.len() <= max_keys {
            return StepResult::done();
        }

        let mut right = leaf.split();
        right.prev = Some(leaf_id);
        let old_next = right.next;
        let Some(separator) = right.first_key() else {
            unreachable!("split leaf has an empty right half");
        };

        let right_id = self.alloc(Node::Leaf(right));
        self.leaf_mut(leaf_id).next = Some(right_id);
        if let Some(next) = old_next {
            self.leaf_mut(next).prev = Some(right_id);
        }
        tracing::debug!(node = leaf_id, right = right_id, %separator, "leaf split");
        StepResult::split(separator, right_id)
    }

    // ========== Delete ==========

    /// Remove every entry whose primary key is `primary`, tombstoning the
    /// records in `store`.
    ///
    /// Deleting an absent key is a no-op.
    pub fn delete(
        &mut self,
        primary: i32,
        store: &mut BlockStore,
        log: &mut AccessLog,
    ) -> Result<DeleteSummary, StoreError> {
        let deleted_before = self.nodes_deleted;
        let mut summary = DeleteSummary::default();

        while let Some(key) = self.first_key_with_primary(primary) {
            let mut removed = Vec::new();
            let found = self.remove_key(&key, &mut removed);
            assert!(found, "located key {key} was not removed");
            summary.keys_removed += 1;

            for location in removed {
                store.delete(location, log)?;
                summary.records_removed += 1;
            }
        }

        summary.nodes_deleted = self.nodes_deleted - deleted_before;
        if summary.keys_removed == 0 {
            tracing::debug!(primary, "delete found no matching key");
        } else {
            tracing::debug!(
                primary,
                keys = summary.keys_removed,
                records = summary.records_removed,
                nodes_deleted = summary.nodes_deleted,
                "deleted key"
            );
        }
        Ok(summary)
    }

    /// Smallest key with the given primary, walking right across leaves.
    fn first_key_with_primary(&self, primary: i32) -> Option<Key> {
        let low = Key::primary(primary);
        let mut next_leaf = Some(self.find_leaf(&low)?);
        while let Some(leaf_id) = next_leaf {
            let leaf = self.leaf(leaf_id);
            if let Some(entry) = leaf.entries.get(leaf.lower_bound(&low)) {
                return (entry.key.primary == primary).then_some(entry.key);
            }
            next_leaf = leaf.next;
        }
        None
    }

    /// Remove the entry for exactly `key`, pushing its locations to `removed`.
    ///
    /// Returns whether the key was present.
    fn remove_key(&mut self, key: &Key, removed: &mut Vec<Location>) -> bool {
        let Some(root) = self.root else {
            return false;
        };

        let result = self.remove_from(root, key, removed);
        assert!(
            result.removed_child.is_none(),
            "the root has no parent to detach it from"
        );
        if result.found {
            self.collapse_root();
        }
        result.found
    }

    fn remove_from(&mut self, node_id: NodeId, key: &Key, removed: &mut Vec<Location>) -> StepResult {
        match self.node(node_id) {
            Node::Leaf(_) => {
                let Some(entry) = self.leaf_mut(node_id).remove(key) else {
                    return StepResult::not_found();
                };
                removed.extend(entry.locations.into_locations());
            }
            Node::Internal(internal) => {
                let child = internal.children[internal.find_child_index(key)];
                let result = self.remove_from(child, key, removed);
                if !result.found {
                    return result;
                }
                if let Some(child_idx) = result.removed_child {
                    self.internal_mut(node_id).remove_child(child_idx);
                }
            }
        }

        let node = self.node(node_id);
        if node.parent().is_some() && node.is_underfull(self.fan_out) {
            StepResult::removed(self.rebalance(node_id))
        } else {
            StepResult::done()
        }
    }

    /// Restore occupancy of an underfull non-root node.
    ///
    /// Borrows from the right sibling, then the left; failing both, merges
    /// into the left sibling or absorbs the right one. Returns the index of
    /// the parent's child that was merged away, if any.
    fn rebalance(&mut self, node_id: NodeId) -> Option<usize> {
        let Some(parent_id) = self.node(node_id).parent() else {
            unreachable!("rebalance called on the root");
        };
        let parent = self.internal(parent_id);
        let Some(pos) = parent.position_of(node_id) else {
            panic!("node {node_id} is not a child of its parent {parent_id}");
        };
        let left = pos.checked_sub(1).map(|i| parent.children[i]);
        let right = parent.children.get(pos + 1).copied();

        if let Some(right_id) = right.filter(|&r| self.node(r).can_lend(self.fan_out)) {
            self.borrow_from_right(parent_id, pos, node_id, right_id);
            return None;
        }
        if let Some(left_id) = left.filter(|&l| self.node(l).can_lend(self.fan_out)) {
            self.borrow_from_left(parent_id, pos, left_id, node_id);
            return None;
        }
        if let Some(left_id) = left {
            self.merge(parent_id, pos - 1, left_id, node_id);
            return Some(pos);
        }
        if let Some(right_id) = right {
            self.merge(parent_id, pos, node_id, right_id);
            return Some(pos + 1);
        }
        unreachable!("non-root node {node_id} has no siblings");
    }

    /// Move the right sibling's first slot to the end of `node_id`.
    fn borrow_from_right(&mut self, parent_id: NodeId, pos: usize, node_id: NodeId, right_id: NodeId) {
        if self.node(node_id).is_leaf() {
            let entry = self.leaf_mut(right_id).entries.remove(0);
            self.leaf_mut(node_id).entries.push(entry);
            let Some(new_first) = self.leaf(right_id).first_key() else {
                unreachable!("lending leaf left empty");
            };
            self.internal_mut(parent_id).keys[pos] = new_first;
        } else {
            let right = self.internal_mut(right_id);
            let moved_key = right.keys.remove(0);
            let moved_child = right.children.remove(0);
            let separator = std::mem::replace(&mut self.internal_mut(parent_id).keys[pos], moved_key);
            let node = self.internal_mut(node_id);
            node.keys.push(separator);
            node.children.push(moved_child);
            self.node_mut(moved_child).set_parent(Some(node_id));
        }
        tracing::debug!(node = node_id, sibling = right_id, "borrowed from right sibling");
    }

    /// Move the left sibling's last slot to the front of `node_id`.
    fn borrow_from_left(&mut self, parent_id: NodeId, pos: usize, left_id: NodeId, node_id: NodeId) {
        if self.node(node_id).is_leaf() {
            let Some(entry) = self.leaf_mut(left_id).entries.pop() else {
                unreachable!("lending leaf is empty");
            };
            self.internal_mut(parent_id).keys[pos - 1] = entry.key;
            self.leaf_mut(node_id).entries.insert(0, entry);
        } else {
            let left = self.internal_mut(left_id);
            let (Some(moved_key), Some(moved_child)) = (left.keys.pop(), left.children.pop()) else {
                unreachable!("lending internal node is empty");
            };
            let separator =
                std::mem::replace(&mut self.internal_mut(parent_id).keys[pos - 1], moved_key);
            let node = self.internal_mut(node_id);
            node.keys.insert(0, separator);
            node.children.insert(0, moved_child);
            self.node_mut(moved_child).set_parent(Some(node_id));
        }
        tracing::debug!(node = node_id, sibling = left_id, "borrowed from left sibling");
    }

    /// Append `right_id` onto `left_id` and free `right_id`.
    ///
    /// `separator_idx` is the parent's key between the two; the caller
    /// removes it together with the right child.
    fn merge(&mut self, parent_id: NodeId, separator_idx: usize, left_id: NodeId, right_id: NodeId) {
        match self.release(right_id) {
            Node::Leaf(right) => {
                if let Some(next) = right.next {
                    self.leaf_mut(next).prev = Some(left_id);
                }
                let left = self.leaf_mut(left_id);
                left.entries.extend(right.entries);
                left.next = right.next;
            }
            Node::Internal(right) => {
                let separator = self.internal(parent_id).keys[separator_idx];
                for &child in &right.children {
                    self.node_mut(child).set_parent(Some(left_id));
                }
                let left = self.internal_mut(left_id);
                left.keys.push(separator);
                left.keys.extend(right.keys);
                left.children.extend(right.children);
            }
        }
        self.nodes_deleted += 1;
        tracing::debug!(into = left_id, freed = right_id, "merged nodes");
    }

    /// Drop a level when the root has one child, or empty the tree when the
    /// root leaf has no entries.
    fn collapse_root(&mut self) {
        while let Some(root) = self.root {
            match self.node(root) {
                Node::Internal(internal) if internal.children.len() == 1 => {
                    let child = internal.children[0];
                    self.release(root);
                    self.nodes_deleted += 1;
                    self.node_mut(child).set_parent(None);
                    self.root = Some(child);
                    tracing::debug!(root = child, height = self.height(), "root collapsed");
                }
                Node::Leaf(leaf) if leaf.entries.is_empty() => {
                    self.release(root);
                    self.nodes_deleted += 1;
                    self.root = None;
                    tracing::debug!("tree emptied");
                }
                _ => return,
            }
        }
    }

    // ========== Statistics ==========

    #[must_use]
    pub const fn fan_out(&self) -> FanOut {
        self.fan_out
    }

    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Edges from the root to any leaf; 0 for a leaf root or an empty tree.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            match self.node(id) {
                Node::Internal(internal) => {
                    height += 1;
                    current = internal.children.first().copied();
                }
                Node::Leaf(_) => break,
            }
        }
        height
    }

    /// Live tree nodes, excluding overflow chunks.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Overflow chunks across every leaf entry.
    #[must_use]
    pub fn overflow_node_count(&self) -> usize {
        self.leaves()
            .flat_map(|leaf| leaf.entries.iter())
            .map(|entry| entry.locations.chunk_count())
            .sum()
    }

    /// Distinct keys in the index.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.leaves().map(|leaf| leaf.entries.len()).sum()
    }

    /// Locations across every key.
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.leaves()
            .flat_map(|leaf| leaf.entries.iter())
            .map(|entry| entry.locations.len())
            .sum()
    }

    /// Nodes freed by merges and root collapses since construction.
    #[must_use]
    pub const fn nodes_deleted(&self) -> usize {
        self.nodes_deleted
    }

    /// Every key in leaf-chain order.
    #[must_use]
    pub fn leaf_keys(&self) -> Vec<Key> {
        self.leaves()
            .flat_map(|leaf| leaf.entries.iter().map(|e| e.key))
            .collect()
    }

    /// Snapshot of the root node.
    #[must_use]
    pub fn root_visit(&self) -> Option<NodeVisit> {
        self.root.map(|id| self.node(id).visit(id))
    }

    /// Snapshot of the root's first child, if the root is internal.
    #[must_use]
    pub fn first_child_visit(&self) -> Option<NodeVisit> {
        match self.node(self.root?) {
            Node::Internal(internal) => {
                let child = *internal.children.first()?;
                Some(self.node(child).visit(child))
            }
            Node::Leaf(_) => None,
        }
    }

    // ========== Arena access ==========

    /// The node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id refers to a freed or never-allocated slot.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id) {
            Some(Some(node)) => node,
            _ => panic!("dangling node id {id}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id) {
            Some(Some(node)) => node,
            _ => panic!("dangling node id {id}"),
        }
    }

    fn leaf(&self, id: NodeId) -> &LeafNode {
        match self.node(id) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("node {id} is not a leaf"),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode {
        match self.node_mut(id) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("node {id} is not a leaf"),
        }
    }

    fn internal(&self, id: NodeId) -> &InternalNode {
        match self.node(id) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("node {id} is not an internal node"),
        }
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode {
        match self.node_mut(id) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("node {id} is not an internal node"),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Remove a node from the arena, returning its contents.
    fn release(&mut self, id: NodeId) -> Node {
        let Some(node) = self.nodes.get_mut(id).and_then(Option::take) else {
            panic!("double free of node {id}");
        };
        self.free_nodes.push(id);
        node
    }

    /// Leaf whose key range contains `key`.
    fn find_leaf(&self, key: &Key) -> Option<NodeId> {
        let mut current = self.root?;
        while let Node::Internal(internal) = self.node(current) {
            current = internal.children[internal.find_child_index(key)];
        }
        Some(current)
    }

    /// Leftmost leaf of the tree.
    pub(super) fn first_leaf(&self) -> Option<NodeId> {
        let mut current = self.root?;
        while let Node::Internal(internal) = self.node(current) {
            current = *internal.children.first()?;
        }
        Some(current)
    }

    /// Leaves in chain order.
    fn leaves(&self) -> impl Iterator<Item = &LeafNode> + '_ {
        std::iter::successors(self.first_leaf().map(|id| self.leaf(id)), |leaf| {
            leaf.next.map(|id| self.leaf(id))
        })
    }
}

/// Level-order dump, one line per level.
impl std::fmt::Display for BPlusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(root) = self.root else {
            return writeln!(f, "<empty>");
        };

        let mut level = vec![root];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for (i, &id) in level.iter().enumerate() {
                if i > 0 {
                    f.write_str("    ")?;
                }
                let node = self.node(id);
                write!(f, "{}", node.visit(id))?;
                if let Node::Internal(internal) = node {
                    next_level.extend(internal.children.iter().copied());
                }
            }
            writeln!(f)?;
            level = next_level;
        }
        Ok(())
    }
}
