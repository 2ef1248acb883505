//! Access accounting for cost experiments.
//!
//! Counts every index node and data block touched by an operation and keeps
//! the first `SAMPLE_LIMIT` of each for display. The log is owned by the
//! caller and passed into index and store operations explicitly.

use crate::storage::btree::NodeId;
use crate::storage::{BlockStore, Location, StoreError};

/// Number of node and block accesses kept for display.
pub const SAMPLE_LIMIT: usize = 5;

/// Node variant recorded in a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    Leaf,
}

/// A snapshot of a node taken when it was visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVisit {
    pub node: NodeId,
    pub kind: NodeKind,
    /// Primary keys held by the node at visit time.
    pub keys: Vec<i32>,
}

impl std::fmt::Display for NodeVisit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            NodeKind::Internal => "Internal Node",
            NodeKind::Leaf => "Leaf Node",
        };
        write!(f, "{label}: [")?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

/// Counters and bounded samples of node and block accesses.
///
/// # Invariants
/// - `sampled_nodes.len() <= min(node_accesses, SAMPLE_LIMIT)`
/// - `sampled_blocks.len() <= min(block_accesses, SAMPLE_LIMIT)`
#[derive(Debug, Default)]
pub struct AccessLog {
    node_accesses: usize,
    block_accesses: usize,
    sampled_nodes: Vec<NodeVisit>,
    sampled_blocks: Vec<Location>,
}

impl AccessLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear counters and samples.
    pub fn reset(&mut self) {
        self.node_accesses = 0;
        self.block_accesses = 0;
        self.sampled_nodes.clear();
        self.sampled_blocks.clear();
    }

    /// Count a node access. The snapshot is only built while sampling.
    pub fn record_node(&mut self, snapshot: impl FnOnce() -> NodeVisit) {
        self.node_accesses += 1;
        if self.sampled_nodes.len() < SAMPLE_LIMIT {
            self.sampled_nodes.push(snapshot());
        }
    }

    /// Count a block access made to reach `location`.
    pub fn record_block(&mut self, location: Location) {
        self.block_accesses += 1;
        if self.sampled_blocks.len() < SAMPLE_LIMIT {
            self.sampled_blocks.push(location);
        }
    }

    #[must_use]
    pub const fn node_accesses(&self) -> usize {
        self.node_accesses
    }

    #[must_use]
    pub const fn block_accesses(&self) -> usize {
        self.block_accesses
    }

    #[must_use]
    pub fn sampled_nodes(&self) -> &[NodeVisit] {
        &self.sampled_nodes
    }

    #[must_use]
    pub fn sampled_blocks(&self) -> &[Location] {
        &self.sampled_blocks
    }

    /// Numbered listing of the sampled nodes.
    #[must_use]
    pub fn node_report(&self) -> String {
        self.sampled_nodes
            .iter()
            .enumerate()
            .map(|(i, visit)| format!("{}. {visit}\n", i + 1))
            .collect()
    }

    /// Numbered listing of the sampled blocks' current contents.
    pub fn block_report(&self, store: &BlockStore) -> Result<String, StoreError> {
        self.sampled_blocks
            .iter()
            .enumerate()
            .map(|(i, location)| {
                let block = store.read_block(location.block)?;
                Ok(format!("{}. {block}\n", i + 1))
            })
            .collect()
    }
}
