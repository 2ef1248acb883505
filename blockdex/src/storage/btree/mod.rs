//! In-memory B+ tree used as the secondary index on `num_votes`.
//!
//! # Structure
//!
//! The tree consists of:
//! - Internal nodes: store separator keys and child ids
//! - Leaf nodes: store one entry per distinct key, doubly-linked for range
//!   scans
//! - Location chains: every leaf entry's record locations, in fixed-size
//!   overflow chunks
//!
//! # Usage
//!
//! ```
//! use blockdex::access::AccessLog;
//! use blockdex::config::StoreConfig;
//! use blockdex::storage::btree::BPlusTree;
//! use blockdex::storage::{BlockStore, Record, Tconst};
//!
//! let config = StoreConfig::new(200, 1 << 20).expect("valid config");
//! let mut store = BlockStore::new(config);
//! let mut tree = BPlusTree::from_config(&config);
//!
//! let record = Record::new(Tconst::parse("tt0000001").expect("tconst"), 5.6, 1645);
//! let location = store.insert(record).expect("room for a block");
//! tree.insert(&record, location);
//!
//! let mut log = AccessLog::new();
//! assert_eq!(tree.search(1645, &mut log), vec![location]);
//! ```

mod invariants;
mod node;
mod overflow;
mod tree;

pub use invariants::InvariantViolation;
pub use node::{FanOut, InternalNode, Key, LeafEntry, LeafNode, Node, NodeId};
pub use overflow::LocationChain;
pub use tree::{BPlusTree, DeleteSummary};
