// Life of an experiment run:
// 1. Rows come in from a TSV file
// 2. Each row becomes a 19-byte record in the next free block slot
// 3. The index is built by scanning every block and slot in order
// 4. Searches descend the index, walk the leaf chain, then read blocks
// 5. Deletes remove index entries, tombstone records and free their slots
//
// System components:
//  - Block store (simulated disk)
//  - B+ tree index over num_votes
//  - Access log for cost accounting

pub mod access;
pub mod config;
pub mod experiment;
pub mod loader;
pub mod storage;

#[cfg(test)]
mod testing;

pub use access::AccessLog;
pub use config::{ConfigError, ExperimentConfig, StoreConfig};
pub use storage::{Database, DatabaseError};
