use crate::config::StoreConfig;
use crate::storage::{Database, Record, Tconst};

/// Memory budget for test stores: large enough that no test runs out.
const TEST_MEMORY_SIZE: usize = 1 << 20;

/// A validated store geometry with a 1 MiB budget.
pub fn test_config(block_size: usize) -> StoreConfig {
    StoreConfig::new(block_size, TEST_MEMORY_SIZE).expect("valid test geometry")
}

/// A live record with the given fields.
pub fn record(tconst: &str, average_rating: f32, num_votes: i32) -> Record {
    Record::new(
        Tconst::parse(tconst).expect("test tconst fits"),
        average_rating,
        num_votes,
    )
}

/// An empty database with the given block size.
pub fn new_test_database(block_size: usize) -> Database {
    Database::new(test_config(block_size))
}
