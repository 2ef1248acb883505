//! Simulated disk: a flat byte buffer of fixed-size blocks.
//!
//! Block `i` occupies bytes `[i * block_size, (i + 1) * block_size)`. Blocks
//! are appended on demand when no free slot remains and are never released.
//! Free slots are kept in a FIFO queue; deleting a record tombstones it and
//! queues its slot for reuse.
//!
//! # Invariants
//!
//! - `data.len() == blocks_used * block_size`
//! - `blocks_used <= config.capacity_blocks()`
//! - a slot is in `free_slots` iff its record is tombstoned, unless a caller
//!   deletes the same location twice (not validated)

use std::collections::VecDeque;

use crate::access::AccessLog;
use crate::config::StoreConfig;
use crate::storage::block::{Block, BlockId, Location};
use crate::storage::record::{Record, RecordError};

/// Block-addressed record storage.
#[derive(Debug)]
pub struct BlockStore {
    config: StoreConfig,
    data: Vec<u8>,
    blocks_used: usize,
    free_slots: VecDeque<Location>,
}

impl BlockStore {
    /// Create an empty store. No blocks are allocated until needed.
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self {
            config,
            data: Vec::new(),
            blocks_used: 0,
            free_slots: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of blocks allocated so far.
    #[must_use]
    pub const fn blocks_used(&self) -> usize {
        self.blocks_used
    }

    /// Bytes of simulated disk in use.
    #[must_use]
    pub const fn bytes_used(&self) -> usize {
        self.blocks_used * self.config.block_size
    }

    /// Number of slots available for reuse.
    #[must_use]
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Whether `location` is queued in the free pool.
    #[cfg(test)]
    pub(crate) fn is_free(&self, location: Location) -> bool {
        self.free_slots.contains(&location)
    }

    /// Append a zeroed block and queue all of its slots.
    pub fn allocate_block(&mut self) -> Result<BlockId, StoreError> {
        let capacity_blocks = self.config.capacity_blocks();
        if self.blocks_used >= capacity_blocks {
            return Err(StoreError::MemoryExhausted { capacity_blocks });
        }

        let block_id = self.blocks_used;
        self.blocks_used += 1;
        self.data.resize(self.blocks_used * self.config.block_size, 0);
        self.write_block(block_id, &Block::empty(self.config.block_size))?;

        for slot in 0..self.config.records_per_block() {
            self.free_slots.push_back(Location::new(block_id, slot));
        }

        tracing::debug!(block_id, "allocated block");
        Ok(block_id)
    }

    /// Store a record in the next free slot.
    ///
    /// Not counted in any `AccessLog`: only searches and deletes are measured.
    pub fn insert(&mut self, record: Record) -> Result<Location, StoreError> {
        if self.free_slots.is_empty() {
            self.allocate_block()?;
        }
        let Some(location) = self.free_slots.pop_front() else {
            unreachable!("a freshly allocated block always has free slots");
        };

        let record = Record {
            empty: false,
            ..record
        };
        self.update(location, record)?;
        Ok(location)
    }

    /// Read the record at `location`, counting one block access.
    pub fn read(&self, location: Location, log: &mut AccessLog) -> Result<Record, StoreError> {
        log.record_block(location);
        self.read_record(location)
    }

    /// Read the record at `location` without accounting.
    pub fn read_record(&self, location: Location) -> Result<Record, StoreError> {
        let block = self.read_block(location.block)?;
        block
            .record(location.slot)
            .copied()
            .ok_or(StoreError::SlotOutOfRange {
                slot: location.slot,
                slots_per_block: self.config.records_per_block(),
            })
    }

    /// Overwrite the record at `location` in place.
    pub fn update(&mut self, location: Location, record: Record) -> Result<(), StoreError> {
        let mut block = self.read_block(location.block)?;
        if !block.update(location.slot, record) {
            return Err(StoreError::SlotOutOfRange {
                slot: location.slot,
                slots_per_block: self.config.records_per_block(),
            });
        }
        self.write_block(location.block, &block)
    }

    /// Tombstone the record at `location` and queue the slot for reuse,
    /// counting one block access.
    pub fn delete(&mut self, location: Location, log: &mut AccessLog) -> Result<(), StoreError> {
        let mut block = self.read_block(location.block)?;
        if !block.delete(location.slot) {
            return Err(StoreError::SlotOutOfRange {
                slot: location.slot,
                slots_per_block: self.config.records_per_block(),
            });
        }
        self.write_block(location.block, &block)?;
        log.record_block(location);
        self.free_slots.push_back(location);
        Ok(())
    }

    /// Decode a whole block.
    pub fn read_block(&self, block_id: BlockId) -> Result<Block, StoreError> {
        let range = self.block_range(block_id)?;
        Ok(Block::from_bytes(&self.data[range])?)
    }

    /// Encode a whole block over its current contents.
    pub fn write_block(&mut self, block_id: BlockId, block: &Block) -> Result<(), StoreError> {
        let range = self.block_range(block_id)?;
        block.write_to(&mut self.data[range]);
        Ok(())
    }

    /// Every live record with its location, in storage order.
    pub fn scan(&self) -> Result<Vec<(Location, Record)>, StoreError> {
        let mut out = Vec::new();
        for block_id in 0..self.blocks_used {
            let block = self.read_block(block_id)?;
            for (slot, record) in block.records().iter().enumerate() {
                if !record.empty {
                    out.push((Location::new(block_id, slot), *record));
                }
            }
        }
        Ok(out)
    }

    fn block_range(&self, block_id: BlockId) -> Result<std::ops::Range<usize>, StoreError> {
        if block_id >= self.blocks_used {
            return Err(StoreError::OutOfRange {
                block: block_id,
                allocated: self.blocks_used,
            });
        }
        let start = block_id * self.config.block_size;
        Ok(start..start + self.config.block_size)
    }
}

/// Errors produced by the block store.
#[derive(Debug)]
pub enum StoreError {
    /// The block has not been allocated.
    OutOfRange { block: BlockId, allocated: usize },
    /// The slot index exceeds the records per block.
    SlotOutOfRange { slot: usize, slots_per_block: usize },
    /// The memory budget has no room for another block.
    MemoryExhausted { capacity_blocks: usize },
    /// A record could not be decoded.
    Record(RecordError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { block, allocated } => {
                write!(f, "block {block} out of range ({allocated} allocated)")
            }
            Self::SlotOutOfRange {
                slot,
                slots_per_block,
            } => write!(f, "slot {slot} out of range ({slots_per_block} per block)"),
            Self::MemoryExhausted { capacity_blocks } => {
                write!(f, "memory exhausted: all {capacity_blocks} blocks in use")
            }
            Self::Record(e) => write!(f, "record error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Record(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, test_config};

    #[test]
    fn test_insert_allocates_blocks_on_demand() {
        let mut store = BlockStore::new(test_config(200));
        assert_eq!(store.blocks_used(), 0);

        for i in 0..25 {
            store.insert(record(&format!("tt{i:04}"), 5.0, i)).expect("insert");
        }

        assert_eq!(store.blocks_used(), 3);
        assert_eq!(store.bytes_used(), 600);
        assert_eq!(store.free_slot_count(), 5);
    }

    #[test]
    fn test_read_back() {
        let mut store = BlockStore::new(test_config(200));
        let rec = record("tt0042", 8.25, 42);
        let location = store.insert(rec).expect("insert");

        let mut log = AccessLog::new();
        assert_eq!(store.read(location, &mut log).expect("read"), rec);
        assert_eq!(log.block_accesses(), 1);
        assert_eq!(log.sampled_blocks(), &[location]);
    }

    #[test]
    fn test_read_out_of_range() {
        let store = BlockStore::new(test_config(200));
        let err = store
            .read_record(Location::new(0, 0))
            .expect_err("no blocks allocated");
        assert!(matches!(err, StoreError::OutOfRange { block: 0, allocated: 0 }));
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut store = BlockStore::new(test_config(200));
        store.insert(record("tt1", 1.0, 1)).expect("insert");
        let err = store
            .read_record(Location::new(0, 10))
            .expect_err("slot 10 does not exist");
        assert!(matches!(err, StoreError::SlotOutOfRange { slot: 10, .. }));
    }

    #[test]
    fn test_delete_recycles_slot() {
        let mut store = BlockStore::new(test_config(200));
        let mut log = AccessLog::new();
        let locations: Vec<_> = (0..10)
            .map(|i| store.insert(record("tt", 1.0, i)).expect("insert"))
            .collect();
        assert_eq!(store.free_slot_count(), 0);

        store.delete(locations[3], &mut log).expect("delete");
        assert!(store.is_free(locations[3]));
        assert!(store.read_record(locations[3]).expect("read").empty);
        assert_eq!(log.block_accesses(), 1);

        let reused = store.insert(record("tt_new", 2.0, 99)).expect("insert");
        assert_eq!(reused, locations[3]);
        assert_eq!(store.blocks_used(), 1);
    }

    #[test]
    fn test_memory_exhausted() {
        let config = StoreConfig::new(200, 400).expect("config");
        let mut store = BlockStore::new(config);
        for i in 0..20 {
            store.insert(record("tt", 1.0, i)).expect("insert");
        }
        let err = store.insert(record("tt", 1.0, 20)).expect_err("full");
        assert!(matches!(err, StoreError::MemoryExhausted { capacity_blocks: 2 }));
    }

    #[test]
    fn test_scan_skips_tombstones() {
        let mut store = BlockStore::new(test_config(200));
        let mut log = AccessLog::new();
        let a = store.insert(record("a", 1.0, 1)).expect("insert");
        let b = store.insert(record("b", 1.0, 2)).expect("insert");
        store.delete(a, &mut log).expect("delete");

        let live = store.scan().expect("scan");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, b);
    }

    #[test]
    fn test_insert_clears_tombstone_flag() {
        let mut store = BlockStore::new(test_config(200));
        let location = store.insert(Record::tombstone()).expect("insert");
        assert!(!store.read_record(location).expect("read").empty);
    }
}
