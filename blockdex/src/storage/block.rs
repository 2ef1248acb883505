//! Blocks: the unit of simulated disk I/O.
//!
//! A block is `block_size` bytes holding `block_size / RECORD_SIZE`
//! consecutive record slots. Any bytes left over after the last slot are
//! unused padding and always written as zero.

use crate::storage::record::{RECORD_SIZE, Record, RecordError};

/// A block identifier (0-indexed block number).
pub type BlockId = usize;

/// The logical address of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub block: BlockId,
    pub slot: usize,
}

impl Location {
    #[must_use]
    pub const fn new(block: BlockId, slot: usize) -> Self {
        Self { block, slot }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.block, self.slot)
    }
}

/// A decoded block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    records: Vec<Record>,
    block_size: usize,
}

impl Block {
    /// Create a block whose slots are all empty.
    #[must_use]
    pub fn empty(block_size: usize) -> Self {
        Self {
            records: vec![Record::tombstone(); block_size / RECORD_SIZE],
            block_size,
        }
    }

    /// Decode a block from its raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let records = bytes
            .chunks_exact(RECORD_SIZE)
            .map(Record::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            records,
            block_size: bytes.len(),
        })
    }

    /// Encode into `buf`, which must be exactly `block_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not match the block size.
    pub fn write_to(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.block_size, "block buffer size mismatch");
        buf.fill(0);
        for (record, slot) in self.records.iter().zip(buf.chunks_exact_mut(RECORD_SIZE)) {
            record.encode_into(slot);
        }
    }

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.block_size];
        self.write_to(&mut buf);
        buf
    }

    /// Number of record slots.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn slot_count(&self) -> usize {
        self.records.len()
    }

    /// Read the record in a slot.
    #[must_use]
    pub fn record(&self, slot: usize) -> Option<&Record> {
        self.records.get(slot)
    }

    /// All slots in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Overwrite a slot. Returns false if the slot does not exist.
    pub fn update(&mut self, slot: usize, record: Record) -> bool {
        match self.records.get_mut(slot) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    /// Tombstone a slot. Returns false if the slot does not exist.
    pub fn delete(&mut self, slot: usize) -> bool {
        match self.records.get_mut(slot) {
            Some(existing) => {
                existing.empty = true;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if !record.empty {
                write!(f, "{}", record.tconst)?;
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::Tconst;

    fn record(tconst: &str, votes: i32) -> Record {
        Record::new(Tconst::parse(tconst).expect("tconst"), 7.5, votes)
    }

    #[test]
    fn test_empty_block() {
        let block = Block::empty(200);
        assert_eq!(block.slot_count(), 10);
        assert!(block.records().iter().all(|r| r.empty));
    }

    #[test]
    fn test_block_roundtrip() {
        let mut block = Block::empty(200);
        assert!(block.update(0, record("tt01", 10)));
        assert!(block.update(9, record("tt09", 90)));

        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), 200);
        // Padding after the last slot stays zeroed.
        assert!(bytes[190..].iter().all(|&b| b == 0));

        let restored = Block::from_bytes(&bytes).expect("decode");
        assert_eq!(restored, block);
        assert_eq!(restored.record(9).map(|r| r.num_votes), Some(90));
    }

    #[test]
    fn test_update_out_of_range() {
        let mut block = Block::empty(200);
        assert!(!block.update(10, record("tt01", 1)));
        assert!(!block.delete(10));
        assert!(block.record(10).is_none());
    }

    #[test]
    fn test_delete_keeps_contents() {
        let mut block = Block::empty(200);
        block.update(3, record("tt03", 30));
        assert!(block.delete(3));
        let slot = block.record(3).expect("slot");
        assert!(slot.empty);
        assert_eq!(slot.num_votes, 30);
    }

    #[test]
    fn test_display() {
        let mut block = Block::empty(60);
        block.update(0, record("tt01", 1));
        block.update(2, record("tt02", 2));
        assert_eq!(block.to_string(), "(tt01, , tt02)");
    }
}
