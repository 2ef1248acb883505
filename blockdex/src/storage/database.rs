//! High-level database interface.
//!
//! Owns the block store, the index built over it and the access log that
//! every search and delete reports into.

use std::path::Path;

use crate::access::AccessLog;
use crate::config::{ConfigError, StoreConfig};
use crate::loader::{self, LoadError, LoadSummary};
use crate::storage::btree::{BPlusTree, DeleteSummary};
use crate::storage::record::Record;
use crate::storage::store::{BlockStore, StoreError};
use crate::storage::Location;

/// A block store with an optional index over `num_votes`.
///
/// The index is absent until `build_index` is called. Records added after
/// that are indexed as they are inserted.
#[derive(Debug)]
pub struct Database {
    store: BlockStore,
    index: Option<BPlusTree>,
    log: AccessLog,
}

impl Database {
    /// Create an empty database.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: BlockStore::new(config),
            index: None,
            log: AccessLog::new(),
        }
    }

    /// Validate the geometry and create an empty database.
    pub fn with_block_size(block_size: usize, memory_size: usize) -> Result<Self, DatabaseError> {
        Ok(Self::new(StoreConfig::new(block_size, memory_size)?))
    }

    /// Load every row of a TSV file into the store.
    ///
    /// An index that was already built is rebuilt to cover the new rows,
    /// including the rows stored before a load that fails part way.
    pub fn load_tsv(&mut self, path: &Path) -> Result<LoadSummary, DatabaseError> {
        let loaded = loader::load_tsv(path, &mut self.store);
        if self.index.is_some() {
            tracing::warn!("rebuilding index after bulk load");
            self.index = Some(BPlusTree::build(&self.store)?);
        }
        Ok(loaded?)
    }

    /// Store one record, indexing it if the index exists.
    pub fn insert_record(&mut self, record: Record) -> Result<Location, DatabaseError> {
        let location = self.store.insert(record)?;
        if let Some(index) = &mut self.index {
            index.insert(&record, location);
        }
        Ok(location)
    }

    /// Build the index from every live record, replacing any previous one.
    pub fn build_index(&mut self) -> Result<&BPlusTree, DatabaseError> {
        let index = BPlusTree::build(&self.store)?;
        Ok(self.index.insert(index))
    }

    /// Records whose `num_votes` equals `key`.
    pub fn search(&mut self, key: i32) -> Result<Vec<Record>, DatabaseError> {
        self.search_range(key, key)
    }

    /// Records with `lower <= num_votes <= upper`, in key order.
    ///
    /// Resets the access log, then counts every index node visited and every
    /// block read to fetch a record.
    pub fn search_range(&mut self, lower: i32, upper: i32) -> Result<Vec<Record>, DatabaseError> {
        let index = self.index.as_ref().ok_or(DatabaseError::IndexNotBuilt)?;
        self.log.reset();

        let locations = index.search_range(lower, upper, &mut self.log);
        let records = locations
            .into_iter()
            .map(|location| self.store.read(location, &mut self.log))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            lower,
            upper,
            records = records.len(),
            node_accesses = self.log.node_accesses(),
            block_accesses = self.log.block_accesses(),
            "search"
        );
        Ok(records)
    }

    /// Delete every record whose `num_votes` equals `key`.
    ///
    /// Resets the access log; each tombstoned record counts as a block
    /// access.
    pub fn delete(&mut self, key: i32) -> Result<DeleteSummary, DatabaseError> {
        let index = self.index.as_mut().ok_or(DatabaseError::IndexNotBuilt)?;
        self.log.reset();
        Ok(index.delete(key, &mut self.store, &mut self.log)?)
    }

    #[must_use]
    pub const fn store(&self) -> &BlockStore {
        &self.store
    }

    #[must_use]
    pub const fn index(&self) -> Option<&BPlusTree> {
        self.index.as_ref()
    }

    /// Accesses made by the most recent search or delete.
    #[must_use]
    pub const fn access_log(&self) -> &AccessLog {
        &self.log
    }

    #[must_use]
    pub const fn blocks_used(&self) -> usize {
        self.store.blocks_used()
    }
}

/// Errors that can occur during database operations.
#[derive(Debug)]
pub enum DatabaseError {
    /// Invalid store geometry.
    Config(ConfigError),
    /// Block store error.
    Store(StoreError),
    /// Bulk load error.
    Load(LoadError),
    /// A search or delete ran before `build_index`.
    IndexNotBuilt,
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Store(e) => write!(f, "storage error: {e}"),
            Self::Load(e) => write!(f, "load error: {e}"),
            Self::IndexNotBuilt => write!(f, "index has not been built"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Load(e) => Some(e),
            Self::IndexNotBuilt => None,
        }
    }
}

impl From<ConfigError> for DatabaseError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for DatabaseError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<LoadError> for DatabaseError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::testing::{new_test_database, record};

    fn insert_votes(db: &mut Database, votes: &[i32]) -> Vec<Location> {
        votes
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                db.insert_record(record(&format!("tt{i:05}"), 5.0, v))
                    .expect("insert")
            })
            .collect()
    }

    #[test]
    fn test_twenty_five_records() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &(0..25).collect::<Vec<_>>());
        assert_eq!(db.blocks_used(), 3);

        let index = db.build_index().expect("build");
        assert!(index.height() >= 1);
        assert_eq!(index.key_count(), 25);
    }

    #[test]
    fn test_search_duplicates() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &[5, 5, 5, 10]);
        db.build_index().expect("build");

        let fives = db.search(5).expect("search");
        assert_eq!(fives.len(), 3);
        assert!(fives.iter().all(|r| r.num_votes == 5));
        assert_eq!(db.access_log().block_accesses(), 3);
        assert_eq!(db.access_log().node_accesses(), 1);

        assert_eq!(db.search_range(0, 10).expect("search").len(), 4);
        assert!(db.search(7).expect("search").is_empty());
        assert!(db.search_range(10, 0).expect("search").is_empty());
    }

    #[test]
    fn test_search_without_index() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &[1]);
        assert!(matches!(db.search(1), Err(DatabaseError::IndexNotBuilt)));
        assert!(matches!(db.delete(1), Err(DatabaseError::IndexNotBuilt)));
    }

    #[test]
    fn test_delete_duplicates_frees_slots() {
        let mut db = new_test_database(200);
        let locations = insert_votes(&mut db, &[3, 7, 7, 7, 9]);
        db.build_index().expect("build");

        let summary = db.delete(7).expect("delete");
        assert_eq!(summary.records_removed, 3);
        assert_eq!(db.access_log().block_accesses(), 3);
        for location in &locations[1..4] {
            assert!(db.store().read_record(*location).expect("read").empty);
            assert!(db.store().is_free(*location));
        }
        assert!(db.search(7).expect("search").is_empty());
        assert_eq!(db.search_range(0, 100).expect("search").len(), 2);

        assert_eq!(db.delete(7).expect("delete"), DeleteSummary::default());
    }

    #[test]
    fn test_insert_after_build_is_indexed() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &[1, 2, 3]);
        db.build_index().expect("build");
        db.insert_record(record("tt_late", 9.0, 2)).expect("insert");
        assert_eq!(db.search(2).expect("search").len(), 2);
    }

    #[test]
    fn test_inserts_are_not_counted() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &[1, 2]);
        db.build_index().expect("build");
        db.search(1).expect("search");
        assert_eq!(db.access_log().block_accesses(), 1);

        insert_votes(&mut db, &[3, 4, 5]);
        assert_eq!(db.access_log().block_accesses(), 1);
        assert_eq!(db.access_log().node_accesses(), 1);
    }

    #[test]
    fn test_log_resets_per_operation() {
        let mut db = new_test_database(200);
        insert_votes(&mut db, &(0..200).collect::<Vec<_>>());
        db.build_index().expect("build");

        db.search_range(0, 199).expect("search");
        assert_eq!(db.access_log().block_accesses(), 200);
        db.search(50).expect("search");
        assert_eq!(db.access_log().block_accesses(), 1);
    }

    #[test]
    fn test_load_tsv_rebuilds_index() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "tconst\taverageRating\tnumVotes").expect("write");
        writeln!(file, "tt0000001\t5.6\t42").expect("write");
        writeln!(file, "tt0000002\t6.1\t42").expect("write");

        let mut db = new_test_database(200);
        db.build_index().expect("build");
        let summary = db.load_tsv(file.path()).expect("load");
        assert_eq!(summary.records, 2);
        assert_eq!(db.search(42).expect("search").len(), 2);
    }

    #[test]
    fn test_failed_load_keeps_index_in_sync() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "tconst\taverageRating\tnumVotes").expect("write");
        writeln!(file, "tt0000001\t5.0\t42").expect("write");
        writeln!(file, "tt0000002\tbad\t42").expect("write");

        let mut db = new_test_database(200);
        db.build_index().expect("build");
        let err = db.load_tsv(file.path()).expect_err("bad rating on line 3");
        assert!(matches!(
            err,
            DatabaseError::Load(LoadError::Parse { line: 3, .. })
        ));

        assert_eq!(db.store().scan().expect("scan").len(), 1);
        let found = db.search(42).expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tconst.as_str(), "tt0000001");
    }

    #[test]
    fn test_invalid_geometry() {
        let err = Database::with_block_size(10, 1 << 20).expect_err("block too small");
        assert!(matches!(
            err,
            DatabaseError::Config(ConfigError::RecordLargerThanBlock { .. })
        ));
    }
}
