//! The five cost experiments run for each configured block size.
//!
//! 1. Load the data file and report storage usage.
//! 2. Build the index and report its shape.
//! 3. Equality search on `num_votes = 500`.
//! 4. Range search on `30000 <= num_votes <= 40000`.
//! 5. Delete `num_votes = 1000` and report the updated shape.
//!
//! Every experiment produces a report with a `Display` impl; the binary
//! prints them in order.

use std::fmt;

use crate::access::NodeVisit;
use crate::config::ExperimentConfig;
use crate::storage::btree::BPlusTree;
use crate::storage::{Database, DatabaseError, Record};

pub const EQUALITY_KEY: i32 = 500;
pub const RANGE_LOWER: i32 = 30_000;
pub const RANGE_UPPER: i32 = 40_000;
pub const DELETE_KEY: i32 = 1000;

/// Bytes per megabyte in size reports.
pub const MB: usize = 1_000_000;

/// Experiment 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReport {
    pub records: usize,
    pub blocks_used: usize,
    pub bytes_used: usize,
}

impl fmt::Display for StorageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EXPERIMENT 1")?;
        writeln!(f, "Number of records: {}", self.records)?;
        writeln!(f, "Number of blocks: {}", self.blocks_used)?;
        writeln!(
            f,
            "Size of database: {}MB ( {} bytes )",
            self.bytes_used / MB,
            self.bytes_used
        )
    }
}

/// Node counts, height and the top two levels of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeShape {
    pub node_count: usize,
    pub overflow_node_count: usize,
    pub height: usize,
    pub root: Option<NodeVisit>,
    pub first_child: Option<NodeVisit>,
}

impl TreeShape {
    #[must_use]
    pub fn of(tree: &BPlusTree) -> Self {
        Self {
            node_count: tree.node_count(),
            overflow_node_count: tree.overflow_node_count(),
            height: tree.height(),
            root: tree.root_visit(),
            first_child: tree.first_child_visit(),
        }
    }
}

fn write_visit(f: &mut fmt::Formatter<'_>, label: &str, visit: Option<&NodeVisit>) -> fmt::Result {
    match visit {
        Some(visit) => writeln!(f, "{label}: {visit}"),
        None => writeln!(f, "{label}: none"),
    }
}

/// Experiment 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub fan_out: usize,
    pub shape: TreeShape,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = &self.shape;
        writeln!(f, "EXPERIMENT 2")?;
        writeln!(f, "Parameter n of B+ tree: {}", self.fan_out)?;
        writeln!(
            f,
            "Number of nodes in B+ tree (including overflow nodes): {}",
            shape.node_count + shape.overflow_node_count
        )?;
        writeln!(
            f,
            "Number of nodes in B+ tree (excluding overflow nodes): {}",
            shape.node_count
        )?;
        writeln!(f, "Height of B+ tree: {}", shape.height)?;
        write_visit(f, "Content of root node", shape.root.as_ref())?;
        write_visit(f, "Content of first child of root node", shape.first_child.as_ref())
    }
}

/// Experiments 3 and 4.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub experiment: u8,
    pub lower: i32,
    pub upper: i32,
    pub node_accesses: usize,
    pub block_accesses: usize,
    /// Numbered listing of the first sampled nodes.
    pub nodes: String,
    /// Numbered listing of the first sampled blocks.
    pub blocks: String,
    pub records: usize,
    /// Mean `average_rating` of the matches; `None` when nothing matched.
    pub average_rating: Option<f64>,
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EXPERIMENT {}", self.experiment)?;
        if self.lower == self.upper {
            writeln!(f, "Search: numVotes = {}", self.lower)?;
        } else {
            writeln!(f, "Search: {} <= numVotes <= {}", self.lower, self.upper)?;
        }
        writeln!(f, "Number of index nodes accessed: {}", self.node_accesses)?;
        writeln!(f, "Index nodes accessed:")?;
        f.write_str(&self.nodes)?;
        writeln!(f, "Number of blocks accessed: {}", self.block_accesses)?;
        writeln!(f, "Blocks accessed:")?;
        f.write_str(&self.blocks)?;
        writeln!(f, "Number of records returned: {}", self.records)?;
        match self.average_rating {
            Some(avg) => writeln!(f, "Average of averageRatings returned: {avg}"),
            None => writeln!(f, "Average of averageRatings returned: n/a"),
        }
    }
}

/// Experiment 5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub key: i32,
    pub records_removed: usize,
    pub nodes_deleted: usize,
    pub shape: TreeShape,
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = &self.shape;
        writeln!(f, "EXPERIMENT 5")?;
        writeln!(
            f,
            "Deleted {} records with numVotes = {}",
            self.records_removed, self.key
        )?;
        writeln!(f, "Total number of deleted nodes: {}", self.nodes_deleted)?;
        writeln!(f, "Number of nodes of updated B+ tree: {}", shape.node_count)?;
        writeln!(f, "Height of updated B+ tree: {}", shape.height)?;
        write_visit(f, "Content of root node", shape.root.as_ref())?;
        write_visit(f, "Content of first child of root node", shape.first_child.as_ref())
    }
}

/// All five experiments for one block size.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub block_size: usize,
    pub storage: StorageReport,
    pub index: IndexReport,
    pub equality: SearchReport,
    pub range: SearchReport,
    pub deletion: DeleteReport,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===============================================")?;
        writeln!(f, "BLOCK SIZE: {} bytes", self.block_size)?;
        for section in [
            &self.storage as &dyn fmt::Display,
            &self.index,
            &self.equality,
            &self.range,
            &self.deletion,
        ] {
            writeln!(f)?;
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

/// Run every experiment for every configured block size.
pub fn run(config: &ExperimentConfig) -> Result<Vec<RunReport>, DatabaseError> {
    config
        .block_sizes
        .iter()
        .map(|&block_size| {
            tracing::info!(block_size, "starting experiments");
            let mut db = Database::with_block_size(block_size, config.memory_size)?;
            let loaded = db.load_tsv(&config.data_path)?;
            run_experiments(&mut db, loaded.records)
        })
        .collect()
}

/// Run experiments 1 to 5 on a loaded database.
///
/// Builds (or rebuilds) the index, so the database must not have been
/// modified through it beforehand.
pub fn run_experiments(db: &mut Database, records: usize) -> Result<RunReport, DatabaseError> {
    let storage = StorageReport {
        records,
        blocks_used: db.blocks_used(),
        bytes_used: db.store().bytes_used(),
    };

    let tree = db.build_index()?;
    let index = IndexReport {
        fan_out: tree.fan_out().n(),
        shape: TreeShape::of(tree),
    };

    let equality = search(db, 3, EQUALITY_KEY, EQUALITY_KEY)?;
    let range = search(db, 4, RANGE_LOWER, RANGE_UPPER)?;

    let summary = db.delete(DELETE_KEY)?;
    let tree = db.index().ok_or(DatabaseError::IndexNotBuilt)?;
    let deletion = DeleteReport {
        key: DELETE_KEY,
        records_removed: summary.records_removed,
        nodes_deleted: tree.nodes_deleted(),
        shape: TreeShape::of(tree),
    };

    Ok(RunReport {
        block_size: db.store().config().block_size,
        storage,
        index,
        equality,
        range,
        deletion,
    })
}

fn search(
    db: &mut Database,
    experiment: u8,
    lower: i32,
    upper: i32,
) -> Result<SearchReport, DatabaseError> {
    let records = db.search_range(lower, upper)?;
    let log = db.access_log();
    Ok(SearchReport {
        experiment,
        lower,
        upper,
        node_accesses: log.node_accesses(),
        block_accesses: log.block_accesses(),
        nodes: log.node_report(),
        blocks: log.block_report(db.store())?,
        records: records.len(),
        average_rating: average_rating(&records),
    })
}

#[allow(clippy::cast_precision_loss)] // record counts are far below 2^52
fn average_rating(records: &[Record]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let total: f64 = records.iter().map(|r| f64::from(r.average_rating)).sum();
    Some(total / records.len() as f64)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::testing::{new_test_database, record};

    /// A database with a few matches for every experiment key.
    fn sample_database(block_size: usize) -> (Database, usize) {
        let mut db = new_test_database(block_size);
        let mut votes: Vec<i32> = (0..400).map(|i| i * 137 % 50_000).collect();
        votes.extend([EQUALITY_KEY, EQUALITY_KEY, DELETE_KEY, DELETE_KEY, DELETE_KEY]);
        for (i, &v) in votes.iter().enumerate() {
            let rating = if v == EQUALITY_KEY { 7.0 } else { 5.0 };
            db.insert_record(record(&format!("tt{i:07}"), rating, v))
                .expect("insert");
        }
        (db, votes.len())
    }

    #[test]
    fn test_run_experiments() {
        let (mut db, records) = sample_database(200);
        let report = run_experiments(&mut db, records).expect("experiments");

        assert_eq!(report.block_size, 200);
        assert_eq!(report.storage.records, 405);
        assert_eq!(report.storage.blocks_used, 41);
        assert_eq!(report.storage.bytes_used, 8200);
        assert_eq!(report.index.fan_out, 10);
        assert!(report.index.shape.height >= 1);
        assert!(report.index.shape.root.is_some());
        assert!(report.index.shape.first_child.is_some());

        // Neither 500 nor 1000 is of the form i * 137 % 50000 for i < 400.
        assert_eq!(report.equality.records, 2);
        assert_eq!(report.equality.block_accesses, report.equality.records);
        assert!(report.equality.node_accesses > report.index.shape.height);
        assert!((report.equality.average_rating.expect("matches") - 7.0).abs() < 1e-9);

        let in_range = (0..400)
            .map(|i| i * 137 % 50_000)
            .filter(|v| (RANGE_LOWER..=RANGE_UPPER).contains(v))
            .count();
        assert_eq!(report.range.records, in_range);

        assert_eq!(report.deletion.records_removed, 3);
        assert!(report.deletion.shape.node_count <= report.index.shape.node_count);
        assert!(db.search(DELETE_KEY).expect("search").is_empty());
    }

    #[test]
    fn test_report_rendering() {
        let (mut db, records) = sample_database(500);
        let report = run_experiments(&mut db, records).expect("experiments");
        let text = report.to_string();

        assert!(text.starts_with("===============================================\nBLOCK SIZE: 500 bytes\n"));
        for n in 1..=5 {
            assert!(text.contains(&format!("EXPERIMENT {n}\n")), "missing experiment {n}");
        }
        assert!(text.contains("Parameter n of B+ tree: 27\n"));
        assert!(text.contains("Search: numVotes = 500\n"));
        assert!(text.contains("Search: 30000 <= numVotes <= 40000\n"));
        assert!(text.contains("1. Internal Node: ["));
    }

    #[test]
    fn test_search_with_no_matches() {
        let mut db = new_test_database(200);
        db.insert_record(record("tt1", 5.0, 1)).expect("insert");
        db.build_index().expect("build");

        let report = search(&mut db, 3, EQUALITY_KEY, EQUALITY_KEY).expect("search");
        assert_eq!(report.records, 0);
        assert_eq!(report.block_accesses, 0);
        assert!(report.average_rating.is_none());
        assert!(report.to_string().ends_with("Average of averageRatings returned: n/a\n"));
    }

    #[test]
    fn test_run_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "tconst\taverageRating\tnumVotes").expect("write");
        for i in 0..100 {
            writeln!(file, "tt{i:07}\t6.0\t{}", 490 + i % 20).expect("write");
        }

        let config = ExperimentConfig {
            data_path: file.path().to_path_buf(),
            block_sizes: vec![200, 500],
            memory_size: 1 << 20,
        };
        let reports = run(&config).expect("run");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].storage.blocks_used, 10);
        assert_eq!(reports[1].storage.blocks_used, 4);
        assert_eq!(reports[0].equality.records, 5);
        assert_eq!(reports[1].range.records, 0);
    }
}
