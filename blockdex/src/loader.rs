//! Bulk loading of tab-separated rows into a block store.
//!
//! The input has one header line followed by `tconst averageRating numVotes`
//! rows. Rows are inserted in file order; the first malformed row aborts the
//! load.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::storage::{BlockStore, Record, StoreError, Tconst};

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Rows inserted into the store.
    pub records: usize,
}

/// Load a TSV file into `store`.
pub fn load_tsv(path: &Path, store: &mut BlockStore) -> Result<LoadSummary, LoadError> {
    let file = File::open(path)?;
    tracing::info!(path = %path.display(), "loading records");
    load_reader(BufReader::new(file), store)
}

/// Load TSV rows from any buffered reader into `store`.
pub fn load_reader(reader: impl BufRead, store: &mut BlockStore) -> Result<LoadSummary, LoadError> {
    let mut records = 0;
    // Line 1 is the header.
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_row(&line).map_err(|message| LoadError::Parse {
            line: idx + 1,
            message,
        })?;
        store.insert(record)?;
        records += 1;
    }

    tracing::info!(
        records,
        blocks = store.blocks_used(),
        bytes = store.bytes_used(),
        "loaded records"
    );
    Ok(LoadSummary { records })
}

/// Parse one `tconst rating votes` row.
fn parse_row(line: &str) -> Result<Record, String> {
    let mut fields = line.split_whitespace();
    let (Some(tconst), Some(rating), Some(votes), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected 3 fields in '{line}'"));
    };

    let tconst = Tconst::parse(tconst).map_err(|e| format!("tconst '{tconst}': {e}"))?;
    let rating = rating
        .parse::<f32>()
        .map_err(|e| format!("averageRating '{rating}': {e}"))?;
    let votes = votes
        .parse::<i32>()
        .map_err(|e| format!("numVotes '{votes}': {e}"))?;
    Ok(Record::new(tconst, rating, votes))
}

/// Error returned when loading fails.
#[derive(Debug)]
pub enum LoadError {
    /// The input could not be read.
    Io(std::io::Error),
    /// A row could not be parsed. `line` is 1-based.
    Parse { line: usize, message: String },
    /// The store rejected a record.
    Store(StoreError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse { line, message } => write!(f, "line {line}: {message}"),
            Self::Store(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Parse { .. } => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StoreError> for LoadError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::testing::test_config;

    const SAMPLE: &str = "tconst\taverageRating\tnumVotes\n\
                          tt0000001\t5.6\t1645\n\
                          tt0000002\t6.1\t198\n\
                          \n\
                          tt0000003\t6.5\t1342\n";

    #[test]
    fn test_load_reader() {
        let mut store = BlockStore::new(test_config(200));
        let summary = load_reader(SAMPLE.as_bytes(), &mut store).expect("load");
        assert_eq!(summary.records, 3);

        let live = store.scan().expect("scan");
        assert_eq!(live.len(), 3);
        assert_eq!(live[0].1.tconst.as_str(), "tt0000001");
        assert!((live[1].1.average_rating - 6.1).abs() < f32::EPSILON);
        assert_eq!(live[2].1.num_votes, 1342);
    }

    #[test]
    fn test_header_only() {
        let mut store = BlockStore::new(test_config(200));
        let summary = load_reader("tconst\taverageRating\tnumVotes\n".as_bytes(), &mut store)
            .expect("load");
        assert_eq!(summary.records, 0);
        assert_eq!(store.blocks_used(), 0);
    }

    #[test]
    fn test_bad_row_reports_line() {
        let mut store = BlockStore::new(test_config(200));
        let input = "header\ntt1\t5.0\t10\ntt2\tnot-a-number\t3\n";
        let err = load_reader(input.as_bytes(), &mut store).expect_err("bad rating");
        assert!(matches!(err, LoadError::Parse { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_missing_field() {
        let mut store = BlockStore::new(test_config(200));
        let err = load_reader("header\ntt1\t5.0\n".as_bytes(), &mut store).expect_err("short row");
        assert!(matches!(err, LoadError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_long_tconst_rejected() {
        let mut store = BlockStore::new(test_config(200));
        let err = load_reader("header\ntt0123456789\t5.0\t1\n".as_bytes(), &mut store)
            .expect_err("tconst too long");
        assert!(matches!(err, LoadError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_load_tsv_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write");

        let mut store = BlockStore::new(test_config(500));
        let summary = load_tsv(file.path(), &mut store).expect("load");
        assert_eq!(summary.records, 3);
        assert_eq!(store.blocks_used(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = BlockStore::new(test_config(200));
        let err = load_tsv(&dir.path().join("absent.tsv"), &mut store).expect_err("no file");
        assert!(matches!(err, LoadError::Io(_)));
    }
}
