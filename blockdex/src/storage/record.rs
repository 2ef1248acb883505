//! Fixed-width record format.
//!
//! Every record occupies exactly `RECORD_SIZE` bytes inside a block:
//!
//! ```text
//! +-----------+--------------------+------------------+----------------+
//! | empty (1) | tconst (10, ASCII) | avg rating (f32) | num votes (i32)|
//! +-----------+--------------------+------------------+----------------+
//! ```
//!
//! Numbers are little-endian. `tconst` is NUL padded. An empty slot has the
//! flag byte set to 1 and is otherwise ignored.

/// Length of the `tconst` field in bytes.
pub const TCONST_LEN: usize = 10;

/// Serialized size of a record.
pub const RECORD_SIZE: usize = 1 + TCONST_LEN + 4 + 4;

const FLAG_OFFSET: usize = 0;
const TCONST_OFFSET: usize = 1;
const RATING_OFFSET: usize = TCONST_OFFSET + TCONST_LEN;
const VOTES_OFFSET: usize = RATING_OFFSET + 4;

const FLAG_EMPTY: u8 = 1;
const FLAG_USED: u8 = 0;

/// A fixed-length ASCII title identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tconst(pub [u8; TCONST_LEN]);

impl Tconst {
    /// Build a `tconst` from a string, padding with NUL bytes.
    pub fn parse(value: &str) -> Result<Self, RecordError> {
        if !value.is_ascii() {
            return Err(RecordError::NonAscii);
        }
        if value.len() > TCONST_LEN {
            return Err(RecordError::TconstTooLong(value.len()));
        }
        let mut bytes = [0u8; TCONST_LEN];
        bytes[..value.len()].copy_from_slice(value.as_bytes());
        Ok(Self(bytes))
    }

    /// The identifier without padding.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TCONST_LEN);
        std::str::from_utf8(&self.0[..end]).map_or("", str::trim_end)
    }
}

impl std::fmt::Display for Tconst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A movie rating row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Tombstone flag. Empty records occupy a reusable slot.
    pub empty: bool,
    pub tconst: Tconst,
    pub average_rating: f32,
    pub num_votes: i32,
}

impl Record {
    /// Create a live record.
    #[must_use]
    pub const fn new(tconst: Tconst, average_rating: f32, num_votes: i32) -> Self {
        Self {
            empty: false,
            tconst,
            average_rating,
            num_votes,
        }
    }

    /// Create an empty slot.
    #[must_use]
    pub const fn tombstone() -> Self {
        Self {
            empty: true,
            tconst: Tconst([0u8; TCONST_LEN]),
            average_rating: 0.0,
            num_votes: 0,
        }
    }

    /// Serialize into the first `RECORD_SIZE` bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than `RECORD_SIZE`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        assert!(
            buf.len() >= RECORD_SIZE,
            "record buffer must hold {RECORD_SIZE} bytes"
        );
        buf[FLAG_OFFSET] = if self.empty { FLAG_EMPTY } else { FLAG_USED };
        buf[TCONST_OFFSET..RATING_OFFSET].copy_from_slice(&self.tconst.0);
        buf[RATING_OFFSET..VOTES_OFFSET].copy_from_slice(&self.average_rating.to_le_bytes());
        buf[VOTES_OFFSET..RECORD_SIZE].copy_from_slice(&self.num_votes.to_le_bytes());
    }

    /// Serialize to a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Deserialize from the first `RECORD_SIZE` bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < RECORD_SIZE {
            return Err(RecordError::Malformed {
                expected: RECORD_SIZE,
                actual: buf.len(),
            });
        }

        let mut tconst = [0u8; TCONST_LEN];
        tconst.copy_from_slice(&buf[TCONST_OFFSET..RATING_OFFSET]);
        let rating = [
            buf[RATING_OFFSET],
            buf[RATING_OFFSET + 1],
            buf[RATING_OFFSET + 2],
            buf[RATING_OFFSET + 3],
        ];
        let votes = [
            buf[VOTES_OFFSET],
            buf[VOTES_OFFSET + 1],
            buf[VOTES_OFFSET + 2],
            buf[VOTES_OFFSET + 3],
        ];

        Ok(Self {
            empty: buf[FLAG_OFFSET] == FLAG_EMPTY,
            tconst: Tconst(tconst),
            average_rating: f32::from_le_bytes(rating),
            num_votes: i32::from_le_bytes(votes),
        })
    }
}

/// Errors produced by the record codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The buffer is shorter than a record.
    Malformed { expected: usize, actual: usize },
    /// The identifier does not fit the fixed-width field.
    TconstTooLong(usize),
    /// The identifier contains non-ASCII characters.
    NonAscii,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { expected, actual } => {
                write!(f, "malformed record: need {expected} bytes, got {actual}")
            }
            Self::TconstTooLong(len) => {
                write!(f, "tconst is {len} bytes (max {TCONST_LEN})")
            }
            Self::NonAscii => write!(f, "tconst must be ASCII"),
        }
    }
}

impl std::error::Error for RecordError {}
