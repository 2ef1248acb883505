//! Block-oriented record storage with a B+ tree secondary index.
//!
//! # Layout
//!
//! The simulated disk is one byte buffer split into fixed-size blocks. Each
//! block holds `block_size / RECORD_SIZE` record slots:
//!
//! ```text
//! block 0                     block 1
//! [slot 0][slot 1]...[pad]    [slot 0][slot 1]...[pad]    ...
//! ```
//!
//! A record slot is 19 bytes: empty flag, 10-byte `tconst`, `f32` rating,
//! `i32` vote count, all little-endian.
//!
//! # Usage
//!
//! ```
//! use blockdex::config::StoreConfig;
//! use blockdex::storage::{Database, Record, Tconst};
//!
//! let config = StoreConfig::new(200, 1 << 20).expect("valid config");
//! let mut db = Database::new(config);
//! db.insert_record(Record::new(Tconst::parse("tt0000001").expect("tconst"), 5.6, 1645))
//!     .expect("insert");
//! db.build_index().expect("index");
//!
//! let found = db.search(1645).expect("search");
//! assert_eq!(found.len(), 1);
//! assert_eq!(db.access_log().block_accesses(), 1);
//! ```

mod block;
pub mod btree;
mod database;
mod record;
mod store;

pub use block::{Block, BlockId, Location};
pub use database::{Database, DatabaseError};
pub use record::{RECORD_SIZE, Record, RecordError, TCONST_LEN, Tconst};
pub use store::{BlockStore, StoreError};
