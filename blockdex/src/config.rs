//! Storage and experiment configuration.
//!
//! `StoreConfig` fixes the simulated disk geometry for the lifetime of a
//! store. `ExperimentConfig` is loaded from environment variables by the
//! experiment binary.
//!
//! # Environment Variables
//!
//! - `BLOCKDEX_DATA_PATH`: TSV file to load (default: `./data.tsv`)
//! - `BLOCKDEX_BLOCK_SIZES`: comma separated block sizes (default: `200,500`)
//! - `BLOCKDEX_MEMORY_SIZE`: bytes of simulated disk (default: `104857600`)
//!
//! # Invariants
//!
//! - `record_size <= block_size`
//! - the derived fan-out is at least 2
//! - `memory_size` holds at least one block

use std::path::PathBuf;

use crate::storage::RECORD_SIZE;

/// Bytes of block header assumed by the fan-out formula.
const NODE_HEADER_BYTES: usize = 4;

/// Bytes per (key, pointer) pair assumed by the fan-out formula.
const NODE_ENTRY_BYTES: usize = 18;

/// Bytes of chunk header assumed by the overflow chunk formula.
const CHUNK_HEADER_BYTES: usize = 2;

/// Bytes per location assumed by the overflow chunk formula.
const CHUNK_ENTRY_BYTES: usize = 12;

/// Smallest fan-out for which split and merge keep every node legal.
pub const MIN_FAN_OUT: usize = 2;

/// Geometry of the simulated disk.
///
/// # Post-conditions
///
/// When constructed via `new()` every derived quantity is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Size of one block in bytes.
    pub block_size: usize,
    /// Size of one record slot in bytes.
    pub record_size: usize,
    /// Total bytes of simulated disk.
    pub memory_size: usize,
}

/// Error returned when a configuration is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A record would not fit in a single block.
    RecordLargerThanBlock { record_size: usize, block_size: usize },
    /// The block is too small to hold a useful tree node.
    FanOutTooSmall { block_size: usize, fan_out: usize },
    /// The memory budget cannot hold a single block.
    MemoryTooSmall { memory_size: usize, block_size: usize },
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordLargerThanBlock {
                record_size,
                block_size,
            } => write!(
                f,
                "record size {record_size} exceeds block size {block_size}"
            ),
            Self::FanOutTooSmall {
                block_size,
                fan_out,
            } => write!(
                f,
                "block size {block_size} gives fan-out {fan_out} (need at least {MIN_FAN_OUT})"
            ),
            Self::MemoryTooSmall {
                memory_size,
                block_size,
            } => write!(
                f,
                "memory size {memory_size} cannot hold one block of {block_size} bytes"
            ),
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default simulated disk size (100 MiB).
    pub const DEFAULT_MEMORY_SIZE: usize = 100 << 20;

    /// Build a validated configuration using the fixed record size.
    pub fn new(block_size: usize, memory_size: usize) -> Result<Self, ConfigError> {
        Self::with_record_size(block_size, RECORD_SIZE, memory_size)
    }

    /// Build a validated configuration with an explicit record size.
    pub fn with_record_size(
        block_size: usize,
        record_size: usize,
        memory_size: usize,
    ) -> Result<Self, ConfigError> {
        if record_size == 0 || record_size > block_size {
            return Err(ConfigError::RecordLargerThanBlock {
                record_size,
                block_size,
            });
        }

        let fan_out = fan_out_for(block_size);
        if fan_out < MIN_FAN_OUT {
            return Err(ConfigError::FanOutTooSmall {
                block_size,
                fan_out,
            });
        }

        if memory_size < block_size {
            return Err(ConfigError::MemoryTooSmall {
                memory_size,
                block_size,
            });
        }

        Ok(Self {
            block_size,
            record_size,
            memory_size,
        })
    }

    /// Number of record slots in one block.
    #[must_use]
    pub const fn records_per_block(&self) -> usize {
        self.block_size / self.record_size
    }

    /// Maximum number of blocks the memory budget allows.
    #[must_use]
    pub const fn capacity_blocks(&self) -> usize {
        self.memory_size / self.block_size
    }

    /// Maximum separator keys per internal node (`n`).
    #[must_use]
    pub const fn fan_out(&self) -> usize {
        fan_out_for(self.block_size)
    }

    /// Locations held by one overflow chunk.
    #[must_use]
    pub const fn overflow_chunk_capacity(&self) -> usize {
        let capacity = self.block_size.saturating_sub(CHUNK_HEADER_BYTES) / CHUNK_ENTRY_BYTES;
        if capacity == 0 { 1 } else { capacity }
    }
}

/// Fan-out for a block: a 4-byte header followed by 18-byte key/pointer pairs.
#[must_use]
pub const fn fan_out_for(block_size: usize) -> usize {
    block_size.saturating_sub(NODE_HEADER_BYTES) / NODE_ENTRY_BYTES
}

/// Configuration for the experiment binary.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// TSV file with one header line followed by `tconst rating votes` rows.
    pub data_path: PathBuf,
    /// Block sizes to run the experiments with, in order.
    pub block_sizes: Vec<usize>,
    /// Simulated disk size shared by every run.
    pub memory_size: usize,
}

impl ExperimentConfig {
    /// Default data file.
    pub const DEFAULT_DATA_PATH: &'static str = "./data.tsv";
    /// Default block sizes.
    pub const DEFAULT_BLOCK_SIZES: [usize; 2] = [200, 500];

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_path = std::env::var("BLOCKDEX_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_DATA_PATH));

        let block_sizes = match std::env::var("BLOCKDEX_BLOCK_SIZES") {
            Ok(value) => parse_block_sizes(&value)?,
            Err(_) => Self::DEFAULT_BLOCK_SIZES.to_vec(),
        };

        let memory_size = match std::env::var("BLOCKDEX_MEMORY_SIZE") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "BLOCKDEX_MEMORY_SIZE".to_string(),
                    message: format!("'{value}' is not a byte count"),
                })?,
            Err(_) => StoreConfig::DEFAULT_MEMORY_SIZE,
        };

        Ok(Self {
            data_path,
            block_sizes,
            memory_size,
        })
    }
}

/// Parse a comma separated list of block sizes.
fn parse_block_sizes(value: &str) -> Result<Vec<usize>, ConfigError> {
    let sizes = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                name: "BLOCKDEX_BLOCK_SIZES".to_string(),
                message: format!("'{s}' is not a block size"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if sizes.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: "BLOCKDEX_BLOCK_SIZES".to_string(),
            message: "must list at least one block size".to_string(),
        });
    }

    Ok(sizes)
}
