use crate::error::{IndexError, Result};
use crate::hash::{HashKind, optimal_bit_vector_size, optimal_num_hashes};
use crate::row::row_width;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Rows read or written per storage call during bulk operations.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Upper bound on colour ids accepted by the index.
pub const DEFAULT_MAX_COLOURS: usize = 1 << 24;

/// Construction parameters of a bit matrix.
///
/// `size`, `num_hashes` and `hash_kind` fix the row index of every element and
/// therefore the on-disk layout; they never change after creation.
/// `num_colours` is only the initial width and grows as colours are inserted.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct MatrixConfig {
    /// Number of rows, i.e. the length of every colour's Bloom filter
    #[builder(default = "25_000_000")]
    pub size: usize,

    /// Number of hash functions (seeds `0..num_hashes`)
    #[builder(default = "3")]
    pub num_hashes: usize,

    /// Initial number of colours
    #[builder(default = "0")]
    pub num_colours: usize,

    /// Hash strategy used to map elements to rows
    #[builder(default)]
    pub hash_kind: HashKind,

    /// Colour ids at or above this value are rejected
    #[builder(default = "DEFAULT_MAX_COLOURS")]
    pub max_colours: usize,

    /// Rows per storage round-trip for dump, load, merge and column scans
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
}

impl MatrixConfig {
    /// Derives `size` and `num_hashes` for `capacity` elements per colour at
    /// the requested false positive rate.
    pub fn from_capacity(
        capacity: usize,
        false_positive_rate: f64,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(IndexError::InvalidConfig(
                "Capacity must be greater than 0".to_string(),
            ));
        }
        if false_positive_rate <= 0.0 || false_positive_rate >= 1.0 {
            return Err(IndexError::InvalidConfig(format!(
                "False positive rate must be between 0 and 1, \
                 got {false_positive_rate}"
            )));
        }
        let size = optimal_bit_vector_size(capacity, false_positive_rate);
        let num_hashes = optimal_num_hashes(capacity, size);

        MatrixConfigBuilder::default()
            .size(size)
            .num_hashes(num_hashes)
            .build()
            .map_err(|e| IndexError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(IndexError::InvalidConfig(
                "Size must be greater than 0".to_string(),
            ));
        }
        if self.num_hashes == 0 {
            return Err(IndexError::InvalidConfig(
                "Number of hashes must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(IndexError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.max_colours == 0 {
            return Err(IndexError::InvalidConfig(
                "Max colours must be greater than 0".to_string(),
            ));
        }
        if self.num_colours > self.max_colours {
            return Err(IndexError::InvalidConfig(format!(
                "Initial colour count {} exceeds max colours {}",
                self.num_colours, self.max_colours
            )));
        }
        Ok(())
    }

    /// Packed row width in bytes for the initial colour count.
    pub fn row_width(&self) -> usize {
        row_width(self.num_colours)
    }

    /// True when two matrices hash elements to the same rows.
    pub fn is_compatible(&self, other: &MatrixConfig) -> bool {
        self.size == other.size
            && self.num_hashes == other.num_hashes
            && self.hash_kind == other.hash_kind
    }
}

/// Everything a persistent row store keeps next to the rows so an index can
/// be reopened without out-of-band parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub config: MatrixConfig,
    pub num_colours: usize,
    pub colour_names: Vec<Option<String>>,
}

impl IndexMeta {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
