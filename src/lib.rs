//! Bit-sliced Bloom filter matrix with pluggable row storage.
//!
//! The index keeps one Bloom filter per *colour* (a genome, a document, a
//! dataset) and stores them transposed: row `r` of the matrix holds bit `r`
//! of every colour's filter, packed one bit per colour.
//!
//! HowTo:
//!    * Hashing: an element is hashed with seeds `0..num_hashes`, each hash
//!      reduced modulo `size`, giving `num_hashes` row indices.
//!    * Insertion: set bit `colour` in each of those rows, or OR a whole
//!      prebuilt Bloom filter into the colour's column.
//!    * Query: read the element's rows and AND them. The surviving bits are
//!      the colours that probably contain the element.
//!    * Storage: rows live in a [`RowStore`]; in memory, redb and fjall
//!      implementations are provided.
//!
//! Obvious problems:
//!     * False Positives: every colour's filter has the usual Bloom filter
//!       false positive rate, which grows with its fill ratio.
//!     * Synchronization: the matrix does no locking. Concurrent writers must
//!       be serialised by the caller or by the row store.
//!     * Hashes are 32 bit, so rows past 2**32 are never addressed.

pub mod common;
pub mod config;
mod error;
mod hash;
pub mod index;
pub mod matrix;
pub mod row;
pub mod snapshot;
pub mod storage;

pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_COLOURS, IndexMeta, MatrixConfig,
    MatrixConfigBuilder, MatrixConfigBuilderError,
};
pub use error::{IndexError, Result};
pub use hash::{
    ElementHasher, Fnv1aHasher, HashKind, Murmur3Hasher,
    estimate_false_positive_rate, optimal_bit_vector_size, optimal_num_hashes,
};
pub use index::{
    InMemoryIndex, IndexStats, ProbabilisticIndex, SearchHit, parse_colour,
};
pub use matrix::{BitMatrix, BloomBits};
pub use row::ColourSet;
pub use storage::{InMemoryRowStore, RowStore};
#[cfg(feature = "fjall")]
pub use storage::{
    FjallRowStore, FjallRowStoreConfig, FjallRowStoreConfigBuilder,
};
#[cfg(feature = "redb")]
pub use storage::{RedbRowStore, RedbRowStoreConfig, RedbRowStoreConfigBuilder};
