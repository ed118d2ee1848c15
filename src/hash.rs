use crate::error::{IndexError, Result};
use fnv::FnvHasher;
use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

/// A seeded 32-bit hash over raw element bytes.
///
/// Row indices derived from these hashes are persisted, so an implementation
/// must return the same value for the same `(element, seed)` in every
/// process. Text elements are hashed as their UTF-8 bytes.
pub trait ElementHasher: Send + Sync {
    fn hash32(&self, element: &[u8], seed: u32) -> u32;

    /// Short stable name, used in logs and in the CLI.
    fn name(&self) -> &'static str;
}

/// MurmurHash3 x86_32, the default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3Hasher;

impl ElementHasher for Murmur3Hasher {
    fn hash32(&self, element: &[u8], seed: u32) -> u32 {
        let mut cursor = Cursor::new(element);
        murmur3_32(&mut cursor, seed)
            .expect("reading from an in-memory cursor cannot fail")
    }

    fn name(&self) -> &'static str {
        "murmur3"
    }
}

/// FNV-1a 64 with the seed mixed in ahead of the element, folded to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aHasher;

impl ElementHasher for Fnv1aHasher {
    fn hash32(&self, element: &[u8], seed: u32) -> u32 {
        let mut hasher = FnvHasher::default();
        hasher.write(&seed.to_le_bytes());
        hasher.write(element);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }

    fn name(&self) -> &'static str {
        "fnv1a"
    }
}

/// Hash strategy selected at construction and recorded in snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    #[default]
    Murmur3,
    Fnv1a,
}

impl HashKind {
    /// Stable on-disk identifier.
    pub fn id(self) -> u8 {
        match self {
            HashKind::Murmur3 => 1,
            HashKind::Fnv1a => 2,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(HashKind::Murmur3),
            2 => Ok(HashKind::Fnv1a),
            other => Err(IndexError::InvalidConfig(format!(
                "Unknown hash strategy id {other}"
            ))),
        }
    }

    pub fn build(self) -> Arc<dyn ElementHasher> {
        match self {
            HashKind::Murmur3 => Arc::new(Murmur3Hasher),
            HashKind::Fnv1a => Arc::new(Fnv1aHasher),
        }
    }
}

impl FromStr for HashKind {
    type Err = IndexError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "murmur3" | "mmh3" => Ok(HashKind::Murmur3),
            "fnv1a" | "fnv" => Ok(HashKind::Fnv1a),
            other => Err(IndexError::InvalidConfig(format!(
                "Hash strategy '{other}' is not available"
            ))),
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Murmur3 => write!(f, "murmur3"),
            HashKind::Fnv1a => write!(f, "fnv1a"),
        }
    }
}

pub fn optimal_bit_vector_size(n: usize, fpr: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    ((-(n as f64) * fpr.ln()) / (ln2 * ln2)).ceil() as usize
}

pub fn optimal_num_hashes(n: usize, m: usize) -> usize {
    (((m as f64 / n as f64) * std::f64::consts::LN_2).round() as usize).max(1)
}

/// Expected false positive rate of a single filter with `set_bits` of `size`
/// bits set and `num_hashes` probes.
pub fn estimate_false_positive_rate(
    set_bits: usize,
    size: usize,
    num_hashes: usize,
) -> f64 {
    if size == 0 {
        return 1.0;
    }
    let fill = set_bits as f64 / size as f64;
    fill.powi(num_hashes as i32)
}
