//! Self-describing export framing.
//!
//! ```text
//! magic[4] = "BSBI"
//! version: u16 | hash strategy id: u8 | size: u64 | num_hashes: u32 | num_colours: u64
//! names_len: u32 | names: JSON array of (string | null), names_len bytes
//! size records of ceil(num_colours / 8) bytes, row order
//! ```
//!
//! Integers are fixed-width little endian. The record section is byte for
//! byte the headerless `dump` format.

use crate::error::{IndexError, Result};
use crate::hash::HashKind;
use std::io::{Read, Write};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"BSBI";
pub const SNAPSHOT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 8 + 4 + 8;

const MAX_NAMES_LEN: u32 = 256 * 1024 * 1024;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub hash_kind: HashKind,
    pub size: usize,
    pub num_hashes: usize,
    pub num_colours: usize,
}

impl SnapshotHeader {
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        let fields = bincode::encode_to_vec(
            (
                SNAPSHOT_VERSION,
                self.hash_kind.id(),
                self.size as u64,
                self.num_hashes as u32,
                self.num_colours as u64,
            ),
            bincode_config(),
        )?;
        sink.write_all(SNAPSHOT_MAGIC)?;
        sink.write_all(&fields)?;
        Ok(())
    }

    pub fn read_from<R: Read>(source: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        source.read_exact(&mut buf)?;

        if &buf[..4] != SNAPSHOT_MAGIC {
            return Err(IndexError::SerializationError(
                "Bad snapshot magic".to_string(),
            ));
        }

        let ((version, hash_id, size, num_hashes, num_colours), _): (
            (u16, u8, u64, u32, u64),
            usize,
        ) = bincode::decode_from_slice(&buf[4..], bincode_config())?;

        if version != SNAPSHOT_VERSION {
            return Err(IndexError::SerializationError(format!(
                "Unsupported snapshot version {version}"
            )));
        }

        Ok(Self {
            hash_kind: HashKind::from_id(hash_id)?,
            size: size as usize,
            num_hashes: num_hashes as usize,
            num_colours: num_colours as usize,
        })
    }
}

pub fn write_names<W: Write>(
    sink: &mut W,
    names: &[Option<String>],
) -> Result<()> {
    let encoded = serde_json::to_vec(names)?;
    let len = u32::try_from(encoded.len()).map_err(|_| {
        IndexError::SerializationError(
            "Colour name table too large".to_string(),
        )
    })?;
    sink.write_all(&len.to_le_bytes())?;
    sink.write_all(&encoded)?;
    Ok(())
}

pub fn read_names<R: Read>(source: &mut R) -> Result<Vec<Option<String>>> {
    let mut len_buf = [0u8; 4];
    source.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_NAMES_LEN {
        return Err(IndexError::SerializationError(format!(
            "Colour name table of {len} bytes exceeds limit"
        )));
    }
    let mut encoded = vec![0u8; len as usize];
    source.read_exact(&mut encoded)?;
    Ok(serde_json::from_slice(&encoded)?)
}
