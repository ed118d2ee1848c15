//! Packed row layout.
//!
//! A row holds one bit per colour, `ceil(num_colours / 8)` bytes, most
//! significant bit first: colour `c` lives in byte `c / 8` under mask
//! `0x80 >> (c % 8)`. This is exactly the layout of `BitVec<u8, Msb0>`.

use crate::error::{IndexError, Result};
use bitvec::prelude::*;

pub fn row_width(num_colours: usize) -> usize {
    num_colours.div_ceil(8)
}

#[inline]
fn colour_mask(colour: usize) -> u8 {
    0x80 >> (colour % 8)
}

pub fn get_bit(row: &[u8], colour: usize) -> bool {
    row.get(colour / 8)
        .is_some_and(|byte| byte & colour_mask(colour) != 0)
}

/// Sets or clears `colour` in `row`, zero-extending the row when a bit past
/// its end is set.
pub fn set_bit(row: &mut Vec<u8>, colour: usize, bit: bool) {
    let byte = colour / 8;
    if byte >= row.len() {
        if !bit {
            return;
        }
        row.resize(byte + 1, 0);
    }
    if bit {
        row[byte] |= colour_mask(colour);
    } else {
        row[byte] &= !colour_mask(colour);
    }
}

/// Brings a stored row to `width` bytes.
///
/// Short rows are zero-extended (colours added after the row was last
/// written). Long rows mean the store and the colour count disagree.
pub fn normalize_row(
    row: usize,
    mut bytes: Vec<u8>,
    width: usize,
) -> Result<Vec<u8>> {
    if bytes.len() > width {
        return Err(IndexError::RowWidthMismatch {
            row,
            expected: width,
            actual: bytes.len(),
        });
    }
    bytes.resize(width, 0);
    Ok(bytes)
}

/// Clears the bits of `row` past colour `num_colours - 1` in its last byte.
pub fn mask_padding(row: &mut [u8], num_colours: usize) {
    let used = num_colours % 8;
    if used == 0 {
        return;
    }
    if let Some(last) = row.get_mut(num_colours / 8) {
        *last &= 0xff << (8 - used);
    }
}

/// Appends the first `right_colours` bits of `right` after the first
/// `left_colours` bits of `left`.
pub fn concat_rows(
    left: Vec<u8>,
    left_colours: usize,
    right: &[u8],
    right_colours: usize,
) -> Vec<u8> {
    let mut bits = BitVec::<u8, Msb0>::from_vec(left);
    bits.resize(left_colours, false);
    let right_bits = right.view_bits::<Msb0>();
    let take = right_colours.min(right_bits.len());
    bits.extend_from_bitslice(&right_bits[..take]);
    bits.resize(left_colours + right_colours, false);
    bits.set_uninitialized(false);
    bits.into_vec()
}

/// Set of colours, as returned by matrix lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColourSet {
    bits: BitVec<u8, Msb0>,
}

impl ColourSet {
    pub fn empty(num_colours: usize) -> Self {
        Self {
            bits: bitvec![u8, Msb0; 0; num_colours],
        }
    }

    pub fn full(num_colours: usize) -> Self {
        let mut bits = bitvec![u8, Msb0; 1; num_colours];
        bits.set_uninitialized(false);
        Self { bits }
    }

    /// Interprets packed row bytes as a set over `num_colours` colours.
    pub fn from_row(bytes: Vec<u8>, num_colours: usize) -> Self {
        let mut bits = BitVec::<u8, Msb0>::from_vec(bytes);
        bits.resize(num_colours, false);
        bits.set_uninitialized(false);
        Self { bits }
    }

    /// Intersects with a packed row. Missing trailing bytes count as zero.
    pub fn and_row(&mut self, row: &[u8]) {
        for (i, byte) in self.bits.as_raw_mut_slice().iter_mut().enumerate() {
            *byte &= row.get(i).copied().unwrap_or(0);
        }
    }

    pub fn contains(&self, colour: usize) -> bool {
        self.bits.get(colour).is_some_and(|bit| *bit)
    }

    pub fn insert(&mut self, colour: usize) {
        if colour >= self.bits.len() {
            self.bits.resize(colour + 1, false);
        }
        self.bits.set(colour, true);
    }

    /// Number of colours in the set.
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Number of colours the set ranges over.
    pub fn num_colours(&self) -> usize {
        self.bits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Packed representation, same layout as a stored row.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }
}
