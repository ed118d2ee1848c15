use crate::config::MatrixConfig;
use crate::error::{IndexError, Result};
use crate::hash::ElementHasher;
use crate::row::{ColourSet, get_bit, normalize_row, row_width};
use crate::storage::RowStore;
use bitvec::{bitvec, order::Lsb0, slice::BitSlice, vec::BitVec};
use std::collections::BTreeSet;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tracing::debug;

/// A single colour's Bloom filter, one bit per matrix row.
pub type BloomBits = BitVec<usize, Lsb0>;

/// Matrix of Bloom filters stored bit-sliced by row.
///
/// Row `r` holds bit `r` of every colour's filter, so testing one hash
/// position across all colours is a single row read. The matrix keeps no row
/// cache: every call reads through to the store.
pub struct BitMatrix<S: RowStore> {
    store: S,
    size: usize,
    num_hashes: usize,
    num_colours: AtomicUsize,
    max_colours: usize,
    batch_size: usize,
    hasher: Arc<dyn ElementHasher>,
}

impl<S: RowStore> BitMatrix<S> {
    pub fn new(store: S, config: &MatrixConfig) -> Result<Self> {
        Self::with_hasher(store, config, config.hash_kind.build())
    }

    /// Creates a matrix with an explicit hasher instead of the one named by
    /// `config.hash_kind`.
    pub fn with_hasher(
        store: S,
        config: &MatrixConfig,
        hasher: Arc<dyn ElementHasher>,
    ) -> Result<Self> {
        config.validate()?;

        debug!(
            size = config.size,
            num_hashes = config.num_hashes,
            num_colours = config.num_colours,
            hasher = hasher.name(),
            "creating bit matrix"
        );

        Ok(Self {
            store,
            size: config.size,
            num_hashes: config.num_hashes,
            num_colours: AtomicUsize::new(config.num_colours),
            max_colours: config.max_colours,
            batch_size: config.batch_size,
            hasher,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    pub fn num_colours(&self) -> usize {
        self.num_colours.load(Ordering::Acquire)
    }

    /// Packed width in bytes of a row at the current colour count.
    pub fn row_width(&self) -> usize {
        row_width(self.num_colours())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn hasher_name(&self) -> &'static str {
        self.hasher.name()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Raises the colour count to at least `num_colours`. Growing to the same
    /// or a smaller value is a no-op. Returns true if the count changed.
    pub fn grow_colours(&self, num_colours: usize) -> bool {
        let previous =
            self.num_colours.fetch_max(num_colours, Ordering::AcqRel);
        previous < num_colours
    }

    pub fn max_colours(&self) -> usize {
        self.max_colours
    }

    fn check_colour(&self, colour: usize) -> Result<()> {
        if colour >= self.max_colours {
            return Err(IndexError::InvalidColour(format!(
                "{colour} is not below the limit of {} colours",
                self.max_colours
            )));
        }
        Ok(())
    }

    /// Row index of `element` under hash seed `seed`.
    pub fn hash(&self, element: &[u8], seed: u32) -> usize {
        self.hasher.hash32(element, seed) as usize % self.size
    }

    /// One row index per seed in `0..num_hashes`, duplicates kept.
    pub fn hashes(&self, element: &[u8]) -> Vec<usize> {
        (0..self.num_hashes as u32)
            .map(|seed| self.hash(element, seed))
            .collect()
    }

    /// Sets bit `colour` in every row `element` hashes to.
    pub fn add(&mut self, element: &[u8], colour: usize) -> Result<()> {
        self.check_colour(colour)?;
        let rows = self.hashes(element);
        self.grow_colours(colour.saturating_add(1));
        self.store.set_bits(&rows, colour, true)
    }

    /// ORs a full Bloom filter into colour `colour`.
    pub fn add_column(
        &mut self,
        bloom: &BitSlice<usize, Lsb0>,
        colour: usize,
    ) -> Result<()> {
        self.check_colour(colour)?;
        if bloom.len() != self.size {
            return Err(IndexError::BloomLengthMismatch {
                expected: self.size,
                actual: bloom.len(),
            });
        }
        self.grow_colours(colour.saturating_add(1));

        let mut batch = Vec::with_capacity(self.batch_size.min(self.size));
        let mut written = 0usize;
        for row in bloom.iter_ones() {
            batch.push(row);
            if batch.len() == self.batch_size {
                self.store.set_bits(&batch, colour, true)?;
                written += batch.len();
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.store.set_bits(&batch, colour, true)?;
            written += batch.len();
        }

        debug!(colour, rows = written, "added column");
        Ok(())
    }

    /// True if every row `element` hashes to has bit `colour` set.
    pub fn contains(&self, element: &[u8], colour: usize) -> Result<bool> {
        let num_colours = self.num_colours();
        if colour >= num_colours {
            return Ok(false);
        }
        let width = row_width(num_colours);
        let rows = self.hashes(element);
        let fetched = self.store.get_rows(&rows)?;

        for (&row, bytes) in rows.iter().zip(fetched) {
            let bytes = normalize_row(row, bytes, width)?;
            if !get_bit(&bytes, colour) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Colours whose filters contain `element`.
    pub fn lookup(&self, element: &[u8]) -> Result<ColourSet> {
        let rows = self.hashes(element);
        self.and_rows(&rows)
    }

    /// Colours whose filters contain every one of `elements`.
    pub fn lookup_all_present<E: AsRef<[u8]>>(
        &self,
        elements: &[E],
    ) -> Result<ColourSet> {
        if elements.is_empty() {
            return Err(IndexError::EmptyQuery);
        }
        let rows: BTreeSet<usize> = elements
            .iter()
            .flat_map(|element| self.hashes(element.as_ref()))
            .collect();
        let rows: Vec<usize> = rows.into_iter().collect();
        self.and_rows(&rows)
    }

    fn and_rows(&self, rows: &[usize]) -> Result<ColourSet> {
        let num_colours = self.num_colours();
        let width = row_width(num_colours);
        let mut result = ColourSet::full(num_colours);

        for chunk in rows.chunks(self.batch_size) {
            if result.is_empty() {
                break;
            }
            let fetched = self.store.get_rows(chunk)?;
            for (&row, bytes) in chunk.iter().zip(fetched) {
                let bytes = normalize_row(row, bytes, width)?;
                result.and_row(&bytes);
            }
        }
        Ok(result)
    }

    /// Reconstructs colour `colour`'s Bloom filter from every row.
    pub fn get_column(&self, colour: usize) -> Result<BloomBits> {
        let width = self.row_width();
        let mut bits = bitvec![usize, Lsb0; 0; self.size];

        let mut start = 0;
        while start < self.size {
            let end = (start + self.batch_size).min(self.size);
            for (row, bytes) in self.store.scan(start, end)? {
                if bytes.len() > width {
                    return Err(IndexError::RowWidthMismatch {
                        row,
                        expected: width,
                        actual: bytes.len(),
                    });
                }
                if get_bit(&bytes, colour) {
                    bits.set(row, true);
                }
            }
            start = end;
        }
        Ok(bits)
    }

    /// Clears colour `colour` in every row. Returns the number of bits cleared.
    pub fn clear_column(&mut self, colour: usize) -> Result<usize> {
        let column = self.get_column(colour)?;
        let rows: Vec<usize> = column.iter_ones().collect();
        for chunk in rows.chunks(self.batch_size) {
            self.store.set_bits(chunk, colour, false)?;
        }
        debug!(colour, rows = rows.len(), "cleared column");
        Ok(rows.len())
    }

    /// Rows `[start, end)` padded to the current width, absent rows as zeros.
    pub fn read_rows(&self, start: usize, end: usize) -> Result<Vec<Vec<u8>>> {
        let end = end.min(self.size);
        if start >= end {
            return Ok(Vec::new());
        }
        let width = self.row_width();
        let mut dense = vec![vec![0u8; width]; end - start];
        for (row, bytes) in self.store.scan(start, end)? {
            if let Some(slot) = dense.get_mut(row.wrapping_sub(start)) {
                *slot = normalize_row(row, bytes, width)?;
            }
        }
        Ok(dense)
    }

    /// Replaces whole rows. Rows at or beyond `size` are rejected.
    pub fn write_rows(&mut self, rows: &[(usize, Vec<u8>)]) -> Result<()> {
        if let Some(&(row, _)) =
            rows.iter().find(|(row, _)| *row >= self.size)
        {
            return Err(IndexError::InvalidConfig(format!(
                "Row {row} is outside a matrix of {} rows",
                self.size
            )));
        }
        self.store.set_rows(rows)
    }
}
