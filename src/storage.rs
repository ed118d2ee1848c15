use crate::error::Result;
use crate::row::set_bit;
use std::collections::BTreeMap;

#[cfg(feature = "fjall")]
mod fjall_storage;
#[cfg(feature = "redb")]
mod redb_storage;

#[cfg(feature = "fjall")]
pub use fjall_storage::{
    FjallRowStore, FjallRowStoreConfig, FjallRowStoreConfigBuilder,
};
#[cfg(feature = "redb")]
pub use redb_storage::{
    RedbRowStore, RedbRowStoreConfig, RedbRowStoreConfigBuilder,
};

/// Byte-oriented row storage behind a bit matrix.
///
/// The store exclusively owns row bytes. A row that was never written reads
/// as empty bytes, which the matrix treats as all-zero. Implementations do
/// no width checking; they keep whatever bytes they are given.
pub trait RowStore {
    /// Gets one row, empty if absent
    fn get_row(&self, row: usize) -> Result<Vec<u8>>;

    /// Gets multiple rows, in the order requested
    fn get_rows(&self, rows: &[usize]) -> Result<Vec<Vec<u8>>> {
        rows.iter().map(|&row| self.get_row(row)).collect()
    }

    /// Replaces one row
    fn set_row(&mut self, row: usize, bytes: &[u8]) -> Result<()>;

    /// Replaces multiple rows in one round-trip where the backend allows it
    fn set_rows(&mut self, rows: &[(usize, Vec<u8>)]) -> Result<()> {
        for (row, bytes) in rows {
            self.set_row(*row, bytes)?;
        }
        Ok(())
    }

    /// Sets or clears bit `colour` in each of `rows`. Duplicate rows are fine.
    fn set_bits(
        &mut self,
        rows: &[usize],
        colour: usize,
        bit: bool,
    ) -> Result<()> {
        for &row in rows {
            let mut bytes = self.get_row(row)?;
            set_bit(&mut bytes, colour, bit);
            self.set_row(row, &bytes)?;
        }
        Ok(())
    }

    /// Rows present in `[start, end)`, in ascending row order
    fn scan(&self, start: usize, end: usize) -> Result<Vec<(usize, Vec<u8>)>>;

    /// Index metadata slot, `None` for a fresh store
    fn load_meta(&self) -> Result<Option<Vec<u8>>>;

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()>;

    /// Makes all previous writes durable
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RowStore + ?Sized> RowStore for Box<S> {
    fn get_row(&self, row: usize) -> Result<Vec<u8>> {
        (**self).get_row(row)
    }

    fn get_rows(&self, rows: &[usize]) -> Result<Vec<Vec<u8>>> {
        (**self).get_rows(rows)
    }

    fn set_row(&mut self, row: usize, bytes: &[u8]) -> Result<()> {
        (**self).set_row(row, bytes)
    }

    fn set_rows(&mut self, rows: &[(usize, Vec<u8>)]) -> Result<()> {
        (**self).set_rows(rows)
    }

    fn set_bits(
        &mut self,
        rows: &[usize],
        colour: usize,
        bit: bool,
    ) -> Result<()> {
        (**self).set_bits(rows, colour, bit)
    }

    fn scan(&self, start: usize, end: usize) -> Result<Vec<(usize, Vec<u8>)>> {
        (**self).scan(start, end)
    }

    fn load_meta(&self) -> Result<Option<Vec<u8>>> {
        (**self).load_meta()
    }

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).save_meta(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Row store kept in an ordered map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRowStore {
    rows: BTreeMap<usize, Vec<u8>>,
    meta: Option<Vec<u8>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows that have been written at least once.
    pub fn num_stored_rows(&self) -> usize {
        self.rows.len()
    }
}

impl RowStore for InMemoryRowStore {
    fn get_row(&self, row: usize) -> Result<Vec<u8>> {
        Ok(self.rows.get(&row).cloned().unwrap_or_default())
    }

    fn set_row(&mut self, row: usize, bytes: &[u8]) -> Result<()> {
        self.rows.insert(row, bytes.to_vec());
        Ok(())
    }

    fn set_bits(
        &mut self,
        rows: &[usize],
        colour: usize,
        bit: bool,
    ) -> Result<()> {
        for &row in rows {
            if bit {
                set_bit(self.rows.entry(row).or_default(), colour, true);
            } else if let Some(bytes) = self.rows.get_mut(&row) {
                set_bit(bytes, colour, false);
            }
        }
        Ok(())
    }

    fn scan(&self, start: usize, end: usize) -> Result<Vec<(usize, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .range(start..end)
            .map(|(&row, bytes)| (row, bytes.clone()))
            .collect())
    }

    fn load_meta(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.meta.clone())
    }

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()> {
        self.meta = Some(bytes.to_vec());
        Ok(())
    }
}
