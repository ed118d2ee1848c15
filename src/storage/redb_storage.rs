use crate::error::Result;
use crate::row::set_bit;
use crate::storage::RowStore;
use derive_builder::Builder;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::debug;

// Define table schemas for ReDB
const ROWS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("rows");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const META_KEY: &str = "index_meta";

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct RedbRowStoreConfig {
    #[builder(default = "PathBuf::from(\"index.redb\")")]
    pub db_path: PathBuf,
}

/// Row store in a single redb file, one table entry per written row.
pub struct RedbRowStore {
    db: Database,
    db_path: PathBuf,
}

impl RedbRowStore {
    /// Opens the database file, creating it and its tables when missing.
    pub fn open(config: RedbRowStoreConfig) -> Result<Self> {
        let db =
            Database::create(&config.db_path).map_err(redb::Error::from)?;

        let write_txn = db.begin_write().map_err(redb::Error::from)?;
        {
            write_txn
                .open_table(ROWS_TABLE)
                .map_err(redb::Error::from)?;
            write_txn
                .open_table(META_TABLE)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;

        debug!(path = %config.db_path.display(), "opened redb row store");

        Ok(Self {
            db,
            db_path: config.db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl RowStore for RedbRowStore {
    fn get_row(&self, row: usize) -> Result<Vec<u8>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(ROWS_TABLE)
            .map_err(redb::Error::from)?;

        let bytes = table
            .get(row as u64)
            .map_err(redb::Error::from)?
            .map(|guard| guard.value().to_vec())
            .unwrap_or_default();
        Ok(bytes)
    }

    fn get_rows(&self, rows: &[usize]) -> Result<Vec<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(ROWS_TABLE)
            .map_err(redb::Error::from)?;

        let mut result = Vec::with_capacity(rows.len());
        for &row in rows {
            let bytes = table
                .get(row as u64)
                .map_err(redb::Error::from)?
                .map(|guard| guard.value().to_vec())
                .unwrap_or_default();
            result.push(bytes);
        }
        Ok(result)
    }

    fn set_row(&mut self, row: usize, bytes: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(ROWS_TABLE)
                .map_err(redb::Error::from)?;
            table
                .insert(row as u64, bytes)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn set_rows(&mut self, rows: &[(usize, Vec<u8>)]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(ROWS_TABLE)
                .map_err(redb::Error::from)?;
            for (row, bytes) in rows {
                table
                    .insert(*row as u64, bytes.as_slice())
                    .map_err(redb::Error::from)?;
            }
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn set_bits(
        &mut self,
        rows: &[usize],
        colour: usize,
        bit: bool,
    ) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(ROWS_TABLE)
                .map_err(redb::Error::from)?;
            for &row in rows {
                let existing = table
                    .get(row as u64)
                    .map_err(redb::Error::from)?
                    .map(|guard| guard.value().to_vec());

                let mut bytes = match existing {
                    Some(bytes) => bytes,
                    None if !bit => continue,
                    None => Vec::new(),
                };
                set_bit(&mut bytes, colour, bit);
                table
                    .insert(row as u64, bytes.as_slice())
                    .map_err(redb::Error::from)?;
            }
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn scan(&self, start: usize, end: usize) -> Result<Vec<(usize, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(ROWS_TABLE)
            .map_err(redb::Error::from)?;

        let mut rows = Vec::new();
        for item in table
            .range(start as u64..end as u64)
            .map_err(redb::Error::from)?
        {
            let (key, value) = item.map_err(redb::Error::from)?;
            rows.push((key.value() as usize, value.value().to_vec()));
        }
        Ok(rows)
    }

    fn load_meta(&self) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn
            .open_table(META_TABLE)
            .map_err(redb::Error::from)?;
        let meta = table
            .get(META_KEY)
            .map_err(redb::Error::from)?
            .map(|guard| guard.value().to_vec());
        Ok(meta)
    }

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(META_TABLE)
                .map_err(redb::Error::from)?;
            // Store in database if key exist it will be replaced
            table.insert(META_KEY, bytes).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}
