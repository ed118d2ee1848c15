use crate::error::{IndexError, Result};
use crate::row::set_bit;
use crate::storage::RowStore;
use derive_builder::Builder;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const META_KEY: &str = "index_meta";

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct FjallRowStoreConfig {
    #[builder(default = "PathBuf::from(\"index.fjall\")")]
    pub db_path: PathBuf,
}

/// Row store in a fjall keyspace. Row keys are big-endian `u64` so the
/// partition's natural order is row order.
pub struct FjallRowStore {
    keyspace: Arc<fjall::Keyspace>,
    rows_partition: Arc<fjall::Partition>,
    meta_partition: Arc<fjall::Partition>,
}

fn row_key(row: usize) -> [u8; 8] {
    (row as u64).to_be_bytes()
}

fn decode_row_key(key: &[u8]) -> Result<usize> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| {
        IndexError::StorageError(format!(
            "Malformed row key of {} bytes",
            key.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes) as usize)
}

impl FjallRowStore {
    pub fn open(config: FjallRowStoreConfig) -> Result<Self> {
        let keyspace = Arc::new(
            fjall::Config::new(&config.db_path).open().map_err(|e| {
                IndexError::StorageError(format!(
                    "Failed to open Fjall DB: {e}"
                ))
            })?,
        );

        let options = fjall::PartitionCreateOptions::default();

        let rows_partition = Arc::new(
            keyspace
                .open_partition("rows", options.clone())
                .map_err(|e| {
                    IndexError::StorageError(format!(
                        "Failed to open rows partition: {e}"
                    ))
                })?,
        );

        let meta_partition = Arc::new(
            keyspace.open_partition("meta", options).map_err(|e| {
                IndexError::StorageError(format!(
                    "Failed to open meta partition: {e}"
                ))
            })?,
        );

        debug!(path = %config.db_path.display(), "opened fjall row store");

        Ok(Self {
            keyspace,
            rows_partition,
            meta_partition,
        })
    }
}

impl RowStore for FjallRowStore {
    fn get_row(&self, row: usize) -> Result<Vec<u8>> {
        match self.rows_partition.get(row_key(row)) {
            Ok(Some(bytes)) => Ok(bytes.to_vec()),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(IndexError::StorageError(format!(
                "Failed to read row {row}: {e}"
            ))),
        }
    }

    fn set_row(&mut self, row: usize, bytes: &[u8]) -> Result<()> {
        self.rows_partition
            .insert(&row_key(row)[..], bytes)
            .map_err(|e| {
                IndexError::StorageError(format!(
                    "Failed to write row {row}: {e}"
                ))
            })
    }

    fn set_rows(&mut self, rows: &[(usize, Vec<u8>)]) -> Result<()> {
        let mut batch = self.keyspace.batch();
        for (row, bytes) in rows {
            batch.insert(
                &self.rows_partition,
                &row_key(*row)[..],
                bytes.as_slice(),
            );
        }
        batch.commit().map_err(|e| {
            IndexError::StorageError(format!(
                "Failed to write batch of {} rows: {e}",
                rows.len()
            ))
        })
    }

    fn set_bits(
        &mut self,
        rows: &[usize],
        colour: usize,
        bit: bool,
    ) -> Result<()> {
        // Reads do not see the pending batch, so each row is touched once.
        let unique: BTreeSet<usize> = rows.iter().copied().collect();
        let mut batch = self.keyspace.batch();
        for row in unique {
            let existing = self.rows_partition.get(row_key(row)).map_err(|e| {
                IndexError::StorageError(format!(
                    "Failed to read row {row}: {e}"
                ))
            })?;
            let mut bytes = match existing {
                Some(bytes) => bytes.to_vec(),
                None if !bit => continue,
                None => Vec::new(),
            };
            set_bit(&mut bytes, colour, bit);
            batch.insert(
                &self.rows_partition,
                &row_key(row)[..],
                bytes.as_slice(),
            );
        }
        batch.commit().map_err(|e| {
            IndexError::StorageError(format!(
                "Failed to update colour {colour}: {e}"
            ))
        })
    }

    fn scan(&self, start: usize, end: usize) -> Result<Vec<(usize, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        for item in self.rows_partition.range(row_key(start)..row_key(end)) {
            let (key, value) = item.map_err(|e| {
                IndexError::StorageError(format!("Failed to scan rows: {e}"))
            })?;
            rows.push((decode_row_key(&key)?, value.to_vec()));
        }
        Ok(rows)
    }

    fn load_meta(&self) -> Result<Option<Vec<u8>>> {
        match self.meta_partition.get(META_KEY) {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(IndexError::StorageError(format!(
                "Failed to load index metadata: {e}"
            ))),
        }
    }

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()> {
        self.meta_partition.insert(META_KEY, bytes).map_err(|e| {
            IndexError::StorageError(format!(
                "Failed to save index metadata: {e}"
            ))
        })?;

        // Ensure metadata is persisted to disk
        self.keyspace
            .persist(fjall::PersistMode::SyncAll)
            .map_err(|e| {
                IndexError::StorageError(format!(
                    "Failed to persist index metadata: {e}"
                ))
            })
    }

    fn flush(&mut self) -> Result<()> {
        self.keyspace
            .persist(fjall::PersistMode::SyncAll)
            .map_err(|e| {
                IndexError::StorageError(format!("Failed to persist rows: {e}"))
            })
    }
}
