use bitsliced_bloom::{
    ElementHasher, IndexError, MatrixConfig, MatrixConfigBuilder, Result,
    RowStore,
};
use std::{collections::HashMap, fs, path::PathBuf};

/// Structure to manage temporary test databases that are automatically cleaned up
pub struct TestDb {
    path: PathBuf,
}

impl TestDb {
    /// Create a new test database path with a name based on the test name
    pub fn new(test_name: &str, extension: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "test_db_{}_{}.{}",
            test_name,
            rand::random::<u32>(),
            extension
        ));
        Self { path }
    }

    /// Get a clone of the database path
    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if self.path.is_dir() {
            let _ = fs::remove_dir_all(&self.path);
        } else if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Hasher with hand-picked rows per element, so tests control collisions.
/// Unknown elements hash to row 0 for every seed.
#[allow(dead_code)]
#[derive(Default)]
pub struct FixedHasher {
    rows: HashMap<Vec<u8>, Vec<u32>>,
}

#[allow(dead_code)]
impl FixedHasher {
    /// Route `element` to `rows[seed]` for each seed.
    pub fn with(mut self, element: &[u8], rows: &[u32]) -> Self {
        self.rows.insert(element.to_vec(), rows.to_vec());
        self
    }
}

impl ElementHasher for FixedHasher {
    fn hash32(&self, element: &[u8], seed: u32) -> u32 {
        self.rows
            .get(element)
            .and_then(|rows| rows.get(seed as usize).copied())
            .unwrap_or(0)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Row store whose row reads and writes always fail. The metadata slot
/// works, so an index can still be opened over it.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingRowStore {
    meta: Option<Vec<u8>>,
}

fn row_failure<T>() -> Result<T> {
    Err(IndexError::StorageError("row store unavailable".to_string()))
}

impl RowStore for FailingRowStore {
    fn get_row(&self, _row: usize) -> Result<Vec<u8>> {
        row_failure()
    }

    fn set_row(&mut self, _row: usize, _bytes: &[u8]) -> Result<()> {
        row_failure()
    }

    fn scan(&self, _start: usize, _end: usize) -> Result<Vec<(usize, Vec<u8>)>> {
        row_failure()
    }

    fn load_meta(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.meta.clone())
    }

    fn save_meta(&mut self, bytes: &[u8]) -> Result<()> {
        self.meta = Some(bytes.to_vec());
        Ok(())
    }
}

#[allow(dead_code)]
pub fn small_config(size: usize, num_hashes: usize) -> MatrixConfig {
    MatrixConfigBuilder::default()
        .size(size)
        .num_hashes(num_hashes)
        .build()
        .expect("Failed to build test config")
}

// Helper function to generate consistent test data
#[allow(dead_code)]
pub fn generate_test_items(prefix: &str, count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("{prefix}_{i:06}").into_bytes())
        .collect()
}
