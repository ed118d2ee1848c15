use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Empty query: at least one element is required")]
    EmptyQuery,

    #[error("Invalid colour: {0}")]
    InvalidColour(String),

    #[error(
        "Row {row} has width {actual} bytes, expected at most {expected} bytes"
    )]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Storage operation failed: {0}")]
    StorageError(String),

    #[error("Index is not open")]
    NotOpen,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Search threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("Bloom filter has {actual} bits, matrix size is {expected}")]
    BloomLengthMismatch { expected: usize, actual: usize },

    #[error("Snapshot is incompatible with this index: {0}")]
    IncompatibleSnapshot(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "redb")]
    #[error("ReDB error: {0}")]
    RedbError(Box<redb::Error>),
}

impl IndexError {
    /// True for failures raised by the row store rather than by the caller.
    pub fn is_storage_error(&self) -> bool {
        match self {
            IndexError::StorageError(_) | IndexError::Io(_) => true,
            #[cfg(feature = "redb")]
            IndexError::RedbError(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "redb")]
impl From<redb::Error> for IndexError {
    fn from(err: redb::Error) -> Self {
        IndexError::RedbError(Box::new(err))
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::SerializationError(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for IndexError {
    fn from(err: bincode::error::EncodeError) -> Self {
        IndexError::SerializationError(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for IndexError {
    fn from(err: bincode::error::DecodeError) -> Self {
        IndexError::SerializationError(err.to_string())
    }
}
