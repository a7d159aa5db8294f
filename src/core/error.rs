use thiserror::Error;

/// Failures raised by the underlying document store driver.
///
/// These are passed through to callers unmodified; retry and backoff are the
/// caller's decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Duplicate key in '{collection}' on index '{index}': {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Index '{0}' already exists with different options")]
    IndexConflict(String),

    #[error("Unsupported store operation: {0}")]
    Unsupported(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Unknown data source '{0}'")]
    UnknownDataSource(String),

    #[error("Type '{0}' is not registered")]
    NotRegistered(String),

    #[error("Precondition failed: {0}")]
    PreconditionError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl MapperError {
    /// Errors detected before any I/O is issued. These are never retried.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Self::SchemaError(_)
                | Self::UnknownDataSource(_)
                | Self::NotRegistered(_)
                | Self::PreconditionError(_)
        )
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::StoreError(StoreError::DuplicateKey { .. }))
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionError(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for MapperError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::EncodingError(err.to_string())
    }
}
