//! Error types for ledger storage.

use cable_ledger_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Record is still referenced and cannot be deleted.
    #[error("{entity} {id} is still in use")]
    InUse {
        /// Kind of record.
        entity: &'static str,
        /// The identifier of the referenced record.
        id: String,
    },

    /// Box numbers are unique across connections.
    #[error("box number already registered: {box_number}")]
    DuplicateBoxNumber {
        /// The duplicated box number.
        box_number: String,
    },
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn in_use(entity: &'static str, id: impl ToString) -> Self {
        Self::InUse {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Serialization(msg),
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::InUse { entity, id } => Self::InUse { entity, id },
            StoreError::DuplicateBoxNumber { box_number } => {
                Self::DuplicateBoxNumber { box_number }
            }
        }
    }
}

#[cfg(feature = "rocksdb-backend")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}
