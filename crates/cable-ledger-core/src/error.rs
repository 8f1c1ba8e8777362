//! Error types for the cable ledger.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The migration target pack does not exist.
    #[error("invalid pack: {pack_id}")]
    InvalidPack {
        /// The pack ID that did not resolve.
        pack_id: String,
    },

    /// A migration was requested from a pack to itself.
    #[error("cannot migrate to the same pack: {pack_id}")]
    SamePackMigration {
        /// The pack ID given as both source and target.
        pack_id: String,
    },

    /// Connection not found.
    #[error("connection not found: {connection_id}")]
    ConnectionNotFound {
        /// The connection ID that was not found.
        connection_id: String,
    },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// A record cannot be deleted while others still reference it.
    #[error("{entity} {id} is still in use")]
    InUse {
        /// Kind of record.
        entity: &'static str,
        /// The identifier of the referenced record.
        id: String,
    },

    /// Another connection already uses this box number.
    #[error("box number already registered: {box_number}")]
    DuplicateBoxNumber {
        /// The duplicated box number.
        box_number: String,
    },

    /// Caller-supplied data failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Whether the message is meant for the person operating the app.
    ///
    /// Validation failures are; storage and serialization failures should be
    /// reported as a generic failure and logged instead.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_user_facing() {
        let err = LedgerError::SamePackMigration {
            pack_id: "p1".into(),
        };
        assert!(err.is_user_facing());
        assert_eq!(err.to_string(), "cannot migrate to the same pack: p1");

        assert!(LedgerError::InvalidPack { pack_id: "p2".into() }.is_user_facing());
    }

    #[test]
    fn storage_errors_are_not_user_facing() {
        assert!(!LedgerError::Storage("io".into()).is_user_facing());
        assert!(!LedgerError::Serialization("cbor".into()).is_user_facing());
    }
}
