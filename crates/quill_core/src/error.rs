//! Error types for Quill core.

use crate::types::RecordId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
///
/// Callers branch on the kind when they only care which family of failure
/// occurred, e.g. "was anything missing" rather than "which table".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A table, index or record does not exist in the visible snapshot.
    NotFound,
    /// A table or index name is already taken.
    AlreadyExists,
    /// A mutating call was issued on a read-only transaction.
    ReadOnlyViolation,
    /// The transaction or engine has already been closed.
    ClosedResource,
    /// Another writable transaction holds the writer slot.
    WriterConflict,
    /// The engine still has open transactions.
    LeakedTransaction,
    /// A backend fault (storage, corruption, encoding, bad input).
    Backend,
}

/// Errors that can occur in Quill core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the table.
        name: String,
    },

    /// Index not found.
    #[error("index not found: {name} on table {table}")]
    IndexNotFound {
        /// Table the index was looked up on.
        table: String,
        /// Name of the index.
        name: String,
    },

    /// Table already exists.
    #[error("table already exists: {name}")]
    TableAlreadyExists {
        /// Name of the table.
        name: String,
    },

    /// Index already exists.
    #[error("index already exists: {field} on table {table}")]
    IndexAlreadyExists {
        /// Table of the index.
        table: String,
        /// Indexed field.
        field: String,
    },

    /// Mutation attempted on a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// Transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// Engine was already closed.
    #[error("engine is closed")]
    EngineClosed,

    /// A writable transaction is already active.
    #[error("another writable transaction is active")]
    WriterConflict,

    /// Engine close attempted while transactions are open.
    #[error("cannot close engine: {open} transaction(s) still open")]
    LeakedTransaction {
        /// Number of transactions still open.
        open: usize,
    },

    /// Record not found.
    #[error("record {id} not found in table {table}")]
    RecordNotFound {
        /// Table searched.
        table: String,
        /// Missing record.
        id: RecordId,
    },

    /// Table or index name rejected.
    #[error("invalid name: {message}")]
    InvalidName {
        /// Why the name was rejected.
        message: String,
    },

    /// Page store error.
    #[error("storage error: {0}")]
    Storage(#[from] quill_storage::StorageError),

    /// Persisted state is corrupted or invalid.
    #[error("corruption: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Page payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::IndexNotFound {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a table already exists error.
    pub fn table_already_exists(name: impl Into<String>) -> Self {
        Self::TableAlreadyExists { name: name.into() }
    }

    /// Creates an index already exists error.
    pub fn index_already_exists(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::IndexAlreadyExists {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(table: impl Into<String>, id: RecordId) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            id,
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self::InvalidName {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns the taxonomy group of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TableNotFound { .. }
            | Self::IndexNotFound { .. }
            | Self::RecordNotFound { .. } => ErrorKind::NotFound,
            Self::TableAlreadyExists { .. } | Self::IndexAlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::ReadOnly => ErrorKind::ReadOnlyViolation,
            Self::TransactionClosed | Self::EngineClosed => ErrorKind::ClosedResource,
            Self::WriterConflict => ErrorKind::WriterConflict,
            Self::LeakedTransaction { .. } => ErrorKind::LeakedTransaction,
            Self::InvalidName { .. }
            | Self::Storage(_)
            | Self::Corrupted { .. }
            | Self::Codec { .. } => ErrorKind::Backend,
        }
    }

    /// Returns true for missing tables, indexes and records.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true for name collisions.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Returns true for writes on a read-only transaction.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.kind() == ErrorKind::ReadOnlyViolation
    }

    /// Returns true for calls on a closed transaction or engine.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::ClosedResource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        assert!(CoreError::table_not_found("t").is_not_found());
        assert!(CoreError::index_not_found("t", "f").is_not_found());
        assert!(CoreError::record_not_found("t", RecordId::new(3)).is_not_found());
        assert!(CoreError::table_already_exists("t").is_already_exists());
        assert!(CoreError::index_already_exists("t", "f").is_already_exists());
        assert!(CoreError::ReadOnly.is_read_only());
        assert!(CoreError::TransactionClosed.is_closed());
        assert!(CoreError::EngineClosed.is_closed());
        assert_eq!(CoreError::WriterConflict.kind(), ErrorKind::WriterConflict);
        assert_eq!(
            CoreError::LeakedTransaction { open: 2 }.kind(),
            ErrorKind::LeakedTransaction
        );
        assert_eq!(CoreError::corrupted("bad").kind(), ErrorKind::Backend);
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = quill_storage::StorageError::InvalidPageSize { size: 3 }.into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn messages_name_the_resource() {
        assert_eq!(
            CoreError::table_not_found("users").to_string(),
            "table not found: users"
        );
        assert_eq!(
            CoreError::index_already_exists("users", "email").to_string(),
            "index already exists: email on table users"
        );
    }
}
