//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A statement handle was used after it was released, or never existed.
    #[error("unknown statement handle: {0}")]
    UnknownStatement(u64),

    /// A single-value query produced no row.
    #[error("query returned no rows")]
    NoRows,

    /// A transaction body asked for a rollback.
    #[error("transaction rolled back")]
    RolledBack,

    /// The engine has been closed.
    #[error("storage engine is closed")]
    Closed,
}
