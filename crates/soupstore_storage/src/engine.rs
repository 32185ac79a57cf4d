//! Storage engine trait definition.

use crate::error::StorageResult;
use crate::value::{RowSet, SqlValue};
use std::fmt;

/// Handle to a statement compiled by the engine.
///
/// Handles are issued by [`StorageEngine::prepare`] and stay valid until
/// passed to [`StorageEngine::release`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatementId(pub u64);

impl StatementId {
    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt:{}", self.0)
    }
}

/// A transactional SQL engine.
///
/// The engine is **SQL-level only**: it knows nothing about soups, index
/// specs, or smart SQL. SoupStore owns every table layout and every query
/// text; the engine runs them.
///
/// # Invariants
///
/// - `prepare` compiles the statement once and returns a fresh handle
/// - a handle is released at most once; releasing twice is an error
/// - `transaction` holds the connection for the whole body so concurrent
///   callers never interleave inside it
/// - implementations must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::SqliteEngine`] - SQLite via rusqlite (bundled, with FTS5 and JSON)
pub trait StorageEngine: Send + Sync {
    /// Returns true if a table (or virtual table) with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    /// Runs a read query and materializes every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL is invalid or the engine fails.
    fn query(&self, sql: &str, args: &[SqlValue]) -> StorageResult<RowSet>;

    /// Runs a write statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL is invalid or the engine fails.
    fn execute(&self, sql: &str, args: &[SqlValue]) -> StorageResult<usize>;

    /// Runs an `INSERT` and returns the row id of the inserted row.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL is invalid or the engine fails.
    fn insert(&self, sql: &str, args: &[SqlValue]) -> StorageResult<i64>;

    /// Runs one or more `;`-separated statements without arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    fn execute_batch(&self, sql: &str) -> StorageResult<()>;

    /// Compiles a statement and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL does not compile.
    fn prepare(&self, sql: &str) -> StorageResult<StatementId>;

    /// Runs a previously prepared statement as a query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::UnknownStatement`] for released handles.
    fn query_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<RowSet>;

    /// Runs a previously prepared statement as a write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::UnknownStatement`] for released handles.
    fn execute_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<usize>;

    /// Releases a prepared statement.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::UnknownStatement`] if the handle was
    /// already released or never issued.
    fn release(&self, id: StatementId) -> StorageResult<()>;

    /// Runs `body` inside a transaction.
    ///
    /// The transaction commits if `body` returns `Ok`, and rolls back
    /// otherwise. The body may call back into the engine.
    ///
    /// # Errors
    ///
    /// Returns the body's error after rolling back, or an engine error if
    /// begin/commit fails.
    fn transaction(&self, body: &mut dyn FnMut() -> StorageResult<()>) -> StorageResult<()>;
}
