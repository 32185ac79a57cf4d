//! Compiled statements owned by the caches.

use crate::error::{CoreError, CoreResult};
use crate::stats::CacheStats;
use soupstore_storage::{RowSet, SqlValue, StatementId, StorageEngine};
use std::fmt;
use std::sync::Arc;

/// A statement compiled by the engine and released when dropped.
///
/// The handle is released exactly once: either by [`CompiledStatement::close`]
/// or by `Drop`. A failed release in `Drop` is logged and counted, never
/// propagated.
pub struct CompiledStatement {
    id: StatementId,
    sql: String,
    engine: Arc<dyn StorageEngine>,
    stats: Arc<CacheStats>,
    released: bool,
}

impl CompiledStatement {
    /// Compiles `sql` on `engine`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement does not compile.
    pub fn prepare(
        engine: Arc<dyn StorageEngine>,
        sql: impl Into<String>,
        stats: Arc<CacheStats>,
    ) -> CoreResult<Self> {
        let sql = sql.into();
        let id = engine.prepare(&sql)?;
        stats.record_prepare();
        tracing::debug!(statement = %id, sql = %sql, "compiled statement");
        Ok(Self {
            id,
            sql,
            engine,
            stats,
            released: false,
        })
    }

    /// Returns the engine handle.
    #[must_use]
    pub fn id(&self) -> StatementId {
        self.id
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Runs the statement as a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn query(&self, args: &[SqlValue]) -> CoreResult<RowSet> {
        Ok(self.engine.query_prepared(self.id, args)?)
    }

    /// Runs the statement as a write.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn execute(&self, args: &[SqlValue]) -> CoreResult<usize> {
        Ok(self.engine.execute_prepared(self.id, args)?)
    }

    /// Runs the statement and reads the first column of the first row as an
    /// integer. Returns `None` when there is no row.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn query_long(&self, args: &[SqlValue]) -> CoreResult<Option<i64>> {
        Ok(self.query(args)?.first_value().and_then(SqlValue::as_i64))
    }

    fn release(&mut self) -> CoreResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let outcome = self.engine.release(self.id);
        self.stats.record_release(outcome.is_ok());
        outcome.map_err(|e| CoreError::resource_release(format!("{}: {e}", self.id)))
    }

    /// Releases the handle now, reporting failure to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ResourceRelease`] if the engine rejects the
    /// release.
    pub fn close(mut self) -> CoreResult<()> {
        self.release()
    }
}

impl Drop for CompiledStatement {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, sql = %self.sql, "statement release failed");
        }
    }
}

impl fmt::Debug for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledStatement")
            .field("id", &self.id)
            .field("sql", &self.sql)
            .field("released", &self.released)
            .finish()
    }
}

/// A cached `INSERT` for one table and one column list.
#[derive(Debug)]
pub struct RowInserter {
    table: String,
    columns: Vec<String>,
    statement: CompiledStatement,
}

impl RowInserter {
    /// Compiles an insert of `columns` into `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement does not compile.
    pub fn prepare(
        engine: Arc<dyn StorageEngine>,
        table: &str,
        columns: Vec<String>,
        stats: Arc<CacheStats>,
    ) -> CoreResult<Self> {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let statement = CompiledStatement::prepare(engine, sql, stats)?;
        Ok(Self {
            table: table.to_string(),
            columns,
            statement,
        })
    }

    /// Returns the target table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns true if this inserter writes exactly `columns`, in order.
    #[must_use]
    pub fn matches(&self, columns: &[String]) -> bool {
        self.columns == columns
    }

    /// Inserts one row; `values` line up with the column list.
    ///
    /// # Errors
    ///
    /// Returns an error if the value count is wrong or the engine fails.
    pub fn insert(&self, values: &[SqlValue]) -> CoreResult<()> {
        if values.len() != self.columns.len() {
            return Err(CoreError::invalid_operation(format!(
                "insert into {} expects {} values, got {}",
                self.table,
                self.columns.len(),
                values.len()
            )));
        }
        self.statement.execute(values)?;
        Ok(())
    }
}
