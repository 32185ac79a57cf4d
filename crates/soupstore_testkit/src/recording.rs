//! A storage engine that counts what passes through it.

use soupstore_storage::{RowSet, SqlValue, SqliteEngine, StatementId, StorageEngine, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Wraps an in-memory [`SqliteEngine`] and records statement traffic.
///
/// Release failures can be injected with
/// [`RecordingEngine::fail_releases`]; a failed release leaves the handle
/// live in the inner engine.
pub struct RecordingEngine {
    inner: SqliteEngine,
    prepared: AtomicUsize,
    released: AtomicUsize,
    failed_releases: AtomicUsize,
    queries: AtomicUsize,
    fail_releases: AtomicBool,
}

impl RecordingEngine {
    /// Creates a recorder over a fresh in-memory database.
    ///
    /// # Panics
    ///
    /// Panics if SQLite cannot open an in-memory database.
    pub fn new() -> Self {
        Self::wrap(SqliteEngine::open_in_memory().expect("Failed to open in-memory engine"))
    }

    /// Creates a recorder over an existing engine.
    pub fn wrap(inner: SqliteEngine) -> Self {
        Self {
            inner,
            prepared: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            failed_releases: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            fail_releases: AtomicBool::new(false),
        }
    }

    /// Makes every following release fail (or succeed again).
    pub fn fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    /// Number of statements prepared.
    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    /// Number of statements released successfully.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of releases that failed.
    pub fn failed_releases(&self) -> usize {
        self.failed_releases.load(Ordering::SeqCst)
    }

    /// Number of ad hoc and prepared queries run.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of handles the inner engine still holds.
    pub fn live_statements(&self) -> usize {
        self.inner.live_statements()
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for RecordingEngine {
    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.table_exists(name)
    }

    fn query(&self, sql: &str, args: &[SqlValue]) -> StorageResult<RowSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, args)
    }

    fn execute(&self, sql: &str, args: &[SqlValue]) -> StorageResult<usize> {
        self.inner.execute(sql, args)
    }

    fn insert(&self, sql: &str, args: &[SqlValue]) -> StorageResult<i64> {
        self.inner.insert(sql, args)
    }

    fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.inner.execute_batch(sql)
    }

    fn prepare(&self, sql: &str) -> StorageResult<StatementId> {
        let id = self.inner.prepare(sql)?;
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn query_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<RowSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_prepared(id, args)
    }

    fn execute_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<usize> {
        self.inner.execute_prepared(id, args)
    }

    fn release(&self, id: StatementId) -> StorageResult<()> {
        if self.fail_releases.load(Ordering::SeqCst) {
            self.failed_releases.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::UnknownStatement(id.as_u64()));
        }
        self.inner.release(id)?;
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transaction(&self, body: &mut dyn FnMut() -> StorageResult<()>) -> StorageResult<()> {
        self.inner.transaction(body)
    }
}
