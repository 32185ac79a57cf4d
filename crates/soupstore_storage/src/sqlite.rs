//! SQLite storage engine.

use crate::engine::{StatementId, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::value::{RowSet, SqlValue};
use parking_lot::{Mutex, ReentrantMutex};
use rusqlite::{params_from_iter, CachedStatement, Connection, Statement};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of compiled statements rusqlite keeps per connection.
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 256;

struct Connected {
    conn: Connection,
    /// Nesting depth of `transaction` calls on the owning thread.
    depth: Cell<usize>,
    /// SQL texts compiled into the connection's statement cache for handles.
    compiled: RefCell<HashSet<String>>,
}

impl Connected {
    fn prepare_handle(&self, sql: &str) -> StorageResult<CachedStatement<'_>> {
        let stmt = self.conn.prepare_cached(sql)?;
        self.compiled.borrow_mut().insert(sql.to_string());
        Ok(stmt)
    }

    /// Finalizes every cached statement. rusqlite cannot evict a single
    /// entry, so handles still live recompile on their next run.
    fn flush_compiled(&self) {
        self.conn.flush_prepared_statement_cache();
        self.compiled.borrow_mut().clear();
    }
}

/// A storage engine backed by a single SQLite connection.
///
/// The bundled SQLite build ships FTS5 and the JSON functions, which the
/// soup layout relies on (`json_extract`, `MATCH`).
///
/// # Thread Safety
///
/// The connection sits behind a `ReentrantMutex`, so a transaction can hold
/// it while its body re-enters the engine from the same thread. Other
/// threads wait for the transaction to finish.
///
/// # Example
///
/// ```rust
/// use soupstore_storage::{SqliteEngine, StorageEngine, SqlValue};
///
/// let engine = SqliteEngine::open_in_memory().unwrap();
/// engine.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
/// engine.execute("INSERT INTO t (x) VALUES (?)", &[SqlValue::Integer(4)]).unwrap();
/// let rows = engine.query("SELECT x FROM t", &[]).unwrap();
/// assert_eq!(rows.first_value(), Some(&SqlValue::Integer(4)));
/// ```
pub struct SqliteEngine {
    path: Option<PathBuf>,
    inner: ReentrantMutex<Connected>,
    statements: Mutex<HashMap<StatementId, String>>,
    next_statement: AtomicU64,
}

impl SqliteEngine {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        tracing::debug!(path = %path.display(), "opened sqlite engine");
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        conn.set_prepared_statement_cache_capacity(DEFAULT_STATEMENT_CACHE_CAPACITY);
        Self {
            path,
            inner: ReentrantMutex::new(Connected {
                conn,
                depth: Cell::new(0),
                compiled: RefCell::new(HashSet::new()),
            }),
            statements: Mutex::new(HashMap::new()),
            next_statement: AtomicU64::new(1),
        }
    }

    /// Sets how many compiled statements the connection keeps.
    pub fn set_statement_cache_capacity(&self, capacity: usize) {
        self.inner
            .lock()
            .conn
            .set_prepared_statement_cache_capacity(capacity);
    }

    /// Returns the database file path, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the number of statement handles not yet released.
    #[must_use]
    pub fn live_statements(&self) -> usize {
        self.statements.lock().len()
    }

    /// Returns the number of distinct handle statements currently compiled
    /// in the connection's cache.
    #[must_use]
    pub fn compiled_statements(&self) -> usize {
        self.inner.lock().compiled.borrow().len()
    }

    fn statement_sql(&self, id: StatementId) -> StorageResult<String> {
        self.statements
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StorageError::UnknownStatement(id.as_u64()))
    }
}

fn collect_rows(stmt: &mut Statement<'_>, args: &[SqlValue]) -> StorageResult<RowSet> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut result = RowSet::with_columns(columns);
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(SqlValue::from_value_ref(row.get_ref(i)?));
        }
        result.rows.push(values);
    }
    Ok(result)
}

impl StorageEngine for SqliteEngine {
    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        let guard = self.inner.lock();
        let count: i64 = guard.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query(&self, sql: &str, args: &[SqlValue]) -> StorageResult<RowSet> {
        let guard = self.inner.lock();
        let mut stmt = guard.conn.prepare(sql)?;
        collect_rows(&mut stmt, args)
    }

    fn execute(&self, sql: &str, args: &[SqlValue]) -> StorageResult<usize> {
        let guard = self.inner.lock();
        let mut stmt = guard.conn.prepare(sql)?;
        Ok(stmt.execute(params_from_iter(args.iter()))?)
    }

    fn insert(&self, sql: &str, args: &[SqlValue]) -> StorageResult<i64> {
        let guard = self.inner.lock();
        let mut stmt = guard.conn.prepare(sql)?;
        stmt.execute(params_from_iter(args.iter()))?;
        Ok(guard.conn.last_insert_rowid())
    }

    fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let guard = self.inner.lock();
        guard.conn.execute_batch(sql)?;
        Ok(())
    }

    fn prepare(&self, sql: &str) -> StorageResult<StatementId> {
        {
            let guard = self.inner.lock();
            // Compiles now so errors surface at prepare time.
            guard.prepare_handle(sql)?;
        }
        let id = StatementId(self.next_statement.fetch_add(1, Ordering::Relaxed));
        self.statements.lock().insert(id, sql.to_string());
        Ok(id)
    }

    fn query_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<RowSet> {
        let sql = self.statement_sql(id)?;
        let guard = self.inner.lock();
        let mut stmt = guard.prepare_handle(&sql)?;
        collect_rows(&mut stmt, args)
    }

    fn execute_prepared(&self, id: StatementId, args: &[SqlValue]) -> StorageResult<usize> {
        let sql = self.statement_sql(id)?;
        let guard = self.inner.lock();
        let mut stmt = guard.prepare_handle(&sql)?;
        Ok(stmt.execute(params_from_iter(args.iter()))?)
    }

    fn release(&self, id: StatementId) -> StorageResult<()> {
        let last_for_sql = {
            let mut statements = self.statements.lock();
            let sql = statements
                .remove(&id)
                .ok_or(StorageError::UnknownStatement(id.as_u64()))?;
            !statements.values().any(|other| *other == sql)
        };
        if last_for_sql {
            self.inner.lock().flush_compiled();
        }
        Ok(())
    }

    fn transaction(&self, body: &mut dyn FnMut() -> StorageResult<()>) -> StorageResult<()> {
        let guard = self.inner.lock();
        let depth = guard.depth.get();
        if depth > 0 {
            // Already inside a transaction on this thread: join it.
            return body();
        }

        guard.conn.execute_batch("BEGIN IMMEDIATE")?;
        guard.depth.set(depth + 1);
        let outcome = body();
        guard.depth.set(depth);

        match outcome {
            Ok(()) => {
                guard.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = guard.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("path", &self.path)
            .field("live_statements", &self.live_statements())
            .finish()
    }
}
