//! Storage access façade.
//!
//! [`DbHelper`] owns the metadata cache of one engine connection and runs
//! every statement the store issues. Soup facts are answered from the cache
//! and read from the metadata tables on a miss.

use crate::cache::{CompiledStatement, MetadataCache, RowInserter};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSpec;
use crate::stats::CacheStats;
use crate::types::{
    SoupId, COLUMN_NAME_COL, COLUMN_TYPE_COL, ID_COL, PATH_COL, SOUP_ATTRS_TABLE,
    SOUP_INDEX_MAP_TABLE, SOUP_NAME_COL,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use soupstore_storage::{RowSet, SqlValue, StorageEngine, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SEQ_SELECT: &str = "SELECT seq FROM SQLITE_SEQUENCE WHERE name = ?";

/// Keys of a captured query plan.
pub const EXPLAIN_SQL: &str = "sql";
/// See [`EXPLAIN_SQL`].
pub const EXPLAIN_ARGS: &str = "args";
/// See [`EXPLAIN_SQL`].
pub const EXPLAIN_ROWS: &str = "rows";

/// Cache-owning handle over one storage engine.
pub struct DbHelper {
    engine: Arc<dyn StorageEngine>,
    cache: MetadataCache,
    capture_explain: AtomicBool,
    last_explain: Mutex<Option<Value>>,
}

impl DbHelper {
    /// Creates a helper over `engine`.
    pub fn new(engine: Arc<dyn StorageEngine>, config: &Config) -> Self {
        let stats = Arc::new(CacheStats::new());
        Self {
            engine,
            cache: MetadataCache::new(config.cache_capacity, stats),
            capture_explain: AtomicBool::new(config.capture_explain_query_plan),
            last_explain: Mutex::new(None),
        }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Returns the metadata cache.
    #[must_use]
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Returns the cache statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<CacheStats> {
        self.cache.stats()
    }

    // === Soup metadata ===

    /// Returns the table name of a soup, or `None` if it does not exist.
    ///
    /// Unknown soups are not cached: asking twice reads storage twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn get_soup_table_name(&self, soup: &str) -> CoreResult<Option<String>> {
        if let Some(table) = self.cache.table_name(soup) {
            return Ok(Some(table));
        }
        let token = self.cache.fill_token();
        let rows = self.engine.query(
            &format!("SELECT {ID_COL} FROM {SOUP_ATTRS_TABLE} WHERE {SOUP_NAME_COL} = ?"),
            &[soup.into()],
        )?;
        let Some(id) = rows.first_value().and_then(SqlValue::as_i64) else {
            return Ok(None);
        };
        let table = SoupId::new(id).table_name();
        self.cache.cache_table_name(soup, &table, token);
        Ok(Some(table))
    }

    /// Returns the table name of a soup that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup does not exist.
    pub fn require_soup_table_name(&self, soup: &str) -> CoreResult<String> {
        self.get_soup_table_name(soup)?
            .ok_or_else(|| CoreError::unknown_collection(soup))
    }

    /// Returns true if the soup exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn has_soup(&self, soup: &str) -> CoreResult<bool> {
        if let Some(exists) = self.cache.has_soup(soup) {
            return Ok(exists);
        }
        let token = self.cache.fill_token();
        let exists = self.get_soup_table_name(soup)?.is_some();
        self.cache.cache_has_soup(soup, exists, token);
        Ok(exists)
    }

    /// Returns the index specs of a soup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup has no specs.
    pub fn get_index_specs(&self, soup: &str) -> CoreResult<Arc<[IndexSpec]>> {
        if let Some(specs) = self.cache.index_specs(soup) {
            return Ok(specs);
        }
        let token = self.cache.fill_token();
        let specs: Arc<[IndexSpec]> = self.get_index_specs_from_db(soup)?.into();
        self.cache.cache_index_specs(soup, Arc::clone(&specs), token);
        Ok(specs)
    }

    fn get_index_specs_from_db(&self, soup: &str) -> CoreResult<Vec<IndexSpec>> {
        let rows = self.engine.query(
            &format!(
                "SELECT {PATH_COL}, {COLUMN_NAME_COL}, {COLUMN_TYPE_COL} FROM {SOUP_INDEX_MAP_TABLE} \
                 WHERE {SOUP_NAME_COL} = ? ORDER BY rowid"
            ),
            &[soup.into()],
        )?;
        if rows.is_empty() {
            return Err(CoreError::unknown_collection(soup));
        }
        rows.rows
            .iter()
            .map(|row| -> CoreResult<IndexSpec> {
                let text = move |i: usize| row.get(i).and_then(SqlValue::as_str).unwrap_or_default();
                Ok(IndexSpec::with_column(text(0), text(2).parse()?, text(1)))
            })
            .collect()
    }

    /// Returns the table name and index specs of a soup, or `None` if it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata tables cannot be read.
    pub fn read_collection_metadata(&self, soup: &str) -> CoreResult<Option<(String, Arc<[IndexSpec]>)>> {
        match self.get_soup_table_name(soup)? {
            Some(table) => Ok(Some((table, self.get_index_specs(soup)?))),
            None => Ok(None),
        }
    }

    /// Returns true if the soup has a full-text projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the soup does not exist.
    pub fn has_fts(&self, soup: &str) -> CoreResult<bool> {
        if let Some(fts) = self.cache.has_full_text(soup) {
            return Ok(fts);
        }
        Ok(crate::index::has_full_text(&self.get_index_specs(soup)?))
    }

    /// Returns true if `path` is indexed on the soup.
    ///
    /// # Errors
    ///
    /// Returns an error if the soup does not exist.
    pub fn has_index_for_path(&self, soup: &str, path: &str) -> CoreResult<bool> {
        Ok(self.get_index_specs(soup)?.iter().any(|spec| spec.path == path))
    }

    /// Returns the column holding the projection of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIndex`] if `path` is not indexed.
    pub fn get_column_name_for_path(&self, soup: &str, path: &str) -> CoreResult<String> {
        self.get_index_specs(soup)?
            .iter()
            .find(|spec| spec.path == path)
            .map(|spec| spec.column().to_string())
            .ok_or_else(|| CoreError::missing_index(soup, path))
    }

    // === Statements ===

    /// Returns the id the next row of `table` will get.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence table cannot be read.
    pub fn get_next_id(&self, table: &str) -> CoreResult<i64> {
        let statement = match self.cache.next_id_statement(table) {
            Some(statement) => statement,
            None => {
                let compiled = self.compile(SEQ_SELECT)?;
                self.cache.cache_next_id_statement(table, compiled)
            }
        };
        // No row until the first insert into the table.
        Ok(statement.query_long(&[table.into()])?.map_or(1, |seq| seq + 1))
    }

    fn compile(&self, sql: &str) -> CoreResult<CompiledStatement> {
        CompiledStatement::prepare(Arc::clone(&self.engine), sql, Arc::clone(self.stats()))
    }

    /// Inserts a row through the table's cached inserter.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert(&self, table: &str, columns: &[String], values: &[SqlValue]) -> CoreResult<()> {
        let inserter = match self.cache.inserter(table) {
            Some(inserter) if inserter.matches(columns) => inserter,
            _ => {
                let prepared = RowInserter::prepare(
                    Arc::clone(&self.engine),
                    table,
                    columns.to_vec(),
                    Arc::clone(self.stats()),
                )?;
                self.cache.cache_inserter(prepared)
            }
        };
        inserter.insert(values)
    }

    /// Updates rows and returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update(
        &self,
        table: &str,
        values: &[(String, SqlValue)],
        where_clause: &str,
        where_args: &[SqlValue],
    ) -> CoreResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = values.iter().map(|(col, _)| format!("{col} = ?")).collect();
        let sql = format!("UPDATE {table} SET {} WHERE {where_clause}", assignments.join(", "));
        let args: Vec<SqlValue> = values
            .iter()
            .map(|(_, v)| v.clone())
            .chain(where_args.iter().cloned())
            .collect();
        Ok(self.engine.execute(&sql, &args)?)
    }

    /// Deletes rows and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, table: &str, where_clause: &str, where_args: &[SqlValue]) -> CoreResult<usize> {
        let sql = format!("DELETE FROM {table} WHERE {where_clause}");
        tracing::debug!(sql = %sql, "delete");
        Ok(self.engine.execute(&sql, where_args)?)
    }

    /// Runs a plain table query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn query(
        &self,
        table: &str,
        columns: &[&str],
        order_by: Option<&str>,
        limit: Option<&str>,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> CoreResult<RowSet> {
        let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
        if let Some(where_clause) = where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        if let Some(order_by) = order_by {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(self.engine.query(&sql, where_args)?)
    }

    /// Counts rows of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_query(&self, table: &str, where_clause: Option<&str>, where_args: &[SqlValue]) -> CoreResult<i64> {
        let selection = where_clause.map(|w| format!(" WHERE {w}")).unwrap_or_default();
        let sql = format!("SELECT count(*) FROM {table}{selection}");
        Ok(self.engine.query(&sql, where_args)?.first_value().and_then(SqlValue::as_i64).unwrap_or(0))
    }

    /// Runs a count query through the cached statement for its SQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails to compile or run.
    pub fn count_raw_count_query(&self, count_sql: &str, args: &[SqlValue]) -> CoreResult<i64> {
        let statement = match self.cache.count_statement(count_sql) {
            Some(statement) => statement,
            None => {
                let compiled = self.compile(count_sql)?;
                self.cache.cache_count_statement(compiled)
            }
        };
        Ok(statement.query_long(args)?.unwrap_or(0))
    }

    /// Counts the rows `sql` returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails to compile or run.
    pub fn count_raw_query(&self, sql: &str, args: &[SqlValue]) -> CoreResult<i64> {
        self.count_raw_count_query(&format!("SELECT count(*) FROM ({sql})"), args)
    }

    /// Runs `sql` with a `LIMIT`, capturing its plan first if enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn limit_raw_query(&self, sql: &str, limit: &str, args: &[SqlValue]) -> CoreResult<RowSet> {
        let limit_sql = format!("SELECT * FROM ({sql}) LIMIT {limit}");
        if self.capture_explain.load(Ordering::Relaxed) {
            self.run_explain_query_plan(&limit_sql, args)?;
        }
        Ok(self.engine.query(&limit_sql, args)?)
    }

    /// Runs `sql` without a limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn raw_query(&self, sql: &str, args: &[SqlValue]) -> CoreResult<RowSet> {
        Ok(self.engine.query(sql, args)?)
    }

    fn run_explain_query_plan(&self, sql: &str, args: &[SqlValue]) -> CoreResult<()> {
        let plan = self.engine.query(&format!("EXPLAIN QUERY PLAN {sql}"), args)?;
        let rows: Vec<Value> = plan
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = plan
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), Value::String(value.to_string())))
                    .collect();
                Value::Object(object)
            })
            .collect();

        let mut explain = json!({ EXPLAIN_SQL: sql, EXPLAIN_ROWS: rows });
        if !args.is_empty() {
            let args: Vec<String> = args.iter().map(ToString::to_string).collect();
            explain[EXPLAIN_ARGS] = json!(args);
        }
        tracing::debug!(target: "soupstore::explain", plan = %explain, "query plan");
        *self.last_explain.lock() = Some(explain);
        Ok(())
    }

    /// Turns query plan capture on or off.
    pub fn set_capture_explain_query_plan(&self, capture: bool) {
        self.capture_explain.store(capture, Ordering::Relaxed);
    }

    /// Returns the plan captured for the last paged query, if any.
    #[must_use]
    pub fn last_explain_query_plan(&self) -> Option<Value> {
        self.last_explain.lock().clone()
    }

    // === Transactions and cache control ===

    /// Runs `body` in an engine transaction, rolling back if it fails.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or an engine error from begin/commit.
    pub fn transaction<T>(&self, body: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        let mut body = Some(body);
        let mut outcome: Option<CoreResult<T>> = None;
        let result = self.engine.transaction(&mut || {
            let run = body.take().ok_or(StorageError::RolledBack)?;
            let value = run();
            let failed = value.is_err();
            outcome = Some(value);
            if failed {
                Err(StorageError::RolledBack)
            } else {
                Ok(())
            }
        });
        match (result, outcome) {
            (Ok(()), Some(Ok(value))) => Ok(value),
            (_, Some(Err(err))) => Err(err),
            (Err(err), _) => Err(err.into()),
            (Ok(()), None) => Err(CoreError::invalid_operation("transaction body did not run")),
        }
    }

    /// Forgets everything cached about a soup.
    pub fn invalidate(&self, soup: &str) {
        self.cache.invalidate(soup);
    }

    /// Evicts every cached fact and statement.
    pub fn clear_memory_cache(&self) {
        self.cache.reset_all();
    }
}

impl std::fmt::Debug for DbHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbHelper").field("cache", &self.cache).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soupstore_storage::SqliteEngine;

    fn helper() -> (Arc<SqliteEngine>, DbHelper) {
        let engine = Arc::new(SqliteEngine::open_in_memory().unwrap());
        engine
            .execute_batch(
                "CREATE TABLE soup_attrs (id INTEGER PRIMARY KEY AUTOINCREMENT, soupName TEXT);
                 CREATE TABLE soup_index_map (soupName TEXT, path TEXT, columnName TEXT, columnType TEXT);
                 INSERT INTO soup_attrs (soupName) VALUES ('people');
                 INSERT INTO soup_index_map VALUES ('people', 'name', 'TABLE_1_0', 'string');
                 INSERT INTO soup_index_map VALUES ('people', 'bio', 'TABLE_1_1', 'full_text');
                 CREATE TABLE TABLE_1 (id INTEGER PRIMARY KEY AUTOINCREMENT, soup TEXT, TABLE_1_0 TEXT);",
            )
            .unwrap();
        let helper = DbHelper::new(engine.clone(), &Config::default());
        (engine, helper)
    }

    #[test]
    fn reads_and_caches_soup_metadata() {
        let (_engine, helper) = helper();
        assert_eq!(helper.get_soup_table_name("people").unwrap().as_deref(), Some("TABLE_1"));
        assert_eq!(helper.get_soup_table_name("ghosts").unwrap(), None);
        assert!(helper.has_soup("people").unwrap());
        assert!(!helper.has_soup("ghosts").unwrap());

        let specs = helper.get_index_specs("people").unwrap();
        assert_eq!(specs.len(), 2);
        assert!(helper.has_fts("people").unwrap());
        assert!(helper.has_index_for_path("people", "name").unwrap());
        assert_eq!(helper.get_column_name_for_path("people", "name").unwrap(), "TABLE_1_0");
        assert!(matches!(
            helper.get_column_name_for_path("people", "age"),
            Err(CoreError::MissingIndex { .. })
        ));

        let misses = helper.stats().misses();
        helper.get_index_specs("people").unwrap();
        assert_eq!(helper.stats().misses(), misses);
    }

    #[test]
    fn unknown_soup_has_no_specs() {
        let (_engine, helper) = helper();
        assert!(matches!(
            helper.get_index_specs("ghosts"),
            Err(CoreError::UnknownCollection { .. })
        ));
        assert!(helper.read_collection_metadata("ghosts").unwrap().is_none());
    }

    #[test]
    fn next_id_follows_sequence() {
        let (_engine, helper) = helper();
        assert_eq!(helper.get_next_id("TABLE_1").unwrap(), 1);
        let columns = vec!["soup".to_string(), "TABLE_1_0".to_string()];
        helper.insert("TABLE_1", &columns, &["{}".into(), "ann".into()]).unwrap();
        assert_eq!(helper.get_next_id("TABLE_1").unwrap(), 2);
    }

    #[test]
    fn count_statements_are_cached_until_invalidated() {
        let (engine, helper) = helper();
        let table = helper.require_soup_table_name("people").unwrap();
        let before = engine.live_statements();
        let sql = format!("SELECT * FROM {table}");
        assert_eq!(helper.count_raw_query(&sql, &[]).unwrap(), 0);
        assert_eq!(helper.count_raw_query(&sql, &[]).unwrap(), 0);
        assert_eq!(engine.live_statements(), before + 1);

        helper.invalidate("people");
        assert_eq!(engine.live_statements(), before);
        assert_eq!(helper.stats().release_failures(), 0);
    }

    #[test]
    fn update_and_delete() {
        let (_engine, helper) = helper();
        let columns = vec!["soup".to_string(), "TABLE_1_0".to_string()];
        helper.insert("TABLE_1", &columns, &["{}".into(), "ann".into()]).unwrap();

        let changed = helper
            .update("TABLE_1", &[("TABLE_1_0".to_string(), "bob".into())], "id = ?", &[SqlValue::Integer(1)])
            .unwrap();
        assert_eq!(changed, 1);
        let rows = helper.query("TABLE_1", &["TABLE_1_0"], None, None, Some("id = ?"), &[SqlValue::Integer(1)]).unwrap();
        assert_eq!(rows.first_value(), Some(&SqlValue::Text("bob".into())));

        assert_eq!(helper.delete("TABLE_1", "id = ?", &[SqlValue::Integer(1)]).unwrap(), 1);
        assert_eq!(helper.count_query("TABLE_1", None, &[]).unwrap(), 0);
    }

    #[test]
    fn explain_plan_capture() {
        let (_engine, helper) = helper();
        assert!(helper.last_explain_query_plan().is_none());
        helper.set_capture_explain_query_plan(true);
        helper
            .limit_raw_query("SELECT * FROM TABLE_1 WHERE TABLE_1_0 = ?", "0,10", &["ann".into()])
            .unwrap();
        let plan = helper.last_explain_query_plan().unwrap();
        assert!(plan[EXPLAIN_SQL].as_str().unwrap().contains("LIMIT 0,10"));
        assert_eq!(plan[EXPLAIN_ARGS], json!(["ann"]));
        assert!(plan[EXPLAIN_ROWS].is_array());
    }

    #[test]
    fn transaction_rolls_back_core_errors() {
        let (_engine, helper) = helper();
        let columns = vec!["soup".to_string(), "TABLE_1_0".to_string()];
        let result: CoreResult<()> = helper.transaction(|| {
            helper.insert("TABLE_1", &columns, &["{}".into(), "ann".into()])?;
            Err(CoreError::invalid_operation("abort"))
        });
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert_eq!(helper.count_query("TABLE_1", None, &[]).unwrap(), 0);

        let id = helper
            .transaction(|| {
                helper.insert("TABLE_1", &columns, &["{}".into(), "ann".into()])?;
                helper.get_next_id("TABLE_1")
            })
            .unwrap();
        assert_eq!(id, 2);
    }
}
