//! The document store.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::helper::DbHelper;
use crate::index::{assign_column_names, has_full_text, IndexSpec, IndexType};
use crate::project::project;
use crate::query::{QuerySpec, QueryType};
use crate::smart_sql;
use crate::stats::CacheStatsSnapshot;
use crate::types::{
    fts_table_name, SoupId, COLUMN_NAME_COL, COLUMN_TYPE_COL, CREATED_COL, ID_COL, LAST_MODIFIED_COL,
    PATH_COL, ROWID_COL, SOUP_ATTRS_TABLE, SOUP_COL, SOUP_CREATED_DATE, SOUP_ENTRY_ID,
    SOUP_INDEX_MAP_TABLE, SOUP_LAST_MODIFIED_DATE, SOUP_NAME_COL,
};
use serde_json::Value;
use soupstore_storage::{RowSet, SqlValue, SqliteEngine, StorageEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// An embedded JSON document store.
///
/// Documents live in named soups. Each soup is a table holding the whole
/// document plus one column per declared index, and optionally a full-text
/// table. Queries are described by [`QuerySpec`] and run as smart SQL.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use soupstore_core::{IndexSpec, IndexType, QuerySpec, SmartStore};
///
/// let store = SmartStore::open_in_memory().unwrap();
/// store.register_soup("people", &[IndexSpec::new("name", IndexType::String)]).unwrap();
/// store.create("people", json!({"name": "ann", "age": 31})).unwrap();
///
/// let spec = QuerySpec::exact("people", "name", "ann").build();
/// let found = store.query(&spec, 0).unwrap();
/// assert_eq!(found[0]["age"], 31);
/// ```
pub struct SmartStore {
    helper: DbHelper,
    config: Config,
    path: Option<PathBuf>,
}

impl SmartStore {
    /// Opens or creates a store file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or initialised.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens or creates a store file with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or initialised.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let engine = SqliteEngine::open(path)?;
        engine.set_statement_cache_capacity(config.statement_cache_capacity);
        let mut store = Self::with_engine(Arc::new(engine), config)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata tables cannot be created.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens a private in-memory store with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata tables cannot be created.
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        let engine = SqliteEngine::open_in_memory()?;
        engine.set_statement_cache_capacity(config.statement_cache_capacity);
        Self::with_engine(Arc::new(engine), config)
    }

    /// Builds a store over any engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata tables cannot be created.
    pub fn with_engine(engine: Arc<dyn StorageEngine>, config: Config) -> CoreResult<Self> {
        let store = Self {
            helper: DbHelper::new(engine, &config),
            config,
            path: None,
        };
        store.create_meta_tables()?;
        Ok(store)
    }

    fn create_meta_tables(&self) -> CoreResult<()> {
        self.engine().execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {SOUP_INDEX_MAP_TABLE} ({SOUP_NAME_COL} TEXT, {PATH_COL} TEXT, \
             {COLUMN_NAME_COL} TEXT, {COLUMN_TYPE_COL} TEXT);
             CREATE INDEX IF NOT EXISTS {SOUP_INDEX_MAP_TABLE}_0 on {SOUP_INDEX_MAP_TABLE} ( {SOUP_NAME_COL} );
             CREATE TABLE IF NOT EXISTS {SOUP_ATTRS_TABLE} ({ID_COL} INTEGER PRIMARY KEY AUTOINCREMENT, \
             {SOUP_NAME_COL} TEXT UNIQUE);"
        ))?;
        Ok(())
    }

    // === Accessors ===

    /// Returns the storage access helper.
    #[must_use]
    pub fn helper(&self) -> &DbHelper {
        &self.helper
    }

    fn engine(&self) -> &Arc<dyn StorageEngine> {
        self.helper.engine()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file path, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.helper.stats().snapshot()
    }

    /// Turns query plan capture on or off.
    pub fn set_capture_explain_query_plan(&self, capture: bool) {
        self.helper.set_capture_explain_query_plan(capture);
    }

    /// Returns the plan captured for the last paged query.
    #[must_use]
    pub fn last_explain_query_plan(&self) -> Option<Value> {
        self.helper.last_explain_query_plan()
    }

    // === Soups ===

    /// Registers a soup with its index specs.
    ///
    /// Does nothing if the soup already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, no specs are given, a path is
    /// declared twice, or the tables cannot be created.
    pub fn register_soup(&self, soup: &str, specs: &[IndexSpec]) -> CoreResult<()> {
        if soup.is_empty() {
            return Err(CoreError::invalid_operation("empty soup name"));
        }
        if specs.is_empty() {
            return Err(CoreError::invalid_index_specs(format!(
                "no index specs specified for soup {soup}"
            )));
        }
        if self.has_soup(soup)? {
            return Ok(());
        }

        // Re-checked under the write lock; the cached answer may be stale.
        let created = self.helper.transaction(|| -> CoreResult<Option<(String, Vec<IndexSpec>)>> {
            let existing = self.engine().query(
                &format!("SELECT {ID_COL} FROM {SOUP_ATTRS_TABLE} WHERE {SOUP_NAME_COL} = ?"),
                &[soup.into()],
            )?;
            if !existing.is_empty() {
                return Ok(None);
            }

            let id = self.engine().insert(
                &format!("INSERT INTO {SOUP_ATTRS_TABLE} ({SOUP_NAME_COL}) VALUES (?)"),
                &[soup.into()],
            )?;
            let table = SoupId::new(id).table_name();
            let assigned = assign_column_names(&table, specs)?;

            self.engine().execute_batch(&create_soup_table_sql(&table, &assigned))?;
            for spec in &assigned {
                self.engine().execute(
                    &format!(
                        "INSERT INTO {SOUP_INDEX_MAP_TABLE} ({SOUP_NAME_COL}, {PATH_COL}, {COLUMN_NAME_COL}, \
                         {COLUMN_TYPE_COL}) VALUES (?, ?, ?, ?)"
                    ),
                    &[
                        soup.into(),
                        spec.path.as_str().into(),
                        spec.column().into(),
                        spec.index_type.as_str().into(),
                    ],
                )?;
            }
            Ok(Some((table, assigned)))
        })?;

        // The negative existence check above is cached.
        self.helper.invalidate(soup);
        let Some((table, assigned)) = created else {
            tracing::debug!(soup, "soup registered concurrently");
            return Ok(());
        };
        let cache = self.helper.cache();
        let token = cache.fill_token();
        cache.cache_table_name(soup, &table, token);
        cache.cache_index_specs(soup, assigned.into(), token);
        tracing::info!(soup, table = %table, "registered soup");
        Ok(())
    }

    /// Returns true if the soup exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn has_soup(&self, soup: &str) -> CoreResult<bool> {
        self.helper.has_soup(soup)
    }

    /// Returns the table backing a soup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup does not exist.
    pub fn get_soup_table_name(&self, soup: &str) -> CoreResult<String> {
        self.helper.require_soup_table_name(soup)
    }

    /// Returns the index specs of a soup, column names included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup does not exist.
    pub fn get_soup_index_specs(&self, soup: &str) -> CoreResult<Vec<IndexSpec>> {
        self.helper.require_soup_table_name(soup)?;
        Ok(self.helper.get_index_specs(soup)?.to_vec())
    }

    /// Returns the names of all soups in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn get_all_soup_names(&self) -> CoreResult<Vec<String>> {
        let rows = self
            .helper
            .query(SOUP_ATTRS_TABLE, &[SOUP_NAME_COL], Some(ID_COL), None, None, &[])?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_str).map(str::to_string))
            .collect())
    }

    /// Drops a soup with its entries and metadata. Unknown soups are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be dropped.
    pub fn drop_soup(&self, soup: &str) -> CoreResult<()> {
        let Some(table) = self.helper.get_soup_table_name(soup)? else {
            return Ok(());
        };
        // Release statements compiled against the table before it goes.
        self.helper.invalidate(soup);
        self.helper.transaction(|| {
            self.engine().execute_batch(&format!(
                "DROP TABLE IF EXISTS {table}; DROP TABLE IF EXISTS {};",
                fts_table_name(&table)
            ))?;
            let by_name = format!("{SOUP_NAME_COL} = ?");
            self.helper.delete(SOUP_ATTRS_TABLE, &by_name, &[soup.into()])?;
            self.helper.delete(SOUP_INDEX_MAP_TABLE, &by_name, &[soup.into()])?;
            Ok(())
        })?;
        self.helper.invalidate(soup);
        tracing::info!(soup, table = %table, "dropped soup");
        Ok(())
    }

    /// Drops every soup.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while dropping.
    pub fn drop_all_soups(&self) -> CoreResult<()> {
        for soup in self.get_all_soup_names()? {
            self.drop_soup(&soup)?;
        }
        Ok(())
    }

    /// Removes every entry of a soup, keeping the soup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup does not exist.
    pub fn clear_soup(&self, soup: &str) -> CoreResult<()> {
        let (table, specs) = self.metadata(soup)?;
        self.helper.transaction(|| {
            self.engine().execute(&format!("DELETE FROM {table}"), &[])?;
            if has_full_text(&specs) {
                self.engine().execute(&format!("DELETE FROM {}", fts_table_name(&table)), &[])?;
            }
            Ok(())
        })?;
        tracing::debug!(soup, "cleared soup");
        Ok(())
    }

    /// Recomputes the index columns of `paths` for every entry.
    ///
    /// Paths that are not indexed are ignored. Returns the number of
    /// entries rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCollection`] if the soup does not exist.
    pub fn reindex_soup(&self, soup: &str, paths: &[&str]) -> CoreResult<usize> {
        let (table, specs) = self.metadata(soup)?;
        let selected: Vec<IndexSpec> = specs
            .iter()
            .filter(|spec| paths.contains(&spec.path.as_str()))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(0);
        }

        self.helper.transaction(|| {
            let rows = self.helper.query(&table, &[ID_COL, SOUP_COL], None, None, None, &[])?;
            let mut count = 0;
            for row in &rows.rows {
                let (Some(id), Some(raw)) = (
                    row.first().and_then(SqlValue::as_i64),
                    row.get(1).and_then(SqlValue::as_str),
                ) else {
                    continue;
                };
                let doc: Value = match serde_json::from_str(raw) {
                    Ok(doc) => doc,
                    Err(err) => {
                        tracing::warn!(soup, id, error = %err, "skipping unparsable entry");
                        continue;
                    }
                };
                self.write_index_columns(&table, &selected, &doc, id, Vec::new())?;
                count += 1;
            }
            Ok(count)
        })
    }

    // === Entries ===

    /// Stores a new entry and returns it with its bookkeeping fields set.
    ///
    /// # Errors
    ///
    /// Returns an error if the soup does not exist, the document is not a
    /// JSON object, or the insert fails.
    pub fn create(&self, soup: &str, doc: Value) -> CoreResult<Value> {
        let (table, specs) = self.metadata(soup)?;
        self.helper.transaction(|| self.create_entry(&table, &specs, doc))
    }

    /// Creates or updates an entry matched by `_soupEntryId`.
    ///
    /// # Errors
    ///
    /// See [`SmartStore::create`] and [`SmartStore::update`].
    pub fn upsert(&self, soup: &str, doc: Value) -> CoreResult<Value> {
        self.upsert_with_external_id(soup, doc, SOUP_ENTRY_ID)
    }

    /// Creates or updates an entry matched on `external_id_path`, which
    /// must be indexed unless it is `_soupEntryId`.
    ///
    /// # Errors
    ///
    /// Returns an error if more than one entry matches, the path is not
    /// indexed, or the write fails.
    pub fn upsert_with_external_id(&self, soup: &str, doc: Value, external_id_path: &str) -> CoreResult<Value> {
        let (table, specs) = self.metadata(soup)?;
        self.helper.transaction(|| {
            let entry_id = if external_id_path == SOUP_ENTRY_ID {
                doc.get(SOUP_ENTRY_ID).and_then(Value::as_i64)
            } else {
                match project(&doc, external_id_path) {
                    Some(value) if !value.is_null() => self.lookup_soup_entry_id(soup, external_id_path, &value)?,
                    _ => None,
                }
            };
            match entry_id {
                Some(id) => self.update_entry(soup, &table, &specs, doc, id),
                None => self.create_entry(&table, &specs, doc),
            }
        })
    }

    /// Returns the id of the entry whose indexed `path` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIndex`] if the path is not indexed, and
    /// [`CoreError::InvalidOperation`] if more than one entry matches.
    pub fn lookup_soup_entry_id(&self, soup: &str, path: &str, value: &Value) -> CoreResult<Option<i64>> {
        let (table, specs) = self.metadata(soup)?;
        let spec = specs
            .iter()
            .find(|spec| spec.path == path)
            .ok_or_else(|| CoreError::missing_index(soup, path))?;
        let rows = self.helper.query(
            &table,
            &[ID_COL],
            None,
            None,
            Some(&format!("{} = ?", spec.column())),
            &[index_value(spec.index_type, value)],
        )?;
        if rows.len() > 1 {
            return Err(CoreError::invalid_operation(format!(
                "there are more than one soup elements where {path} is {value}"
            )));
        }
        Ok(rows.first_value().and_then(SqlValue::as_i64))
    }

    /// Replaces the entry `entry_id` and returns the stored document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntryNotFound`] if no such entry exists.
    pub fn update(&self, soup: &str, doc: Value, entry_id: i64) -> CoreResult<Value> {
        let (table, specs) = self.metadata(soup)?;
        self.helper
            .transaction(|| self.update_entry(soup, &table, &specs, doc, entry_id))
    }

    /// Returns the entries with the given ids. Missing ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the soup does not exist or a stored document
    /// cannot be parsed.
    pub fn retrieve(&self, soup: &str, entry_ids: &[i64]) -> CoreResult<Vec<Value>> {
        let table = self.helper.require_soup_table_name(soup)?;
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.helper.query(
            &table,
            &[SOUP_COL],
            Some(ID_COL),
            None,
            Some(&entry_ids_predicate(ID_COL, entry_ids)),
            &[],
        )?;
        rows.rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_str))
            .map(|raw| -> CoreResult<Value> { Ok(serde_json::from_str(raw)?) })
            .collect()
    }

    /// Deletes entries by id and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the soup does not exist or the delete fails.
    pub fn delete(&self, soup: &str, entry_ids: &[i64]) -> CoreResult<usize> {
        let (table, specs) = self.metadata(soup)?;
        if entry_ids.is_empty() {
            return Ok(0);
        }
        self.helper.transaction(|| {
            if has_full_text(&specs) {
                self.helper.delete(
                    &fts_table_name(&table),
                    &entry_ids_predicate(ROWID_COL, entry_ids),
                    &[],
                )?;
            }
            self.helper.delete(&table, &entry_ids_predicate(ID_COL, entry_ids), &[])
        })
    }

    /// Deletes every entry a query selects and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a structured query names
    /// another soup, or any translation error.
    pub fn delete_by_query(&self, soup: &str, spec: &QuerySpec) -> CoreResult<usize> {
        if let Some(target) = spec.soup_name() {
            if target != soup {
                return Err(CoreError::invalid_operation(format!(
                    "cannot delete from soup {soup} with a query on soup {target}"
                )));
            }
        }
        let (table, specs) = self.metadata(soup)?;
        let ids_sql = self.translate(spec.ids_smart_sql())?;
        let args = bind_args(spec);
        self.helper.transaction(|| {
            if has_full_text(&specs) {
                self.helper.delete(
                    &fts_table_name(&table),
                    &format!("{ROWID_COL} IN ({ids_sql})"),
                    &args,
                )?;
            }
            self.helper.delete(&table, &format!("{ID_COL} IN ({ids_sql})"), &args)
        })
    }

    // === Queries ===

    /// Translates smart SQL against this store's soups.
    ///
    /// # Errors
    ///
    /// See [`crate::smart_sql::translate`].
    pub fn translate(&self, smart_sql: &str) -> CoreResult<String> {
        smart_sql::translate(&self.helper, smart_sql)
    }

    /// Runs one page of a query.
    ///
    /// Structured queries without selected paths return the documents.
    /// Smart queries and projections return one JSON array per row.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is zero or translation fails.
    pub fn query(&self, spec: &QuerySpec, page_index: usize) -> CoreResult<Vec<Value>> {
        let page_size = spec.page_size_value();
        if page_size == 0 {
            return Err(CoreError::invalid_query_spec("page size must be positive"));
        }
        let sql = self.translate(spec.smart_sql())?;
        let limit = format!("{},{page_size}", page_size.saturating_mul(page_index));
        let rows = self.helper.limit_raw_query(&sql, &limit, &bind_args(spec))?;

        let documents = spec.query_type() != QueryType::Smart && spec.select_paths().is_none();
        if documents {
            rows.rows
                .iter()
                .map(|row| -> CoreResult<Value> {
                    match row.first() {
                        Some(SqlValue::Text(raw)) => Ok(serde_json::from_str(raw)?),
                        other => Ok(other.map_or(Value::Null, sql_to_json)),
                    }
                })
                .collect()
        } else {
            rows_to_arrays(&rows)
        }
    }

    /// Counts the rows a query selects.
    ///
    /// # Errors
    ///
    /// Returns an error if translation or the count fails.
    pub fn count_query(&self, spec: &QuerySpec) -> CoreResult<i64> {
        let sql = self.translate(spec.count_smart_sql())?;
        self.helper.count_raw_count_query(&sql, &bind_args(spec))
    }

    /// Returns the ids of every entry a query selects, in query order.
    ///
    /// # Errors
    ///
    /// Returns an error if translation or the query fails.
    pub fn query_ids(&self, spec: &QuerySpec) -> CoreResult<Vec<i64>> {
        let sql = self.translate(spec.ids_smart_sql())?;
        let rows = self.helper.raw_query(&sql, &bind_args(spec))?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_i64))
            .collect())
    }

    // === Cache control ===

    /// Forgets everything cached about a soup.
    pub fn invalidate(&self, soup: &str) {
        self.helper.invalidate(soup);
    }

    /// Evicts every cached fact and releases every cached statement.
    pub fn reset_all(&self) {
        self.helper.clear_memory_cache();
    }

    // === Internals ===

    fn metadata(&self, soup: &str) -> CoreResult<(String, Arc<[IndexSpec]>)> {
        self.helper
            .read_collection_metadata(soup)?
            .ok_or_else(|| CoreError::unknown_collection(soup))
    }

    fn create_entry(&self, table: &str, specs: &[IndexSpec], doc: Value) -> CoreResult<Value> {
        let Value::Object(mut fields) = doc else {
            return Err(CoreError::invalid_operation("soup entries must be JSON objects"));
        };
        let now = now_millis();
        let id = self.helper.get_next_id(table)?;
        fields.insert(SOUP_ENTRY_ID.into(), id.into());
        fields.insert(SOUP_CREATED_DATE.into(), now.into());
        fields.insert(SOUP_LAST_MODIFIED_DATE.into(), now.into());
        let doc = Value::Object(fields);

        let mut columns = vec![
            ID_COL.to_string(),
            SOUP_COL.to_string(),
            CREATED_COL.to_string(),
            LAST_MODIFIED_COL.to_string(),
        ];
        let mut values = vec![id.into(), doc.to_string().into(), now.into(), now.into()];
        for (column, value) in projected_columns(specs, &doc) {
            columns.push(column);
            values.push(value);
        }
        self.helper.insert(table, &columns, &values)?;

        if has_full_text(specs) {
            let mut columns = vec![ROWID_COL.to_string()];
            let mut values = vec![SqlValue::Integer(id)];
            for (column, value) in full_text_columns(specs, &doc) {
                columns.push(column);
                values.push(value);
            }
            self.helper.insert(&fts_table_name(table), &columns, &values)?;
        }
        Ok(doc)
    }

    fn update_entry(
        &self,
        soup: &str,
        table: &str,
        specs: &[IndexSpec],
        doc: Value,
        entry_id: i64,
    ) -> CoreResult<Value> {
        let Value::Object(mut fields) = doc else {
            return Err(CoreError::invalid_operation("soup entries must be JSON objects"));
        };
        let now = now_millis();
        fields.insert(SOUP_ENTRY_ID.into(), entry_id.into());
        fields.insert(SOUP_LAST_MODIFIED_DATE.into(), now.into());
        let doc = Value::Object(fields);

        let base = vec![
            (SOUP_COL.to_string(), SqlValue::from(doc.to_string())),
            (LAST_MODIFIED_COL.to_string(), SqlValue::Integer(now)),
        ];
        let changed = self.write_index_columns(table, specs, &doc, entry_id, base)?;
        if changed == 0 {
            return Err(CoreError::EntryNotFound {
                soup: soup.to_string(),
                id: entry_id,
            });
        }
        Ok(doc)
    }

    /// Writes `base` plus the index columns of `specs` to one row, and the
    /// full-text columns to its FTS row.
    fn write_index_columns(
        &self,
        table: &str,
        specs: &[IndexSpec],
        doc: &Value,
        entry_id: i64,
        mut values: Vec<(String, SqlValue)>,
    ) -> CoreResult<usize> {
        values.extend(projected_columns(specs, doc));
        let by_id = format!("{ID_COL} = ?");
        let changed = self.helper.update(table, &values, &by_id, &[entry_id.into()])?;
        if changed > 0 && has_full_text(specs) {
            self.helper.update(
                &fts_table_name(table),
                &full_text_columns(specs, doc),
                &format!("{ROWID_COL} = ?"),
                &[entry_id.into()],
            )?;
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for SmartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("helper", &self.helper)
            .finish()
    }
}

fn create_soup_table_sql(table: &str, specs: &[IndexSpec]) -> String {
    let mut columns = vec![
        format!("{ID_COL} INTEGER PRIMARY KEY AUTOINCREMENT"),
        format!("{SOUP_COL} TEXT"),
        format!("{CREATED_COL} INTEGER"),
        format!("{LAST_MODIFIED_COL} INTEGER"),
    ];
    let mut statements = Vec::new();
    let mut fts_columns = Vec::new();
    for (i, spec) in specs.iter().enumerate() {
        if let Some(column_type) = spec.index_type.column_type() {
            columns.push(format!("{} {column_type}", spec.column()));
        }
        // JSON specs index the extraction expression itself.
        statements.push(format!(
            "CREATE INDEX {table}_{i}_idx on {table} ( {} );",
            spec.column()
        ));
        if spec.is_full_text() {
            fts_columns.push(spec.column());
        }
    }
    for column in [CREATED_COL, LAST_MODIFIED_COL] {
        statements.push(format!("CREATE INDEX {table}_{column}_idx on {table} ( {column} );"));
    }
    if !fts_columns.is_empty() {
        statements.push(format!(
            "CREATE VIRTUAL TABLE {} USING fts5({});",
            fts_table_name(table),
            fts_columns.join(", ")
        ));
    }
    format!("CREATE TABLE {table} ({});\n{}", columns.join(", "), statements.join("\n"))
}

/// Values of every column-backed index of `doc`, `NULL` where the path is
/// missing.
fn projected_columns(specs: &[IndexSpec], doc: &Value) -> Vec<(String, SqlValue)> {
    specs
        .iter()
        .filter(|spec| spec.index_type.column_type().is_some())
        .map(|spec| {
            let value = project(doc, &spec.path).map_or(SqlValue::Null, |v| index_value(spec.index_type, &v));
            (spec.column().to_string(), value)
        })
        .collect()
}

fn full_text_columns(specs: &[IndexSpec], doc: &Value) -> Vec<(String, SqlValue)> {
    specs
        .iter()
        .filter(|spec| spec.is_full_text())
        .map(|spec| {
            let value = project(doc, &spec.path).map_or(SqlValue::Null, |v| index_value(spec.index_type, &v));
            (spec.column().to_string(), value)
        })
        .collect()
}

/// Converts a projected value to what its index column stores. Values that
/// do not fit the column type become `NULL`.
fn index_value(index_type: IndexType, value: &Value) -> SqlValue {
    match (index_type, value) {
        (_, Value::Null) => SqlValue::Null,
        (IndexType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map_or(SqlValue::Null, SqlValue::Integer),
        (IndexType::Integer, Value::String(s)) => s.trim().parse::<i64>().map_or(SqlValue::Null, SqlValue::Integer),
        (IndexType::Integer, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (IndexType::Floating, Value::Number(n)) => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        (IndexType::Floating, Value::String(s)) => s.trim().parse::<f64>().map_or(SqlValue::Null, SqlValue::Real),
        (IndexType::Integer | IndexType::Floating, _) => SqlValue::Null,
        (IndexType::Json, Value::Number(n)) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        (IndexType::Json, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (_, Value::String(s)) => SqlValue::Text(s.clone()),
        (_, other) => SqlValue::Text(other.to_string()),
    }
}

fn entry_ids_predicate(column: &str, entry_ids: &[i64]) -> String {
    let ids: Vec<String> = entry_ids.iter().map(ToString::to_string).collect();
    format!("{column} IN ({})", ids.join(","))
}

fn bind_args(spec: &QuerySpec) -> Vec<SqlValue> {
    spec.args().into_iter().map(SqlValue::Text).collect()
}

fn sql_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Real(f) => Value::from(*f),
        SqlValue::Text(s) => Value::String(s.clone()),
    }
}

/// One JSON array per row. A column named exactly like the document
/// column is parsed back into a document.
fn rows_to_arrays(rows: &RowSet) -> CoreResult<Vec<Value>> {
    rows.rows
        .iter()
        .map(|row| -> CoreResult<Value> {
            let cells = rows
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| -> CoreResult<Value> {
                    match value {
                        SqlValue::Text(raw) if is_document_column(column) => Ok(serde_json::from_str(raw)?),
                        other => Ok(sql_to_json(other)),
                    }
                })
                .collect::<CoreResult<Vec<Value>>>()?;
            Ok(Value::Array(cells))
        })
        .collect()
}

fn is_document_column(column: &str) -> bool {
    column == SOUP_COL || column.strip_prefix('_') == Some(SOUP_COL)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Order;
    use serde_json::json;

    fn people() -> SmartStore {
        let store = SmartStore::open_in_memory().unwrap();
        store
            .register_soup(
                "people",
                &[
                    IndexSpec::new("name", IndexType::String),
                    IndexSpec::new("age", IndexType::Integer),
                    IndexSpec::new("bio", IndexType::FullText),
                    IndexSpec::new("address.city", IndexType::Json),
                    IndexSpec::new("score", IndexType::Floating),
                ],
            )
            .unwrap();
        store
    }

    fn seed(store: &SmartStore) -> Vec<i64> {
        [
            json!({"name": "ann", "age": 31, "bio": "rust and sql", "address": {"city": "oslo"}, "score": 1.5}),
            json!({"name": "bob", "age": 17, "bio": "go and sql", "address": {"city": "rome"}, "score": 2.5}),
            json!({"name": "cid", "age": 45, "bio": "rust only", "address": {"city": "oslo"}}),
        ]
        .into_iter()
        .map(|doc| {
            store.create("people", doc).unwrap()[SOUP_ENTRY_ID]
                .as_i64()
                .unwrap()
        })
        .collect()
    }

    #[test]
    fn register_is_idempotent_and_validates() {
        let store = people();
        assert!(store.has_soup("people").unwrap());
        store
            .register_soup("people", &[IndexSpec::new("other", IndexType::String)])
            .unwrap();
        assert_eq!(store.get_soup_index_specs("people").unwrap().len(), 5);
        assert_eq!(store.get_soup_table_name("people").unwrap(), "TABLE_1");

        assert!(store.register_soup("", &[IndexSpec::new("a", IndexType::String)]).is_err());
        assert!(matches!(
            store.register_soup("empty", &[]),
            Err(CoreError::InvalidIndexSpecs { .. })
        ));
        assert!(!store.has_soup("empty").unwrap());
    }

    #[test]
    fn registered_layout_is_persisted() {
        let store = people();
        let specs = store.get_soup_index_specs("people").unwrap();
        let columns: Vec<&str> = specs.iter().map(IndexSpec::column).collect();
        assert_eq!(
            columns,
            vec!["TABLE_1_0", "TABLE_1_1", "TABLE_1_2", "json_extract(soup, '$.address.city')", "TABLE_1_4"]
        );

        store.reset_all();
        let reread = store.get_soup_index_specs("people").unwrap();
        assert_eq!(reread, specs);
        assert!(store.engine().table_exists("TABLE_1_fts").unwrap());
    }

    #[test]
    fn create_sets_bookkeeping_fields() {
        let store = people();
        let doc = store.create("people", json!({"name": "ann"})).unwrap();
        assert_eq!(doc[SOUP_ENTRY_ID], 1);
        assert!(doc[SOUP_CREATED_DATE].as_i64().unwrap() > 0);
        assert_eq!(doc[SOUP_CREATED_DATE], doc[SOUP_LAST_MODIFIED_DATE]);
        assert!(store.create("people", json!([1, 2])).is_err());
        assert!(matches!(
            store.create("ghosts", json!({})),
            Err(CoreError::UnknownCollection { .. })
        ));
    }

    #[test]
    fn retrieve_and_delete() {
        let store = people();
        let ids = seed(&store);
        let docs = store.retrieve("people", &[ids[2], ids[0], 99]).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["ann", "cid"]);

        assert_eq!(store.delete("people", &[ids[0]]).unwrap(), 1);
        assert!(store.retrieve("people", &[ids[0]]).unwrap().is_empty());
        let spec = QuerySpec::match_query("people", Some("bio"), "rust").build();
        assert_eq!(store.count_query(&spec).unwrap(), 1);
    }

    #[test]
    fn update_rewrites_index_columns() {
        let store = people();
        let ids = seed(&store);
        let updated = store
            .update("people", json!({"name": "bea", "age": 32, "bio": "zig"}), ids[1])
            .unwrap();
        assert_eq!(updated[SOUP_ENTRY_ID], ids[1]);

        let spec = QuerySpec::exact("people", "name", "bea").build();
        assert_eq!(store.query_ids(&spec).unwrap(), vec![ids[1]]);
        let fts = QuerySpec::match_query("people", Some("bio"), "zig").build();
        assert_eq!(store.query_ids(&fts).unwrap(), vec![ids[1]]);

        assert!(matches!(
            store.update("people", json!({"name": "x"}), 404),
            Err(CoreError::EntryNotFound { id: 404, .. })
        ));
    }

    #[test]
    fn upsert_by_entry_id_and_external_id() {
        let store = people();
        let created = store.upsert("people", json!({"name": "ann", "age": 1})).unwrap();
        let id = created[SOUP_ENTRY_ID].as_i64().unwrap();

        let mut changed = created.clone();
        changed["age"] = json!(2);
        let updated = store.upsert("people", changed).unwrap();
        assert_eq!(updated[SOUP_ENTRY_ID], id);

        let by_name = store
            .upsert_with_external_id("people", json!({"name": "ann", "age": 3}), "name")
            .unwrap();
        assert_eq!(by_name[SOUP_ENTRY_ID], id);
        assert_eq!(store.retrieve("people", &[id]).unwrap()[0]["age"], 3);

        store.create("people", json!({"name": "ann"})).unwrap();
        assert!(store
            .upsert_with_external_id("people", json!({"name": "ann"}), "name")
            .is_err());
        assert!(matches!(
            store.upsert_with_external_id("people", json!({"nick": "a"}), "nick"),
            Err(CoreError::MissingIndex { .. })
        ));
    }

    #[test]
    fn lookup_by_indexed_path() {
        let store = people();
        let ids = seed(&store);
        assert_eq!(store.lookup_soup_entry_id("people", "age", &json!(17)).unwrap(), Some(ids[1]));
        assert_eq!(store.lookup_soup_entry_id("people", "name", &json!("zed")).unwrap(), None);
        assert!(store.lookup_soup_entry_id("people", "address.city", &json!("oslo")).is_err());
    }

    #[test]
    fn structured_queries_return_documents() {
        let store = people();
        seed(&store);

        let range = QuerySpec::range("people", "age", Some("18"), None)
            .order_by("age", Order::Descending)
            .build();
        let names: Vec<Value> = store.query(&range, 0).unwrap().iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("cid"), json!("ann")]);
        assert_eq!(store.count_query(&range).unwrap(), 2);

        let like = QuerySpec::like("people", "name", "b%").build();
        assert_eq!(store.query(&like, 0).unwrap()[0]["name"], "bob");

        let city = QuerySpec::exact("people", "address.city", "oslo").build();
        assert_eq!(store.count_query(&city).unwrap(), 2);

        let unindexed = QuerySpec::all("people").order_by("score", Order::Ascending).build();
        assert_eq!(store.query(&unindexed, 0).unwrap().len(), 3);
    }

    #[test]
    fn paging_uses_offset_and_page_size() {
        let store = people();
        seed(&store);
        let spec = QuerySpec::all("people")
            .order_by("_soupEntryId", Order::Ascending)
            .page_size(2)
            .build();
        assert_eq!(store.query(&spec, 0).unwrap().len(), 2);
        let second = store.query(&spec, 1).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["name"], "cid");
        assert!(store.query(&spec, 2).unwrap().is_empty());

        let zero = QuerySpec::all("people").page_size(0).build();
        assert!(store.query(&zero, 0).is_err());
    }

    #[test]
    fn projections_and_smart_queries_return_arrays() {
        let store = people();
        seed(&store);

        let spec = QuerySpec::exact("people", "name", "ann")
            .select_paths(["name", "age", "address.city"])
            .build();
        assert_eq!(store.query(&spec, 0).unwrap(), vec![json!(["ann", 31, "oslo"])]);

        let smart = QuerySpec::smart(
            "SELECT {people:name}, {people:_soup} FROM {people} WHERE {people:age} > 40",
            10,
        );
        let rows = store.query(&smart, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "cid");
        assert_eq!(rows[0][1]["address"]["city"], "oslo");
        assert_eq!(store.count_query(&smart).unwrap(), 1);

        let count = QuerySpec::smart("SELECT count(*) FROM {people}", 1);
        assert_eq!(store.query(&count, 0).unwrap(), vec![json!([3])]);
    }

    #[test]
    fn aliased_columns_are_not_parsed_as_documents() {
        let store = people();
        seed(&store);

        for alias in ["mysoup", "soup_name", "p_soup"] {
            let smart = QuerySpec::smart(
                format!("SELECT {{people:name}} AS {alias} FROM {{people}} WHERE {{people:age}} = 31"),
                10,
            );
            assert_eq!(store.query(&smart, 0).unwrap(), vec![json!(["ann"])], "alias {alias}");
        }

        let renamed = QuerySpec::smart(
            "SELECT {people:_soup} AS _soup FROM {people} WHERE {people:age} = 31",
            10,
        );
        assert_eq!(store.query(&renamed, 0).unwrap()[0][0]["name"], "ann");
    }

    #[test]
    fn match_queries_search_full_text() {
        let store = people();
        let ids = seed(&store);
        let field = QuerySpec::match_query("people", Some("bio"), "rust").build();
        assert_eq!(store.query_ids(&field).unwrap(), vec![ids[0], ids[2]]);
        let both = QuerySpec::match_query("people", Some("bio"), "rust AND sql").build();
        assert_eq!(store.query_ids(&both).unwrap(), vec![ids[0]]);
        let anywhere = QuerySpec::match_query("people", None, "go").build();
        assert_eq!(store.count_query(&anywhere).unwrap(), 1);
    }

    #[test]
    fn delete_by_query_removes_selected_entries() {
        let store = people();
        seed(&store);
        let spec = QuerySpec::range("people", "age", None, Some("40")).build();
        assert_eq!(store.delete_by_query("people", &spec).unwrap(), 2);
        assert_eq!(store.count_query(&QuerySpec::all("people").build()).unwrap(), 1);
        assert_eq!(
            store
                .count_query(&QuerySpec::match_query("people", None, "sql").build())
                .unwrap(),
            0
        );

        let other = QuerySpec::all("pets").build();
        assert!(store.delete_by_query("people", &other).is_err());
    }

    #[test]
    fn clear_and_drop_soups() {
        let store = people();
        store
            .register_soup("pets", &[IndexSpec::new("owner", IndexType::String)])
            .unwrap();
        seed(&store);
        assert_eq!(store.get_all_soup_names().unwrap(), vec!["people", "pets"]);

        store.clear_soup("people").unwrap();
        assert_eq!(store.count_query(&QuerySpec::all("people").build()).unwrap(), 0);
        assert!(store.has_soup("people").unwrap());

        store.drop_soup("people").unwrap();
        assert!(!store.has_soup("people").unwrap());
        assert!(!store.engine().table_exists("TABLE_1").unwrap());
        assert!(!store.engine().table_exists("TABLE_1_fts").unwrap());
        store.drop_soup("people").unwrap();

        // Table names are never reused.
        store
            .register_soup("people", &[IndexSpec::new("name", IndexType::String)])
            .unwrap();
        assert_eq!(store.get_soup_table_name("people").unwrap(), "TABLE_3");

        store.drop_all_soups().unwrap();
        assert!(store.get_all_soup_names().unwrap().is_empty());
    }

    #[test]
    fn reindex_recomputes_selected_columns() {
        let store = people();
        let ids = seed(&store);
        let table = store.get_soup_table_name("people").unwrap();
        store
            .engine()
            .execute(&format!("UPDATE {table} SET TABLE_1_1 = NULL"), &[])
            .unwrap();
        let adults = QuerySpec::range("people", "age", Some("18"), None).build();
        assert_eq!(store.count_query(&adults).unwrap(), 0);

        assert_eq!(store.reindex_soup("people", &["age", "nope"]).unwrap(), ids.len());
        assert_eq!(store.count_query(&adults).unwrap(), 2);
        assert_eq!(store.reindex_soup("people", &["nope"]).unwrap(), 0);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SmartStore::open(&path).unwrap();
            store
                .register_soup("notes", &[IndexSpec::new("title", IndexType::String)])
                .unwrap();
            store.create("notes", json!({"title": "hello"})).unwrap();
        }
        let store = SmartStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let spec = QuerySpec::exact("notes", "title", "hello").build();
        assert_eq!(store.count_query(&spec).unwrap(), 1);
        let next = store.create("notes", json!({"title": "again"})).unwrap();
        assert_eq!(next[SOUP_ENTRY_ID], 2);
    }

    #[test]
    fn explain_plan_capture() {
        let store = people();
        seed(&store);
        assert!(store.last_explain_query_plan().is_none());
        store.set_capture_explain_query_plan(true);
        let spec = QuerySpec::exact("people", "name", "ann").build();
        store.query(&spec, 0).unwrap();
        let plan = store.last_explain_query_plan().unwrap();
        assert!(plan["sql"].as_str().unwrap().contains("LIMIT 0,10"));
        assert_eq!(plan["args"], json!(["ann"]));
        assert!(!plan["rows"].as_array().unwrap().is_empty());
    }
}
