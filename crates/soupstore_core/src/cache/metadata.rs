//! Per-connection cache of soup metadata and compiled statements.

use super::bounded::{BoundedCache, Eviction};
use super::statement::{CompiledStatement, RowInserter};
use crate::index::{has_full_text, IndexSpec};
use crate::stats::CacheStats;
use crate::types::fts_table_name;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default capacity of each cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Proof that a storage read started before any later invalidation.
///
/// Taken with [`MetadataCache::fill_token`] before reading metadata from
/// storage and handed back when caching the result. If the soup was
/// invalidated in between, the fill is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillToken(u64);

/// Bounded caches of soup metadata and engine statements.
///
/// The cache never reads storage: callers look up, fetch on a miss, then
/// populate. Two threads missing on the same key may both populate; the
/// last write wins and both writes carry the same facts.
///
/// Statement entries are shared as `Arc`s. Once the cache drops its
/// reference (eviction, invalidation, reset) the handle is released as soon
/// as the last in-flight user finishes with it.
pub struct MetadataCache {
    exists: Mutex<BoundedCache<String, bool>>,
    table_names: Mutex<BoundedCache<String, String>>,
    index_specs: Mutex<BoundedCache<String, Arc<[IndexSpec]>>>,
    has_fts: Mutex<BoundedCache<String, bool>>,

    next_id_statements: Mutex<BoundedCache<String, Arc<CompiledStatement>>>,
    inserters: Mutex<BoundedCache<String, Arc<RowInserter>>>,
    count_statements: Mutex<BoundedCache<String, Arc<CompiledStatement>>>,

    generation: AtomicU64,
    stats: Arc<CacheStats>,
}

fn counted<V: 'static>(capacity: usize, stats: &Arc<CacheStats>, name: &'static str) -> Mutex<BoundedCache<String, V>> {
    let stats = Arc::clone(stats);
    Mutex::new(
        BoundedCache::new(capacity).with_eviction_hook(move |key: &String, _: &V, cause| {
            if cause != Eviction::Replaced {
                stats.record_eviction();
            }
            tracing::trace!(cache = name, key = %key, ?cause, "cache entry evicted");
        }),
    )
}

impl MetadataCache {
    /// Creates a cache whose maps each hold `capacity` entries.
    pub fn new(capacity: usize, stats: Arc<CacheStats>) -> Self {
        Self {
            exists: counted(capacity, &stats, "exists"),
            table_names: counted(capacity, &stats, "table_names"),
            index_specs: counted(capacity, &stats, "index_specs"),
            has_fts: counted(capacity, &stats, "has_fts"),
            next_id_statements: counted(capacity, &stats, "next_id"),
            inserters: counted(capacity, &stats, "inserters"),
            count_statements: counted(capacity, &stats, "count"),
            generation: AtomicU64::new(0),
            stats,
        }
    }

    /// Returns the shared statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Takes a token to present when caching facts read from storage.
    #[must_use]
    pub fn fill_token(&self) -> FillToken {
        FillToken(self.generation.load(Ordering::Acquire))
    }

    fn is_current(&self, token: FillToken) -> bool {
        self.generation.load(Ordering::Acquire) == token.0
    }

    fn lookup<V: Clone>(&self, map: &Mutex<BoundedCache<String, V>>, key: &str) -> Option<V> {
        let found = map.lock().get(&key.to_string()).cloned();
        self.stats.record_lookup(found.is_some());
        found
    }

    fn fill<V>(&self, map: &Mutex<BoundedCache<String, V>>, key: &str, value: V, token: FillToken) -> bool {
        let mut guard = map.lock();
        // Checked under the map lock: an invalidation bumps the generation
        // before it takes this lock to remove the key.
        if !self.is_current(token) {
            tracing::debug!(key, "discarding stale cache fill");
            return false;
        }
        guard.put(key.to_string(), value);
        true
    }

    // === Soup facts ===

    /// Returns the cached existence flag for a soup.
    pub fn has_soup(&self, soup: &str) -> Option<bool> {
        self.lookup(&self.exists, soup)
    }

    /// Caches the existence flag for a soup.
    pub fn cache_has_soup(&self, soup: &str, exists: bool, token: FillToken) -> bool {
        self.fill(&self.exists, soup, exists, token)
    }

    /// Returns the cached backing table name of a soup.
    pub fn table_name(&self, soup: &str) -> Option<String> {
        self.lookup(&self.table_names, soup)
    }

    /// Caches the backing table name of a soup.
    pub fn cache_table_name(&self, soup: &str, table: &str, token: FillToken) -> bool {
        self.fill(&self.table_names, soup, table.to_string(), token)
    }

    /// Returns the cached index specs of a soup.
    pub fn index_specs(&self, soup: &str) -> Option<Arc<[IndexSpec]>> {
        self.lookup(&self.index_specs, soup)
    }

    /// Caches the index specs of a soup, along with its full-text flag.
    pub fn cache_index_specs(&self, soup: &str, specs: Arc<[IndexSpec]>, token: FillToken) -> bool {
        let fts = has_full_text(&specs);
        self.fill(&self.index_specs, soup, specs, token) && self.fill(&self.has_fts, soup, fts, token)
    }

    /// Returns the cached full-text flag of a soup.
    pub fn has_full_text(&self, soup: &str) -> Option<bool> {
        self.lookup(&self.has_fts, soup)
    }

    // === Compiled statements ===

    /// Returns the cached next-id statement of a table.
    pub fn next_id_statement(&self, table: &str) -> Option<Arc<CompiledStatement>> {
        self.next_id_statements.lock().get(&table.to_string()).cloned()
    }

    /// Caches a next-id statement and returns the shared handle.
    pub fn cache_next_id_statement(&self, table: &str, statement: CompiledStatement) -> Arc<CompiledStatement> {
        let statement = Arc::new(statement);
        self.next_id_statements
            .lock()
            .put(table.to_string(), Arc::clone(&statement));
        statement
    }

    /// Returns the cached inserter of a table.
    pub fn inserter(&self, table: &str) -> Option<Arc<RowInserter>> {
        self.inserters.lock().get(&table.to_string()).cloned()
    }

    /// Caches an inserter under its table and returns the shared handle.
    ///
    /// An inserter already cached for the table is replaced and released.
    pub fn cache_inserter(&self, inserter: RowInserter) -> Arc<RowInserter> {
        let inserter = Arc::new(inserter);
        let table = inserter.table().to_string();
        self.inserters.lock().put(table, Arc::clone(&inserter));
        inserter
    }

    /// Returns the cached statement for a count query.
    pub fn count_statement(&self, sql: &str) -> Option<Arc<CompiledStatement>> {
        self.count_statements.lock().get(&sql.to_string()).cloned()
    }

    /// Caches a count statement keyed by its SQL and returns the shared handle.
    pub fn cache_count_statement(&self, statement: CompiledStatement) -> Arc<CompiledStatement> {
        let statement = Arc::new(statement);
        let sql = statement.sql().to_string();
        self.count_statements.lock().put(sql, Arc::clone(&statement));
        statement
    }

    /// Returns the number of statement handles the cache holds.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.next_id_statements.lock().len() + self.inserters.lock().len() + self.count_statements.lock().len()
    }

    // === Invalidation ===

    /// Forgets everything cached about a soup.
    ///
    /// If its table name was cached, every statement keyed by that table or
    /// whose SQL mentions it is evicted and released as well.
    pub fn invalidate(&self, soup: &str) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.stats.record_invalidation();

        let table = self.table_names.lock().remove(&soup.to_string());
        self.exists.lock().remove(&soup.to_string());
        self.index_specs.lock().remove(&soup.to_string());
        self.has_fts.lock().remove(&soup.to_string());

        if let Some(table) = table {
            self.invalidate_table(&table);
        }
        tracing::debug!(soup, "invalidated soup metadata");
    }

    /// Evicts every statement keyed by `table` or whose SQL mentions it or
    /// its full-text table as a whole identifier.
    pub fn invalidate_table(&self, table: &str) {
        let fts = fts_table_name(table);
        let inserter = self.inserters.lock().remove(&table.to_string());
        let fts_inserter = self.inserters.lock().remove(&fts);
        let next_id = self.next_id_statements.lock().remove(&table.to_string());
        let counts = self
            .count_statements
            .lock()
            .retain(|sql, _| !mentions_table(sql, table, &fts));
        tracing::debug!(
            table,
            inserters = usize::from(inserter.is_some()) + usize::from(fts_inserter.is_some()),
            next_id = next_id.is_some(),
            counts,
            "released table statements"
        );
    }

    /// Evicts every entry of every cache, releasing all statements.
    pub fn reset_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.exists.lock().clear();
        self.table_names.lock().clear();
        self.index_specs.lock().clear();
        self.has_fts.lock().clear();
        self.next_id_statements.lock().clear();
        self.inserters.lock().clear();
        self.count_statements.lock().clear();
        tracing::debug!("cleared metadata cache");
    }
}

/// True if `sql` names `table` or `fts` as a whole identifier.
fn mentions_table(sql: &str, table: &str, fts: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word == table || word == fts)
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, Arc::new(CacheStats::new()))
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("table_names", &self.table_names.lock().len())
            .field("statements", &self.statement_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexType;
    use soupstore_storage::{SqliteEngine, StorageEngine};

    fn engine() -> Arc<SqliteEngine> {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine
            .execute_batch(
                "CREATE TABLE TABLE_1 (id INTEGER PRIMARY KEY, soup TEXT);
                 CREATE TABLE TABLE_2 (id INTEGER PRIMARY KEY, soup TEXT);",
            )
            .unwrap();
        Arc::new(engine)
    }

    fn specs() -> Arc<[IndexSpec]> {
        vec![
            IndexSpec::with_column("name", IndexType::String, "TABLE_1_0"),
            IndexSpec::with_column("bio", IndexType::FullText, "TABLE_1_1"),
        ]
        .into()
    }

    #[test]
    fn lookups_count_hits_and_misses() {
        let cache = MetadataCache::default();
        assert_eq!(cache.table_name("people"), None);

        let token = cache.fill_token();
        assert!(cache.cache_table_name("people", "TABLE_1", token));
        assert!(cache.cache_index_specs("people", specs(), token));

        assert_eq!(cache.table_name("people").as_deref(), Some("TABLE_1"));
        assert_eq!(cache.has_full_text("people"), Some(true));
        assert_eq!(cache.index_specs("people").unwrap().len(), 2);

        let stats = cache.stats().snapshot();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 3);
    }

    #[test]
    fn stale_fill_is_discarded() {
        let cache = MetadataCache::default();
        let token = cache.fill_token();
        cache.invalidate("people");
        assert!(!cache.cache_table_name("people", "TABLE_1", token));
        assert_eq!(cache.table_name("people"), None);
    }

    #[test]
    fn invalidate_releases_table_statements() {
        let engine = engine();
        let stats = Arc::new(CacheStats::new());
        let cache = MetadataCache::new(16, stats.clone());
        let prepare = |sql: &str| CompiledStatement::prepare(engine.clone(), sql, stats.clone()).unwrap();

        cache.cache_table_name("people", "TABLE_1", cache.fill_token());
        cache.cache_next_id_statement("TABLE_1", prepare("SELECT 1"));
        cache.cache_count_statement(prepare("SELECT count(*) FROM TABLE_1"));
        cache.cache_count_statement(prepare("SELECT count(*) FROM TABLE_2"));
        assert_eq!(engine.live_statements(), 3);

        cache.invalidate("people");

        assert_eq!(engine.live_statements(), 1);
        assert!(cache.count_statement("SELECT count(*) FROM TABLE_2").is_some());
        assert!(cache.next_id_statement("TABLE_1").is_none());
        assert_eq!(stats.statements_released(), 2);
        assert_eq!(stats.release_failures(), 0);
    }

    #[test]
    fn invalidate_spares_tables_sharing_a_prefix() {
        let engine = engine();
        engine
            .execute_batch(
                "CREATE TABLE TABLE_10 (id INTEGER PRIMARY KEY, soup TEXT);
                 CREATE VIRTUAL TABLE TABLE_1_fts USING fts5(TABLE_1_1);",
            )
            .unwrap();
        let stats = Arc::new(CacheStats::new());
        let cache = MetadataCache::new(16, stats.clone());
        let prepare = |sql: &str| CompiledStatement::prepare(engine.clone(), sql, stats.clone()).unwrap();

        cache.cache_count_statement(prepare("SELECT count(*) FROM TABLE_1"));
        cache.cache_count_statement(prepare("SELECT count(*) FROM TABLE_1_fts"));
        cache.cache_count_statement(prepare("SELECT count(*) FROM TABLE_10"));

        cache.invalidate_table("TABLE_1");

        assert!(cache.count_statement("SELECT count(*) FROM TABLE_1").is_none());
        assert!(cache.count_statement("SELECT count(*) FROM TABLE_1_fts").is_none());
        assert!(cache.count_statement("SELECT count(*) FROM TABLE_10").is_some());
        assert_eq!(engine.live_statements(), 1);
        assert_eq!(stats.statements_released(), 2);
    }

    #[test]
    fn in_flight_statement_outlives_eviction() {
        let engine = engine();
        let stats = Arc::new(CacheStats::new());
        let cache = MetadataCache::new(16, stats.clone());
        let stmt = CompiledStatement::prepare(engine.clone(), "SELECT count(*) FROM TABLE_1", stats.clone()).unwrap();
        let held = cache.cache_count_statement(stmt);

        cache.reset_all();
        assert_eq!(engine.live_statements(), 1);
        assert_eq!(held.query_long(&[]).unwrap(), Some(0));

        drop(held);
        assert_eq!(engine.live_statements(), 0);
        assert_eq!(stats.statements_released(), 1);
    }

    #[test]
    fn capacity_eviction_releases() {
        let engine = engine();
        let stats = Arc::new(CacheStats::new());
        let cache = MetadataCache::new(1, stats.clone());
        for sql in ["SELECT count(*) FROM TABLE_1", "SELECT count(*) FROM TABLE_2"] {
            cache.cache_count_statement(CompiledStatement::prepare(engine.clone(), sql, stats.clone()).unwrap());
        }
        assert_eq!(engine.live_statements(), 1);
        assert_eq!(stats.evictions(), 1);
        // The first handle was released by the eviction.
        assert!(engine.release(soupstore_storage::StatementId(1)).is_err());
    }
}
