//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use crate::recording::RecordingEngine;
use soupstore_core::{Config, SmartStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: SmartStore,
    /// Recording engine under the store, if any.
    pub engine: Option<Arc<RecordingEngine>>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: SmartStore::open_in_memory().expect("Failed to open in-memory store"),
            engine: None,
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = SmartStore::open(&temp_dir.path().join("test.soupstore")).expect("Failed to open file store");
        Self {
            store,
            engine: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a store over a [`RecordingEngine`].
    pub fn recording() -> Self {
        Self::recording_with_config(Config::default())
    }

    /// Creates a store over a [`RecordingEngine`] with a custom config.
    pub fn recording_with_config(config: Config) -> Self {
        let engine = Arc::new(RecordingEngine::new());
        let store = SmartStore::with_engine(engine.clone(), config).expect("Failed to open recording store");
        Self {
            store,
            engine: Some(engine),
            _temp_dir: None,
        }
    }

    /// Returns the recording engine.
    ///
    /// # Panics
    ///
    /// Panics if the store was not built with [`TestStore::recording`].
    pub fn recorder(&self) -> &RecordingEngine {
        self.engine.as_deref().expect("Store has no recording engine")
    }

    /// Returns the store path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.store.path().map(PathBuf::from)
    }
}

impl std::ops::Deref for TestStore {
    type Target = SmartStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use soupstore_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     assert!(store.get_all_soup_names().unwrap().is_empty());
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&SmartStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&SmartStore, &std::path::Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;
    use soupstore_core::{IndexSpec, IndexType};

    /// Name of the soup registered by [`people_store`].
    pub const PEOPLE: &str = "people";

    /// Index specs of the people soup: one of every type.
    pub fn people_specs() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new("name", IndexType::String),
            IndexSpec::new("age", IndexType::Integer),
            IndexSpec::new("bio", IndexType::FullText),
            IndexSpec::new("address.city", IndexType::Json),
            IndexSpec::new("score", IndexType::Floating),
        ]
    }

    /// Registers the people soup on `store`.
    pub fn register_people(store: &SmartStore) {
        store
            .register_soup(PEOPLE, &people_specs())
            .expect("Failed to register people soup");
    }

    /// Creates an in-memory store with an empty people soup.
    pub fn people_store() -> TestStore {
        let test_store = TestStore::memory();
        register_people(&test_store);
        test_store
    }

    /// Creates a store whose people soup holds `count` entries.
    ///
    /// Entry `i` is named `person<i>`, is `i` years old, and lives in
    /// `city<i % 3>`.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = people_store();
        for i in 0..count {
            test_store
                .create(
                    PEOPLE,
                    json!({
                        "name": format!("person{i}"),
                        "age": i,
                        "bio": if i % 2 == 0 { "likes rust" } else { "likes sql" },
                        "address": {"city": format!("city{}", i % 3)},
                        "score": i as f64 / 2.0,
                    }),
                )
                .expect("Failed to create entry");
        }
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::scenarios::*;
    use super::*;
    use soupstore_core::QuerySpec;

    #[test]
    fn memory_store_has_no_path() {
        let store = TestStore::memory();
        assert!(store.path().is_none());
    }

    #[test]
    fn file_store_has_path() {
        with_file_store(|store, path| {
            assert_eq!(store.path(), Some(path));
            assert!(path.exists());
        });
    }

    #[test]
    fn populated_store_has_entries() {
        let store = populated_store(7);
        let all = QuerySpec::all(PEOPLE).build();
        assert_eq!(store.count_query(&all).unwrap(), 7);
    }

    #[test]
    fn recording_store_exposes_engine() {
        let store = TestStore::recording();
        register_people(&store);
        store.create(PEOPLE, serde_json::json!({"name": "ann"})).unwrap();
        assert!(store.recorder().prepared() > 0);
    }
}
