//! Cross-crate integration test helpers.
//!
//! Provides utilities for testing the store, the caches and the engine
//! together.

use crate::fixtures::{scenarios, TestStore};
use serde_json::Value;
use soupstore_core::{QuerySpec, SmartStore};
use std::collections::BTreeMap;

/// Fields the store adds to every entry.
const BOOKKEEPING: [&str; 3] = ["_soupEntryId", "_soupCreatedDate", "_soupLastModifiedDate"];

/// A test harness that mirrors every write in memory and checks the store
/// against it.
pub struct IntegrationHarness {
    /// The store under test.
    pub store: TestStore,
    soup: String,
    entries: BTreeMap<i64, Value>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory store with the people soup.
    pub fn new() -> Self {
        Self {
            store: scenarios::people_store(),
            soup: scenarios::PEOPLE.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Creates an entry and tracks it.
    pub fn create(&mut self, doc: Value) -> i64 {
        let stored = self.store.create(&self.soup, doc).expect("Failed to create entry");
        let id = stored["_soupEntryId"].as_i64().expect("Entry id missing");
        self.entries.insert(id, stored);
        id
    }

    /// Updates a tracked entry.
    pub fn update(&mut self, id: i64, doc: Value) {
        let stored = self.store.update(&self.soup, doc, id).expect("Failed to update entry");
        self.entries.insert(id, stored);
    }

    /// Deletes a tracked entry.
    pub fn delete(&mut self, id: i64) {
        self.store.delete(&self.soup, &[id]).expect("Failed to delete entry");
        self.entries.remove(&id);
    }

    /// Checks that the store holds exactly the tracked entries.
    pub fn verify_all(&self) {
        let ids: Vec<i64> = self.entries.keys().copied().collect();
        let stored = self.store.retrieve(&self.soup, &ids).expect("Failed to retrieve entries");
        assert_eq!(stored.len(), ids.len(), "retrieved entry count");
        for doc in &stored {
            let id = doc["_soupEntryId"].as_i64().expect("Entry id missing");
            assert_eq!(Some(doc), self.entries.get(&id), "entry {id} differs");
        }
        let all = QuerySpec::all(&self.soup).build();
        let count = self.store.count_query(&all).expect("Failed to count entries");
        assert_eq!(count, self.entries.len() as i64, "soup size");
    }

    /// Returns the number of tracked entries.
    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `doc` without the fields the store adds.
pub fn strip_bookkeeping(doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let Some(fields) = doc.as_object_mut() {
        for field in BOOKKEEPING {
            fields.remove(field);
        }
    }
    doc
}

/// Common integration test patterns.
pub mod patterns {
    use super::*;

    /// Stores `doc` and checks it comes back unchanged apart from the
    /// bookkeeping fields.
    pub fn test_create_retrieve(store: &SmartStore, soup: &str, doc: Value) {
        let stored = store.create(soup, doc.clone()).expect("Failed to create");
        let id = stored["_soupEntryId"].as_i64().expect("Entry id missing");
        let retrieved = store.retrieve(soup, &[id]).expect("Failed to retrieve");
        assert_eq!(retrieved.len(), 1);
        assert_eq!(strip_bookkeeping(&retrieved[0]), doc);
    }

    /// Checks that the count, id and page variants of `spec` agree.
    pub fn test_query_variants_agree(store: &SmartStore, spec: &QuerySpec) {
        let count = store.count_query(spec).expect("Failed to count");
        let ids = store.query_ids(spec).expect("Failed to query ids");
        assert_eq!(ids.len() as i64, count, "ids vs count");

        let mut paged = 0;
        let mut page = 0;
        loop {
            let rows = store.query(spec, page).expect("Failed to query page");
            if rows.is_empty() {
                break;
            }
            assert!(rows.len() <= spec.page_size_value());
            paged += rows.len();
            page += 1;
        }
        assert_eq!(paged as i64, count, "pages vs count");
    }

    /// Checks that a failing write leaves the soup untouched.
    pub fn test_failed_write_rolls_back(store: &SmartStore, soup: &str) {
        let all = QuerySpec::all(soup).build();
        let before = store.count_query(&all).expect("Failed to count");
        assert!(store.update(soup, serde_json::json!({"name": "ghost"}), i64::MAX).is_err());
        assert!(store.create(soup, serde_json::json!("not an object")).is_err());
        assert_eq!(store.count_query(&all).expect("Failed to count"), before);
    }
}

#[cfg(test)]
mod tests {
    use super::patterns::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn harness_tracks_writes() {
        let mut harness = IntegrationHarness::new();
        let a = harness.create(json!({"name": "ann", "age": 3}));
        let b = harness.create(json!({"name": "bob", "age": 4}));
        harness.update(a, json!({"name": "ann", "age": 5}));
        harness.delete(b);
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 1);
    }

    #[test]
    fn create_retrieve_pattern() {
        let store = scenarios::people_store();
        test_create_retrieve(&store, scenarios::PEOPLE, json!({"name": "cid", "tags": ["a", "b"]}));
    }

    #[test]
    fn query_variants_pattern() {
        let store = scenarios::populated_store(23);
        let spec = QuerySpec::range(scenarios::PEOPLE, "age", Some("5"), None).page_size(4).build();
        test_query_variants_agree(&store, &spec);
    }

    #[test]
    fn rollback_pattern() {
        let store = scenarios::populated_store(3);
        test_failed_write_rolls_back(&store, scenarios::PEOPLE);
    }
}
