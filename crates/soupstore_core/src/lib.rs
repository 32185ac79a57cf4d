//! # SoupStore Core
//!
//! Embedded JSON document store over a relational engine.
//!
//! This crate provides:
//! - Soups: named collections of JSON documents, each backed by a table
//! - Index specs projecting JSON paths into typed columns or full-text search
//! - Query specs deriving selection, count and id-only smart SQL
//! - Smart SQL translation from `{soup}` / `{soup:path}` references
//! - Bounded caches of soup metadata and compiled statements
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use soupstore_core::{IndexSpec, IndexType, QuerySpec, SmartStore};
//!
//! let store = SmartStore::open_in_memory().unwrap();
//! store
//!     .register_soup("people", &[IndexSpec::new("age", IndexType::Integer)])
//!     .unwrap();
//! store.create("people", json!({"name": "ann", "age": 31})).unwrap();
//!
//! let adults = QuerySpec::range("people", "age", Some("18"), None).build();
//! assert_eq!(store.count_query(&adults).unwrap(), 1);
//!
//! let sql = store.translate("SELECT {people:name} FROM {people}").unwrap();
//! assert_eq!(sql, "SELECT json_extract(TABLE_1.soup, '$.name') FROM TABLE_1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod config;
mod error;
mod helper;
pub mod index;
mod project;
pub mod query;
mod schema;
pub mod smart_sql;
mod stats;
mod store;
pub mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use helper::{DbHelper, EXPLAIN_ARGS, EXPLAIN_ROWS, EXPLAIN_SQL};
pub use index::{has_full_text, IndexSpec, IndexType};
pub use project::project;
pub use query::{
    qualify_match_key, Order, QuerySpec, QuerySpecBuilder, QuerySpecFactory, QuerySpecParser, QueryType,
    DEFAULT_PAGE_SIZE,
};
pub use schema::{SoupConfig, StoreConfig};
pub use smart_sql::translate;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::SmartStore;
pub use types::SoupId;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export storage types callers need to plug in an engine.
pub use soupstore_storage::{RowSet, SqlValue, SqliteEngine, StatementId, StorageEngine, StorageError};
