//! # SoupStore Storage
//!
//! Storage engine trait and implementations for SoupStore.
//!
//! This crate provides the lowest-level SQL abstraction for SoupStore.
//! Engines are **SQL executors** - they do not know what a soup, an index
//! spec, or a smart SQL query is.
//!
//! ## Design Principles
//!
//! - Engines run SQL text with positional arguments and hand back rows
//! - Prepared statements are explicit handles that must be released
//! - Transactions hold the connection for their whole body
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Engines
//!
//! - [`SqliteEngine`] - SQLite (bundled) with FTS5 and JSON functions
//!
//! ## Example
//!
//! ```rust
//! use soupstore_storage::{SqliteEngine, SqlValue, StorageEngine};
//!
//! let engine = SqliteEngine::open_in_memory().unwrap();
//! let stmt = engine.prepare("SELECT ? + 1").unwrap();
//! let rows = engine.query_prepared(stmt, &[SqlValue::Integer(41)]).unwrap();
//! assert_eq!(rows.first_value(), Some(&SqlValue::Integer(42)));
//! engine.release(stmt).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod sqlite;
mod value;

pub use engine::{StatementId, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use sqlite::{SqliteEngine, DEFAULT_STATEMENT_CACHE_CAPACITY};
pub use value::{RowSet, SqlValue};
