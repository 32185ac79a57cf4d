//! Metadata and compiled-statement caching.
//!
//! - [`BoundedCache`] - fixed-capacity LRU map with an eviction hook
//! - [`CompiledStatement`] / [`RowInserter`] - engine statements released on drop
//! - [`MetadataCache`] - per-connection soup facts and statement caches

mod bounded;
mod metadata;
mod statement;

pub use bounded::{BoundedCache, Eviction};
pub use metadata::{FillToken, MetadataCache, DEFAULT_CACHE_CAPACITY};
pub use statement::{CompiledStatement, RowInserter};
