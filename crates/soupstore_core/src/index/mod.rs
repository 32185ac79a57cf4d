//! Index specifications.
//!
//! A soup declares its secondary projections up front. Each projection maps
//! a JSON path to a typed column of the soup table:
//!
//! - `string`, `integer`, `floating`: a plain indexed column
//! - `json1`: no column, an expression index over `json_extract(soup, ...)`
//! - `full_text`: a text column mirrored into the soup's FTS5 table

mod spec;

pub use spec::{assign_column_names, has_full_text, map_for_index_specs, IndexSpec, IndexType};
