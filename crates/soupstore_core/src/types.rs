//! Core type definitions and persisted layout names.

use std::fmt;

/// Table mapping soup names to their numeric ids.
pub const SOUP_ATTRS_TABLE: &str = "soup_attrs";
/// Table recording every index spec of every soup.
pub const SOUP_INDEX_MAP_TABLE: &str = "soup_index_map";

/// Soup name column of the metadata tables.
pub const SOUP_NAME_COL: &str = "soupName";
/// Path column of the index map table.
pub const PATH_COL: &str = "path";
/// Column name column of the index map table.
pub const COLUMN_NAME_COL: &str = "columnName";
/// Column type column of the index map table.
pub const COLUMN_TYPE_COL: &str = "columnType";

/// Primary key column of every soup table.
pub const ID_COL: &str = "id";
/// Whole-document column of every soup table.
pub const SOUP_COL: &str = "soup";
/// Creation timestamp column.
pub const CREATED_COL: &str = "created";
/// Last modification timestamp column.
pub const LAST_MODIFIED_COL: &str = "lastModified";
/// Implicit row id column of FTS tables.
pub const ROWID_COL: &str = "rowid";
/// Suffix of the full-text virtual table of a soup.
pub const FTS_SUFFIX: &str = "_fts";

/// Special path designating the whole document.
pub const SOUP_PATH: &str = "_soup";
/// Special path (and document field) holding the entry id.
pub const SOUP_ENTRY_ID: &str = "_soupEntryId";
/// Special path (and document field) holding the creation time.
pub const SOUP_CREATED_DATE: &str = "_soupCreatedDate";
/// Special path (and document field) holding the last modification time.
pub const SOUP_LAST_MODIFIED_DATE: &str = "_soupLastModifiedDate";

/// Identifier of a soup in the `soup_attrs` table.
///
/// Soup ids come from an `AUTOINCREMENT` key, so they are never reused
/// after a soup is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoupId(pub i64);

impl SoupId {
    /// Creates a new soup id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the backing table name, `TABLE_<id>`.
    #[must_use]
    pub fn table_name(self) -> String {
        format!("TABLE_{}", self.0)
    }
}

impl fmt::Display for SoupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "soup:{}", self.0)
    }
}

/// Returns the full-text table name for a soup table.
#[must_use]
pub fn fts_table_name(table: &str) -> String {
    format!("{table}{FTS_SUFFIX}")
}

/// Returns the JSON-extraction expression reading `path` out of the
/// whole-document column.
#[must_use]
pub fn json_extract_expression(path: &str) -> String {
    format!("json_extract({SOUP_COL}, '$.{path}')")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soup_id_table_name() {
        assert_eq!(SoupId::new(3).table_name(), "TABLE_3");
        assert_eq!(format!("{}", SoupId::new(3)), "soup:3");
    }

    #[test]
    fn derived_names() {
        assert_eq!(fts_table_name("TABLE_3"), "TABLE_3_fts");
        assert_eq!(json_extract_expression("a.b"), "json_extract(soup, '$.a.b')");
    }
}
