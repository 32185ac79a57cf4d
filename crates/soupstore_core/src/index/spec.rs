//! Index specifications.

use crate::error::{CoreError, CoreResult};
use crate::types::json_extract_expression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Storage type of an indexed projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Text column.
    String,
    /// Integer column.
    Integer,
    /// Floating point column.
    Floating,
    /// No column; an expression index over `json_extract` of the document.
    #[serde(rename = "json1")]
    Json,
    /// Text column mirrored into the soup's full-text table.
    FullText,
}

impl IndexType {
    /// Returns the SQL column type, or `None` for JSON projections which
    /// have no backing column.
    #[must_use]
    pub const fn column_type(self) -> Option<&'static str> {
        match self {
            Self::String | Self::FullText => Some("TEXT"),
            Self::Integer => Some("INTEGER"),
            Self::Floating => Some("REAL"),
            Self::Json => None,
        }
    }

    /// Returns the name persisted in the index map table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Floating => "floating",
            Self::Json => "json1",
            Self::FullText => "full_text",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "floating" => Ok(Self::Floating),
            "json1" => Ok(Self::Json),
            "full_text" => Ok(Self::FullText),
            other => Err(CoreError::invalid_index_specs(format!(
                "unknown index type {other}"
            ))),
        }
    }
}

/// One declared projection of a soup: a JSON path, a storage type, and the
/// column it lands in.
///
/// The column name is assigned when the soup is registered and stays
/// stable for the life of the soup. Specs built by callers carry no column
/// name until then.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Dotted JSON path of the projected field.
    pub path: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub index_type: IndexType,
    /// Generated column name (or JSON-extraction expression).
    #[serde(
        rename = "columnName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub column_name: Option<String>,
}

impl IndexSpec {
    /// Creates a spec not yet bound to a column.
    pub fn new(path: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            path: path.into(),
            index_type,
            column_name: None,
        }
    }

    /// Creates a spec bound to a column.
    pub fn with_column(
        path: impl Into<String>,
        index_type: IndexType,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            index_type,
            column_name: Some(column_name.into()),
        }
    }

    /// Returns the column name, or the empty string if unassigned.
    #[must_use]
    pub fn column(&self) -> &str {
        self.column_name.as_deref().unwrap_or_default()
    }

    /// Returns true for full-text specs.
    #[must_use]
    pub fn is_full_text(&self) -> bool {
        self.index_type == IndexType::FullText
    }

    /// Parses the declarative form: a JSON array of `{path, type}` objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe index specs.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Vec<Self>> {
        Ok(serde_json::from_value(json.clone())?)
    }

    /// Serializes specs to their declarative form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(specs: &[Self]) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(specs)?)
    }
}

/// Returns true iff any spec is a full-text projection.
#[must_use]
pub fn has_full_text(specs: &[IndexSpec]) -> bool {
    specs.iter().any(IndexSpec::is_full_text)
}

/// Maps each spec by its path.
#[must_use]
pub fn map_for_index_specs(specs: &[IndexSpec]) -> HashMap<&str, &IndexSpec> {
    specs.iter().map(|spec| (spec.path.as_str(), spec)).collect()
}

/// Binds specs to the columns of `table`, numbering them by position.
///
/// Column `i` is named `<table>_<i>`; JSON projections get the
/// `json_extract` expression instead.
///
/// # Errors
///
/// Returns an error if the list is empty or a path is declared twice.
pub fn assign_column_names(table: &str, specs: &[IndexSpec]) -> CoreResult<Vec<IndexSpec>> {
    if specs.is_empty() {
        return Err(CoreError::invalid_index_specs("no index specs specified"));
    }
    let mut seen = std::collections::HashSet::new();
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            if spec.path.is_empty() {
                return Err(CoreError::invalid_index_specs("empty index path"));
            }
            if !seen.insert(spec.path.as_str()) {
                return Err(CoreError::invalid_index_specs(format!(
                    "path {} indexed more than once",
                    spec.path
                )));
            }
            let column = match spec.index_type {
                IndexType::Json => json_extract_expression(&spec.path),
                _ => format!("{table}_{i}"),
            };
            Ok(IndexSpec::with_column(spec.path.clone(), spec.index_type, column))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn column_types() {
        assert_eq!(IndexType::String.column_type(), Some("TEXT"));
        assert_eq!(IndexType::FullText.column_type(), Some("TEXT"));
        assert_eq!(IndexType::Integer.column_type(), Some("INTEGER"));
        assert_eq!(IndexType::Floating.column_type(), Some("REAL"));
        assert_eq!(IndexType::Json.column_type(), None);
    }

    #[test]
    fn index_type_round_trips_through_str() {
        for t in [
            IndexType::String,
            IndexType::Integer,
            IndexType::Floating,
            IndexType::Json,
            IndexType::FullText,
        ] {
            assert_eq!(t.as_str().parse::<IndexType>().unwrap(), t);
        }
        assert!("blob".parse::<IndexType>().is_err());
    }

    #[test]
    fn declarative_form_parses() {
        let specs = IndexSpec::from_json(&json!([
            {"path": "name", "type": "string"},
            {"path": "bio", "type": "full_text"},
            {"path": "address.city", "type": "json1"}
        ]))
        .unwrap();

        assert_eq!(specs.len(), 3);
        assert_eq!(specs[1].index_type, IndexType::FullText);
        assert_eq!(specs[2].index_type, IndexType::Json);
        assert!(specs.iter().all(|s| s.column_name.is_none()));
    }

    #[test]
    fn declarative_form_keeps_column_names() {
        let specs = vec![IndexSpec::with_column("name", IndexType::String, "TABLE_1_0")];
        let json = IndexSpec::to_json(&specs).unwrap();
        assert_eq!(
            json,
            json!([{"path": "name", "type": "string", "columnName": "TABLE_1_0"}])
        );
        assert_eq!(IndexSpec::from_json(&json).unwrap(), specs);
    }

    #[test]
    fn assign_column_names_by_ordinal() {
        let specs = vec![
            IndexSpec::new("name", IndexType::String),
            IndexSpec::new("city", IndexType::Json),
            IndexSpec::new("age", IndexType::Integer),
        ];
        let bound = assign_column_names("TABLE_4", &specs).unwrap();
        assert_eq!(bound[0].column(), "TABLE_4_0");
        assert_eq!(bound[1].column(), "json_extract(soup, '$.city')");
        assert_eq!(bound[2].column(), "TABLE_4_2");
    }

    #[test]
    fn assign_column_names_rejects_bad_specs() {
        assert!(assign_column_names("TABLE_1", &[]).is_err());
        let dup = vec![
            IndexSpec::new("name", IndexType::String),
            IndexSpec::new("name", IndexType::Integer),
        ];
        assert!(assign_column_names("TABLE_1", &dup).is_err());
    }

    #[test]
    fn map_by_path() {
        let specs = vec![
            IndexSpec::new("a", IndexType::String),
            IndexSpec::new("b", IndexType::Integer),
        ];
        let map = map_for_index_specs(&specs);
        assert_eq!(map["b"].index_type, IndexType::Integer);
    }

    fn index_type_strategy() -> impl Strategy<Value = IndexType> {
        prop_oneof![
            Just(IndexType::String),
            Just(IndexType::Integer),
            Just(IndexType::Floating),
            Just(IndexType::Json),
            Just(IndexType::FullText),
        ]
    }

    proptest! {
        #[test]
        fn has_full_text_iff_any_full_text(types in prop::collection::vec(index_type_strategy(), 0..8)) {
            let specs: Vec<IndexSpec> = types
                .iter()
                .enumerate()
                .map(|(i, t)| IndexSpec::new(format!("p{i}"), *t))
                .collect();
            prop_assert_eq!(
                has_full_text(&specs),
                types.contains(&IndexType::FullText)
            );
        }
    }
}
