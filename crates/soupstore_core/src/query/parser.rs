//! Parsing declarative query specs.

use super::spec::{QuerySpec, QuerySpecJson, QueryType, DEFAULT_PAGE_SIZE};
use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A host-provided constructor for a custom `queryType`.
///
/// Receives the soup name passed to [`QuerySpecParser::parse`] (empty when
/// none was given) and the whole JSON object.
pub type QuerySpecFactory = Box<dyn Fn(&str, &Value) -> CoreResult<QuerySpec> + Send + Sync>;

/// Turns declarative JSON into [`QuerySpec`]s.
///
/// The five built-in kinds are parsed directly. Any other `queryType` is
/// looked up among the registered factories.
///
/// ```
/// use serde_json::json;
/// use soupstore_core::{QuerySpec, QuerySpecParser};
///
/// let mut parser = QuerySpecParser::new();
/// parser.register("everything", |soup, _| Ok(QuerySpec::all(soup).build()));
///
/// let spec = parser.parse(Some("people"), &json!({"queryType": "everything"})).unwrap();
/// assert_eq!(spec.smart_sql(), "SELECT {people:_soup} FROM {people} ");
/// ```
pub struct QuerySpecParser {
    factories: HashMap<String, QuerySpecFactory>,
    default_page_size: usize,
}

impl QuerySpecParser {
    /// Creates a parser with no custom factories.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a parser that uses `page_size` when the JSON has none.
    #[must_use]
    pub fn with_default_page_size(page_size: usize) -> Self {
        Self {
            factories: HashMap::new(),
            default_page_size: page_size,
        }
    }

    /// Registers a factory for `query_type`, replacing any earlier one.
    ///
    /// Built-in kinds always take precedence.
    pub fn register<F>(&mut self, query_type: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Value) -> CoreResult<QuerySpec> + Send + Sync + 'static,
    {
        self.factories.insert(query_type.into(), Box::new(factory));
    }

    /// Returns true if a factory is registered for `query_type`.
    #[must_use]
    pub fn has_factory(&self, query_type: &str) -> bool {
        self.factories.contains_key(query_type)
    }

    /// Parses one query spec.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuerySpec`] if the JSON is not an object,
    /// lacks `queryType`, names an unknown type, or misses a required key.
    pub fn parse(&self, soup_name: Option<&str>, json: &Value) -> CoreResult<QuerySpec> {
        let type_name = json
            .get("queryType")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_query_spec("missing queryType"))?;

        match type_name.parse::<QueryType>() {
            Ok(query_type) => {
                let wire: QuerySpecJson = serde_json::from_value(json.clone())
                    .map_err(|e| CoreError::invalid_query_spec(e.to_string()))?;
                wire.into_spec(query_type, soup_name, self.default_page_size)
            }
            Err(_) => {
                let factory = self.factories.get(type_name).ok_or_else(|| {
                    CoreError::invalid_query_spec(format!("unknown query type {type_name}"))
                })?;
                factory(soup_name.unwrap_or_default(), json)
            }
        }
    }
}

impl Default for QuerySpecParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QuerySpecParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("QuerySpecParser")
            .field("factories", &names)
            .field("default_page_size", &self.default_page_size)
            .finish()
    }
}
