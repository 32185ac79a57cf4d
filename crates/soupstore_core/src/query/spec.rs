//! Query specifications.
//!
//! A [`QuerySpec`] describes one document query and carries three derived
//! smart SQL strings: the selection, its `count(*)`, and its id-only form.
//! Structured kinds derive them from their fields when built; the smart
//! kind wraps the caller's SQL. References such as `{soup:path}` stay in
//! the text and are resolved by [`crate::smart_sql::translate`] when the
//! query runs.

use crate::error::{CoreError, CoreResult};
use crate::types::{ID_COL, ROWID_COL, FTS_SUFFIX, SOUP_ENTRY_ID, SOUP_PATH};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 10;

const SELECT: &str = "SELECT ";
const FROM: &str = "FROM ";
const WHERE: &str = "WHERE ";
const ORDER_BY: &str = "ORDER BY ";

lazy_static! {
    static ref MATCH_TOKEN: Regex = Regex::new(r"[^()\s]+").expect("match token pattern");
}

/// Kind of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// `field = ?`
    Exact,
    /// `field >= ? AND field <= ?`, either side optional.
    Range,
    /// `field LIKE ?`
    Like,
    /// Full-text `MATCH` against the soup's FTS table.
    Match,
    /// Caller-written smart SQL.
    Smart,
}

impl QueryType {
    /// Returns the serialized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Range => "range",
            Self::Like => "like",
            Self::Match => "match",
            Self::Smart => "smart",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "range" => Ok(Self::Range),
            "like" => Ok(Self::Like),
            "match" => Ok(Self::Match),
            "smart" => Ok(Self::Smart),
            other => Err(CoreError::invalid_query_spec(format!("unknown query type {other}"))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// `ASC`
    #[default]
    Ascending,
    /// `DESC`
    Descending,
}

impl Order {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// An immutable description of one document query.
///
/// Build structured queries with [`QuerySpec::exact`], [`QuerySpec::range`],
/// [`QuerySpec::like`], [`QuerySpec::match_query`] or [`QuerySpec::all`],
/// and smart queries with [`QuerySpec::smart`].
///
/// ```
/// use soupstore_core::{Order, QuerySpec};
///
/// let spec = QuerySpec::range("people", "age", Some("18"), None)
///     .order_by("name", Order::Descending)
///     .page_size(20)
///     .build();
///
/// assert_eq!(
///     spec.smart_sql(),
///     "SELECT {people:_soup} FROM {people} WHERE {people:age} >= ? ORDER BY {people:name} DESC "
/// );
/// assert_eq!(spec.args(), vec!["18".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    query_type: QueryType,
    page_size: usize,
    smart_sql: String,
    count_smart_sql: String,
    ids_smart_sql: String,

    soup_name: Option<String>,
    select_paths: Option<Vec<String>>,
    path: Option<String>,
    order_path: Option<String>,
    order: Order,

    match_key: Option<String>,
    begin_key: Option<String>,
    end_key: Option<String>,
    like_key: Option<String>,
}

/// Builder for structured query specs.
///
/// Created by the kind-specific constructors on [`QuerySpec`], which take
/// exactly the keys their kind allows.
#[derive(Debug, Clone)]
#[must_use]
pub struct QuerySpecBuilder {
    query_type: QueryType,
    soup_name: String,
    path: Option<String>,
    select_paths: Option<Vec<String>>,
    order_path: Option<String>,
    order: Order,
    page_size: usize,
    match_key: Option<String>,
    begin_key: Option<String>,
    end_key: Option<String>,
    like_key: Option<String>,
}

impl QuerySpecBuilder {
    fn new(query_type: QueryType, soup_name: &str, path: Option<&str>) -> Self {
        Self {
            query_type,
            soup_name: soup_name.to_string(),
            path: path.map(str::to_string),
            select_paths: None,
            order_path: None,
            order: Order::Ascending,
            page_size: DEFAULT_PAGE_SIZE,
            match_key: None,
            begin_key: None,
            end_key: None,
            like_key: None,
        }
    }

    /// Projects the given paths instead of whole documents.
    pub fn select_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Orders results by `path`.
    pub fn order_by(mut self, path: impl Into<String>, order: Order) -> Self {
        self.order_path = Some(path.into());
        self.order = order;
        self
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builds the spec and derives its SQL.
    #[must_use]
    pub fn build(self) -> QuerySpec {
        let mut spec = QuerySpec {
            query_type: self.query_type,
            page_size: self.page_size,
            smart_sql: String::new(),
            count_smart_sql: String::new(),
            ids_smart_sql: String::new(),
            soup_name: Some(self.soup_name),
            select_paths: self.select_paths,
            path: self.path,
            order_path: self.order_path,
            order: self.order,
            match_key: self.match_key,
            begin_key: self.begin_key,
            end_key: self.end_key,
            like_key: self.like_key,
        };
        let from = spec.compute_from_clause();
        let where_clause = spec.compute_where_clause();
        let order = spec.compute_order_clause();
        spec.smart_sql = format!("{}{from}{where_clause}{order}", spec.compute_select_clause());
        spec.count_smart_sql = format!("{SELECT}count(*) {from}{where_clause}");
        spec.ids_smart_sql = format!("{SELECT}{ID_COL} {from}{where_clause}{order}");
        spec
    }
}

impl QuerySpec {
    /// Starts an exact-match query: `path = match_key`.
    pub fn exact(soup_name: &str, path: &str, match_key: impl Into<String>) -> QuerySpecBuilder {
        let mut builder = QuerySpecBuilder::new(QueryType::Exact, soup_name, Some(path));
        builder.match_key = Some(match_key.into());
        builder
    }

    /// Starts a range query. A missing bound leaves that side open; with
    /// neither bound every row matches.
    pub fn range(
        soup_name: &str,
        path: &str,
        begin_key: Option<&str>,
        end_key: Option<&str>,
    ) -> QuerySpecBuilder {
        let mut builder = QuerySpecBuilder::new(QueryType::Range, soup_name, Some(path));
        builder.begin_key = begin_key.map(str::to_string);
        builder.end_key = end_key.map(str::to_string);
        builder
    }

    /// Starts a query returning every entry of the soup.
    pub fn all(soup_name: &str) -> QuerySpecBuilder {
        QuerySpecBuilder::new(QueryType::Range, soup_name, None)
    }

    /// Starts a `LIKE` query.
    pub fn like(soup_name: &str, path: &str, like_key: impl Into<String>) -> QuerySpecBuilder {
        let mut builder = QuerySpecBuilder::new(QueryType::Like, soup_name, Some(path));
        builder.like_key = Some(like_key.into());
        builder
    }

    /// Starts a full-text query. Without a path the whole FTS table is
    /// searched.
    pub fn match_query(soup_name: &str, path: Option<&str>, match_key: impl Into<String>) -> QuerySpecBuilder {
        let mut builder = QuerySpecBuilder::new(QueryType::Match, soup_name, path);
        builder.match_key = Some(match_key.into());
        builder
    }

    /// Builds a smart query over caller-written SQL.
    #[must_use]
    pub fn smart(smart_sql: impl Into<String>, page_size: usize) -> Self {
        let smart_sql = smart_sql.into();
        Self {
            query_type: QueryType::Smart,
            page_size,
            count_smart_sql: format!("{SELECT}count(*) FROM ({smart_sql})"),
            ids_smart_sql: format!("{SELECT}{ID_COL} FROM ({smart_sql})"),
            smart_sql,
            soup_name: None,
            select_paths: None,
            path: None,
            order_path: None,
            order: Order::Ascending,
            match_key: None,
            begin_key: None,
            end_key: None,
            like_key: None,
        }
    }

    // === Accessors ===

    /// Returns the query kind.
    #[must_use]
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Returns the page size.
    #[must_use]
    pub fn page_size_value(&self) -> usize {
        self.page_size
    }

    /// Returns the selection SQL.
    #[must_use]
    pub fn smart_sql(&self) -> &str {
        &self.smart_sql
    }

    /// Returns the `count(*)` SQL.
    #[must_use]
    pub fn count_smart_sql(&self) -> &str {
        &self.count_smart_sql
    }

    /// Returns the id-only SQL.
    #[must_use]
    pub fn ids_smart_sql(&self) -> &str {
        &self.ids_smart_sql
    }

    /// Returns the target soup (structured kinds only).
    #[must_use]
    pub fn soup_name(&self) -> Option<&str> {
        self.soup_name.as_deref()
    }

    /// Returns the projected paths, if any.
    #[must_use]
    pub fn select_paths(&self) -> Option<&[String]> {
        self.select_paths.as_deref()
    }

    /// Returns the filtered path.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the order path.
    #[must_use]
    pub fn order_path(&self) -> Option<&str> {
        self.order_path.as_deref()
    }

    /// Returns the sort direction.
    #[must_use]
    pub fn order(&self) -> Order {
        self.order
    }

    /// Returns the exact or full-text key.
    #[must_use]
    pub fn match_key(&self) -> Option<&str> {
        self.match_key.as_deref()
    }

    /// Returns the lower range bound.
    #[must_use]
    pub fn begin_key(&self) -> Option<&str> {
        self.begin_key.as_deref()
    }

    /// Returns the upper range bound.
    #[must_use]
    pub fn end_key(&self) -> Option<&str> {
        self.end_key.as_deref()
    }

    /// Returns the `LIKE` pattern.
    #[must_use]
    pub fn like_key(&self) -> Option<&str> {
        self.like_key.as_deref()
    }

    /// Returns the values bound to the `?` placeholders of the derived SQL.
    ///
    /// Empty for full-text queries (the key is inlined) and smart queries.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self.query_type {
            QueryType::Exact => self.match_key.iter().cloned().collect(),
            QueryType::Like => self.like_key.iter().cloned().collect(),
            QueryType::Range if self.path.is_some() => {
                self.begin_key.iter().chain(self.end_key.iter()).cloned().collect()
            }
            QueryType::Range | QueryType::Match | QueryType::Smart => Vec::new(),
        }
    }

    // === SQL derivation ===

    fn soup(&self) -> &str {
        self.soup_name.as_deref().unwrap_or_default()
    }

    fn soup_reference(&self) -> String {
        format!("{{{}}}", self.soup())
    }

    fn soup_fts_reference(&self) -> String {
        format!("{}{FTS_SUFFIX}", self.soup_reference())
    }

    fn field_reference(&self, field: &str) -> String {
        format!("{{{}:{field}}}", self.soup())
    }

    fn compute_select_clause(&self) -> String {
        let fields: Vec<String> = match &self.select_paths {
            Some(paths) => paths.iter().map(|p| self.field_reference(p)).collect(),
            None => vec![self.field_reference(SOUP_PATH)],
        };
        format!("{SELECT}{} ", fields.join(", "))
    }

    fn compute_from_clause(&self) -> String {
        format!("{FROM}{} ", self.soup_reference())
    }

    fn compute_where_clause(&self) -> String {
        // A path-less match searches every full-text column.
        if self.path.is_none() && self.query_type != QueryType::Match {
            return String::new();
        }
        let field = self.path.as_deref().map(|p| self.field_reference(p));
        let field_ref = field.as_deref().unwrap_or_default();

        let predicate = match self.query_type {
            QueryType::Exact => format!("{field_ref} = ? "),
            QueryType::Like => format!("{field_ref} LIKE ? "),
            QueryType::Range => match (&self.begin_key, &self.end_key) {
                (None, None) => String::new(),
                (Some(_), None) => format!("{field_ref} >= ? "),
                (None, Some(_)) => format!("{field_ref} <= ? "),
                (Some(_), Some(_)) => format!("{field_ref} >= ? AND {field_ref} <= ? "),
            },
            QueryType::Match => {
                let fts = self.soup_fts_reference();
                // Bound parameters are unreliable with MATCH, so the key is inlined.
                format!(
                    "{} IN ({SELECT}{ROWID_COL} {FROM}{fts} {WHERE}{fts} MATCH '{}') ",
                    self.field_reference(SOUP_ENTRY_ID),
                    qualify_match_key(field.as_deref(), self.match_key.as_deref().unwrap_or_default())
                )
            }
            QueryType::Smart => String::new(),
        };

        if predicate.is_empty() {
            String::new()
        } else {
            format!("{WHERE}{predicate}")
        }
    }

    fn compute_order_clause(&self) -> String {
        match &self.order_path {
            Some(path) => format!("{ORDER_BY}{} {} ", self.field_reference(path), self.order.sql()),
            None => String::new(),
        }
    }

    // === Serialized form ===

    /// Serializes the spec to its declarative JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let wire = QuerySpecJson {
            query_type: self.query_type.as_str().to_string(),
            soup_name: self.soup_name.clone(),
            select_paths: self.select_paths.clone(),
            index_path: self.path.clone(),
            match_key: self.match_key.clone(),
            begin_key: self.begin_key.clone(),
            end_key: self.end_key.clone(),
            like_key: self.like_key.clone(),
            smart_sql: (self.query_type == QueryType::Smart).then(|| self.smart_sql.clone()),
            order_path: self.order_path.clone(),
            order: self.order_path.as_ref().map(|_| self.order),
            page_size: Some(self.page_size),
        };
        // Only strings, numbers and arrays of strings: cannot fail.
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }

    /// Rebuilds a spec from its declarative JSON form.
    ///
    /// `soup_name` is used when the JSON does not name a soup. A missing
    /// `pageSize` falls back to [`DEFAULT_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuerySpec`] if the JSON is malformed or
    /// misses a key its kind requires.
    pub fn from_json(soup_name: Option<&str>, json: &Value) -> CoreResult<Self> {
        let wire: QuerySpecJson = serde_json::from_value(json.clone())
            .map_err(|e| CoreError::invalid_query_spec(e.to_string()))?;
        let query_type: QueryType = wire.query_type.parse()?;
        wire.into_spec(query_type, soup_name, DEFAULT_PAGE_SIZE)
    }
}

/// Prefixes every operand of a full-text expression with `field:`.
///
/// `AND`, `OR` and `NOT` (any case) and operands already written as a
/// `{soup:path}` reference are left alone. Without a field the expression
/// is returned unchanged.
///
/// ```
/// use soupstore_core::qualify_match_key;
///
/// assert_eq!(qualify_match_key(Some("Name"), "John AND Doe"), "Name:John AND Name:Doe");
/// assert_eq!(qualify_match_key(None, "John Doe"), "John Doe");
/// ```
#[must_use]
pub fn qualify_match_key(field: Option<&str>, match_key: &str) -> String {
    let Some(field) = field else {
        return match_key.to_string();
    };
    MATCH_TOKEN
        .replace_all(match_key, |caps: &Captures<'_>| {
            let token = &caps[0];
            let lower = token.to_lowercase();
            if lower == "and" || lower == "or" || lower == "not" || token.starts_with('{') {
                token.to_string()
            } else {
                format!("{field}:{token}")
            }
        })
        .into_owned()
}

/// Declarative form shared by serialization and parsing.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuerySpecJson {
    pub(crate) query_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) soup_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) select_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) index_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) begin_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) end_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) like_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) smart_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) order_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) page_size: Option<usize>,
}

impl QuerySpecJson {
    pub(crate) fn into_spec(
        self,
        query_type: QueryType,
        soup_name: Option<&str>,
        default_page_size: usize,
    ) -> CoreResult<QuerySpec> {
        let page_size = self.page_size.unwrap_or(default_page_size);
        let soup = match (query_type, self.soup_name.as_deref().or(soup_name)) {
            (_, Some(name)) => name.to_string(),
            (QueryType::Smart, None) => String::new(),
            (_, None) => return Err(CoreError::invalid_query_spec("query without soupName")),
        };
        let required = |value: Option<String>, key: &str| {
            value.ok_or_else(|| CoreError::invalid_query_spec(format!("{query_type} query without {key}")))
        };

        let builder = match query_type {
            QueryType::Exact => QuerySpec::exact(
                &soup,
                &required(self.index_path, "indexPath")?,
                required(self.match_key, "matchKey")?,
            ),
            QueryType::Like => QuerySpec::like(
                &soup,
                &required(self.index_path, "indexPath")?,
                required(self.like_key, "likeKey")?,
            ),
            QueryType::Range => match self.index_path {
                Some(path) => QuerySpec::range(&soup, &path, self.begin_key.as_deref(), self.end_key.as_deref()),
                None => QuerySpec::all(&soup),
            },
            QueryType::Match => QuerySpec::match_query(
                &soup,
                self.index_path.as_deref(),
                required(self.match_key, "matchKey")?,
            ),
            QueryType::Smart => {
                let sql = self
                    .smart_sql
                    .ok_or_else(|| CoreError::invalid_query_spec("smart query without smartSql"))?;
                return Ok(QuerySpec::smart(sql, page_size));
            }
        };

        let builder = match self.select_paths {
            Some(paths) => builder.select_paths(paths),
            None => builder,
        };
        let builder = match self.order_path {
            Some(path) => builder.order_by(path, self.order.unwrap_or_default()),
            None => builder,
        };
        Ok(builder.page_size(page_size).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn exact_query_sql() {
        let spec = QuerySpec::exact("people", "name", "ann").build();
        assert_eq!(spec.smart_sql(), "SELECT {people:_soup} FROM {people} WHERE {people:name} = ? ");
        assert_eq!(spec.count_smart_sql(), "SELECT count(*) FROM {people} WHERE {people:name} = ? ");
        assert_eq!(spec.ids_smart_sql(), "SELECT id FROM {people} WHERE {people:name} = ? ");
        assert_eq!(spec.args(), vec!["ann".to_string()]);
        assert_eq!(spec.page_size_value(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn like_query_with_projection_and_order() {
        let spec = QuerySpec::like("people", "name", "an%")
            .select_paths(["name", "age"])
            .order_by("age", Order::Descending)
            .build();
        assert_eq!(
            spec.smart_sql(),
            "SELECT {people:name}, {people:age} FROM {people} WHERE {people:name} LIKE ? ORDER BY {people:age} DESC "
        );
        assert_eq!(
            spec.ids_smart_sql(),
            "SELECT id FROM {people} WHERE {people:name} LIKE ? ORDER BY {people:age} DESC "
        );
        assert_eq!(spec.args(), vec!["an%".to_string()]);
    }

    #[test]
    fn range_bounds() {
        let none = QuerySpec::range("p", "age", None, None).build();
        assert_eq!(none.smart_sql(), "SELECT {p:_soup} FROM {p} ");
        assert!(none.args().is_empty());

        let end = QuerySpec::range("p", "age", None, Some("30")).build();
        assert_eq!(end.smart_sql(), "SELECT {p:_soup} FROM {p} WHERE {p:age} <= ? ");
        assert_eq!(end.args(), vec!["30".to_string()]);

        let begin = QuerySpec::range("p", "age", Some("18"), None).build();
        assert_eq!(begin.smart_sql(), "SELECT {p:_soup} FROM {p} WHERE {p:age} >= ? ");

        let both = QuerySpec::range("p", "age", Some("18"), Some("30")).build();
        assert_eq!(both.smart_sql(), "SELECT {p:_soup} FROM {p} WHERE {p:age} >= ? AND {p:age} <= ? ");
        assert_eq!(both.args(), vec!["18".to_string(), "30".to_string()]);
    }

    #[test]
    fn all_query_has_no_predicate() {
        let spec = QuerySpec::all("p").order_by("_soupEntryId", Order::Ascending).build();
        assert_eq!(spec.smart_sql(), "SELECT {p:_soup} FROM {p} ORDER BY {p:_soupEntryId} ASC ");
        assert_eq!(spec.count_smart_sql(), "SELECT count(*) FROM {p} ");
    }

    #[test]
    fn match_query_inlines_qualified_key() {
        let spec = QuerySpec::match_query("p", Some("bio"), "rust AND sql").build();
        assert_eq!(
            spec.smart_sql(),
            "SELECT {p:_soup} FROM {p} WHERE {p:_soupEntryId} IN (SELECT rowid FROM {p}_fts WHERE {p}_fts MATCH '{p:bio}:rust AND {p:bio}:sql') "
        );
        assert!(spec.args().is_empty());

        let anywhere = QuerySpec::match_query("p", None, "rust").build();
        assert!(anywhere.smart_sql().contains("MATCH 'rust'"));
    }

    #[test]
    fn smart_query_wraps_sql() {
        let spec = QuerySpec::smart("SELECT {p:name} FROM {p}", 5);
        assert_eq!(spec.smart_sql(), "SELECT {p:name} FROM {p}");
        assert_eq!(spec.count_smart_sql(), "SELECT count(*) FROM (SELECT {p:name} FROM {p})");
        assert_eq!(spec.ids_smart_sql(), "SELECT id FROM (SELECT {p:name} FROM {p})");
        assert!(spec.args().is_empty());
        assert_eq!(spec.soup_name(), None);
    }

    #[test]
    fn qualify_match_key_cases() {
        assert_eq!(qualify_match_key(Some("Name"), "John AND Doe"), "Name:John AND Name:Doe");
        assert_eq!(qualify_match_key(None, "John Doe"), "John Doe");
        assert_eq!(
            qualify_match_key(Some("f"), "(a OR b) not c"),
            "(f:a OR f:b) not f:c"
        );
        assert_eq!(qualify_match_key(Some("f"), "{p:x}:a b"), "{p:x}:a f:b");
    }

    #[test]
    fn from_json_reads_declarative_keys() {
        let spec = QuerySpec::from_json(
            Some("people"),
            &json!({
                "queryType": "range",
                "indexPath": "age",
                "beginKey": "18",
                "orderPath": "name",
                "order": "descending",
                "pageSize": 3
            }),
        )
        .unwrap();
        assert_eq!(spec.query_type(), QueryType::Range);
        assert_eq!(spec.soup_name(), Some("people"));
        assert_eq!(spec.order(), Order::Descending);
        assert_eq!(spec.page_size_value(), 3);
        assert_eq!(spec.args(), vec!["18".to_string()]);
    }

    #[test]
    fn from_json_rejects_incomplete_specs() {
        assert!(QuerySpec::from_json(Some("p"), &json!({"queryType": "exact", "indexPath": "a"})).is_err());
        assert!(QuerySpec::from_json(Some("p"), &json!({"queryType": "smart"})).is_err());
        assert!(QuerySpec::from_json(None, &json!({"queryType": "like", "indexPath": "a", "likeKey": "x"})).is_err());
        assert!(QuerySpec::from_json(Some("p"), &json!({"queryType": "fuzzy"})).is_err());
    }

    #[test]
    fn order_defaults_to_ascending() {
        let spec = QuerySpec::from_json(
            Some("p"),
            &json!({"queryType": "exact", "indexPath": "a", "matchKey": "x", "orderPath": "a"}),
        )
        .unwrap();
        assert_eq!(spec.order(), Order::Ascending);
        assert!(spec.smart_sql().ends_with("ORDER BY {p:a} ASC "));
    }

    fn key() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    fn spec_strategy() -> impl Strategy<Value = QuerySpec> {
        let order = prop_oneof![Just(Order::Ascending), Just(Order::Descending)];
        (
            0..5u8,
            key(),
            key(),
            proptest::option::of(key()),
            proptest::option::of(key()),
            proptest::option::of((key(), order)),
            proptest::option::of(proptest::collection::vec(key(), 1..3)),
            1..50usize,
        )
            .prop_map(|(kind, soup, path, a, b, order, select, page)| {
                let builder = match kind {
                    0 => QuerySpec::exact(&soup, &path, a.unwrap_or_default()),
                    1 => QuerySpec::range(&soup, &path, a.as_deref(), b.as_deref()),
                    2 => QuerySpec::like(&soup, &path, a.unwrap_or_default()),
                    3 => QuerySpec::match_query(&soup, b.as_deref(), a.unwrap_or_else(|| "x".into())),
                    _ => return QuerySpec::smart(format!("SELECT {{{soup}:{path}}} FROM {{{soup}}}"), page),
                };
                let builder = match select {
                    Some(paths) => builder.select_paths(paths),
                    None => builder,
                };
                let builder = match order {
                    Some((path, order)) => builder.order_by(path, order),
                    None => builder,
                };
                builder.page_size(page).build()
            })
    }

    proptest! {
        #[test]
        fn json_round_trip_preserves_sql(spec in spec_strategy()) {
            let rebuilt = QuerySpec::from_json(spec.soup_name(), &spec.to_json()).unwrap();
            prop_assert_eq!(rebuilt.smart_sql(), spec.smart_sql());
            prop_assert_eq!(rebuilt.count_smart_sql(), spec.count_smart_sql());
            prop_assert_eq!(rebuilt.ids_smart_sql(), spec.ids_smart_sql());
            prop_assert_eq!(rebuilt.args(), spec.args());
        }

        #[test]
        fn construction_is_deterministic(spec in spec_strategy()) {
            let again = QuerySpec::from_json(spec.soup_name(), &spec.to_json()).unwrap();
            let third = QuerySpec::from_json(spec.soup_name(), &again.to_json()).unwrap();
            prop_assert_eq!(again, third);
        }
    }
}
