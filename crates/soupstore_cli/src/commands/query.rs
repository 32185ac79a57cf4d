//! Query command implementation.

use serde_json::{json, Value};
use soupstore_core::{QuerySpecParser, SmartStore};
use std::path::Path;

/// Options of the query command.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Soup for structured specs that do not name one.
    pub soup: Option<String>,
    /// Zero-based page index.
    pub page: usize,
    /// Print only the count.
    pub count: bool,
    /// Print the query plan.
    pub explain: bool,
}

/// Runs the query command.
pub fn run(path: &Path, spec: &str, options: &QueryOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = SmartStore::open(path)?;
    let output = execute(&store, spec, options)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Parses `spec` and runs it, returning what the command prints.
pub fn execute(store: &SmartStore, spec: &str, options: &QueryOptions) -> Result<Value, Box<dyn std::error::Error>> {
    let json: Value = serde_json::from_str(spec)?;
    let parser = QuerySpecParser::with_default_page_size(store.config().default_page_size);
    let spec = parser.parse(options.soup.as_deref(), &json)?;

    if options.count {
        return Ok(json!({"count": store.count_query(&spec)?}));
    }

    store.set_capture_explain_query_plan(options.explain);
    let rows = store.query(&spec, options.page)?;
    tracing::debug!(rows = rows.len(), page = options.page, "query page fetched");

    let mut output = json!({"page": options.page, "rows": rows});
    if options.explain {
        if let Some(plan) = store.last_explain_query_plan() {
            output["plan"] = plan;
        }
    }
    Ok(output)
}
