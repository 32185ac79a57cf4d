//! Dotted-path projection over JSON documents.

use serde_json::Value;

/// Returns the value at a dotted `path` inside `doc`, or `None` if any
/// step is missing.
///
/// An empty path returns the document itself. When a step lands on an
/// array, the rest of the path is applied to every element and the
/// results are collected into an array (missing elements are skipped).
///
/// ```
/// use serde_json::json;
/// use soupstore_core::project;
///
/// let doc = json!({"owner": {"name": "ann"}, "tags": [{"k": 1}, {"k": 2}]});
/// assert_eq!(project(&doc, "owner.name"), Some(json!("ann")));
/// assert_eq!(project(&doc, "tags.k"), Some(json!([1, 2])));
/// assert_eq!(project(&doc, "owner.age"), None);
/// ```
#[must_use]
pub fn project(doc: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(doc.clone());
    }
    let steps: Vec<&str> = path.split('.').collect();
    walk(doc, &steps)
}

fn walk(value: &Value, steps: &[&str]) -> Option<Value> {
    let Some((step, rest)) = steps.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => walk(map.get(*step)?, rest),
        Value::Array(items) => {
            let mapped: Vec<Value> = items.iter().filter_map(|item| walk(item, steps)).collect();
            Some(Value::Array(mapped))
        }
        _ => None,
    }
}
