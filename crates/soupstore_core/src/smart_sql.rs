//! Smart SQL translation.
//!
//! Smart SQL is ordinary SQL in which soups and document paths are written
//! as references:
//!
//! - `{soup}` becomes the soup's table name
//! - `{soup:_soup}`, `{soup:_soupEntryId}`, `{soup:_soupCreatedDate}` and
//!   `{soup:_soupLastModifiedDate}` become the fixed columns
//! - `{soup:path}` becomes the column of an indexed path, or a
//!   `json_extract` over the document for an unindexed one
//!
//! Path references are table-qualified unless they already follow a `.`
//! or sit inside a full-text `MATCH '...'` literal, where the engine wants
//! a bare column name. References inside any other string literal are left
//! untouched.

use crate::error::{CoreError, CoreResult};
use crate::helper::DbHelper;
use crate::types::{
    json_extract_expression, CREATED_COL, ID_COL, LAST_MODIFIED_COL, SOUP_COL, SOUP_CREATED_DATE,
    SOUP_ENTRY_ID, SOUP_LAST_MODIFIED_DATE, SOUP_PATH,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REFERENCE: Regex = Regex::new(r"\{([^}]+)\}").expect("reference pattern");
    // Text ending inside an unterminated single-quoted literal.
    static ref INSIDE_LITERAL: Regex = Regex::new(r"^([^']|'[^']*')*'[^']*$").expect("literal pattern");
    // Same, where the open literal is the operand of MATCH.
    static ref INSIDE_MATCH_LITERAL: Regex =
        Regex::new(r"^([^']|'[^']*')*MATCH[ ]+'[^']*$").expect("match literal pattern");
    static ref QUALIFIED_JSON_EXTRACT: Regex =
        Regex::new(r"(\w+)\.json_extract\(soup").expect("json_extract pattern");
}

const WRITE_PREFIXES: [&str; 3] = ["insert", "update", "delete"];

/// Translates smart SQL into SQL the engine can run.
///
/// Soup metadata is read through the helper's cache, so repeated
/// translations over the same soups do not touch storage.
///
/// # Errors
///
/// - [`CoreError::UnsupportedStatement`] for `INSERT`, `UPDATE` or `DELETE`
/// - [`CoreError::UnknownCollection`] for a reference to an unregistered soup
/// - [`CoreError::MalformedReference`] for a reference with more than one `:`
///
/// The last two carry the character offset of the offending reference.
pub fn translate(helper: &DbHelper, smart_sql: &str) -> CoreResult<String> {
    let lowered = smart_sql.trim().to_lowercase();
    if WRITE_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix)) {
        return Err(CoreError::unsupported_statement(smart_sql));
    }

    let mut sql = String::with_capacity(smart_sql.len() + 32);
    let mut last = 0;
    for caps in REFERENCE.captures_iter(smart_sql) {
        let Some(whole) = caps.get(0) else { continue };
        let start = whole.start();
        let before = &smart_sql[..start];

        let in_match_literal = INSIDE_MATCH_LITERAL.is_match(before);
        if INSIDE_LITERAL.is_match(before) && !in_match_literal {
            continue;
        }

        let position = before.chars().count();
        let qualify = !before.ends_with('.') && !in_match_literal;
        let replacement = resolve_reference(helper, &caps[1], whole.as_str(), position, qualify)?;

        sql.push_str(&smart_sql[last..start]);
        sql.push_str(&replacement);
        last = whole.end();
    }
    sql.push_str(&smart_sql[last..]);

    let sql = QUALIFIED_JSON_EXTRACT
        .replace_all(&sql, "json_extract(${1}.soup")
        .into_owned();
    tracing::trace!(smart_sql, sql = %sql, "translated smart sql");
    Ok(sql)
}

fn resolve_reference(
    helper: &DbHelper,
    reference: &str,
    full: &str,
    position: usize,
    qualify: bool,
) -> CoreResult<String> {
    let parts: Vec<&str> = reference.split(':').collect();
    let soup = parts[0];
    let table = helper
        .get_soup_table_name(soup)?
        .ok_or_else(|| CoreError::unknown_collection_at(soup, position))?;

    let path = match parts.as_slice() {
        [_] => return Ok(table),
        [_, path] => *path,
        _ => return Err(CoreError::malformed_reference(full, position)),
    };

    let column = match path {
        SOUP_PATH => SOUP_COL.to_string(),
        SOUP_ENTRY_ID => ID_COL.to_string(),
        SOUP_CREATED_DATE => CREATED_COL.to_string(),
        SOUP_LAST_MODIFIED_DATE => LAST_MODIFIED_COL.to_string(),
        _ => column_for_path(helper, soup, path, position)?,
    };

    Ok(if qualify { format!("{table}.{column}") } else { column })
}

fn column_for_path(helper: &DbHelper, soup: &str, path: &str, position: usize) -> CoreResult<String> {
    let specs = helper.get_index_specs(soup).map_err(|err| match err {
        CoreError::UnknownCollection { name, .. } => CoreError::unknown_collection_at(name, position),
        other => other,
    })?;
    Ok(specs
        .iter()
        .find(|spec| spec.path == path)
        .map_or_else(|| json_extract_expression(path), |spec| spec.column().to_string()))
}
