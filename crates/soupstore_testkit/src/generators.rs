//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use serde_json::{json, Value};
use soupstore_core::{IndexSpec, IndexType, Order, QuerySpec};

/// Strategy for generating valid soup names.
pub fn soup_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating dotted document paths that are not special.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9]{0,7}", 1..4).prop_map(|steps| steps.join("."))
}

/// Strategy for generating index types.
pub fn index_type_strategy() -> impl Strategy<Value = IndexType> {
    prop_oneof![
        Just(IndexType::String),
        Just(IndexType::Integer),
        Just(IndexType::Floating),
        Just(IndexType::Json),
        Just(IndexType::FullText),
    ]
}

/// Strategy for generating registrable index specs: non-empty, with
/// distinct paths.
pub fn index_specs_strategy() -> impl Strategy<Value = Vec<IndexSpec>> {
    prop::collection::btree_map(path_strategy(), index_type_strategy(), 1..6).prop_map(|specs| {
        specs
            .into_iter()
            .map(|(path, index_type)| IndexSpec::new(path, index_type))
            .collect()
    })
}

/// Strategy for generating full-text operands.
pub fn match_term_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for generating full-text expressions of terms joined by
/// `AND`, `OR` or `NOT`, in any case.
pub fn match_key_strategy() -> impl Strategy<Value = String> {
    let op = prop_oneof![
        Just("AND"),
        Just("or"),
        Just("Not"),
        Just(""),
    ];
    (
        match_term_strategy(),
        prop::collection::vec((op, match_term_strategy()), 0..4),
    )
        .prop_map(|(first, rest)| {
            let mut key = first;
            for (op, term) in rest {
                if !op.is_empty() {
                    key.push(' ');
                    key.push_str(op);
                }
                key.push(' ');
                key.push_str(&term);
            }
            key
        })
}

/// Strategy for generating structured and smart query specs on `soup`.
pub fn query_spec_strategy(soup: String) -> impl Strategy<Value = QuerySpec> {
    let order = prop_oneof![Just(Order::Ascending), Just(Order::Descending)];
    (
        0..6u8,
        path_strategy(),
        proptest::option::of("[a-z0-9]{1,6}"),
        proptest::option::of("[a-z0-9]{1,6}"),
        proptest::option::of((path_strategy(), order)),
        proptest::option::of(prop::collection::vec(path_strategy(), 1..3)),
        1..100usize,
    )
        .prop_map(move |(kind, path, a, b, order, select, page_size)| {
            let builder = match kind {
                0 => QuerySpec::exact(&soup, &path, a.unwrap_or_default()),
                1 => QuerySpec::range(&soup, &path, a.as_deref(), b.as_deref()),
                2 => QuerySpec::like(&soup, &path, format!("{}%", a.unwrap_or_default())),
                3 => QuerySpec::match_query(&soup, b.as_ref().map(|_| path.as_str()), a.unwrap_or_else(|| "x".into())),
                4 => QuerySpec::all(&soup),
                _ => {
                    return QuerySpec::smart(
                        format!("SELECT {{{soup}:{path}}} FROM {{{soup}}} WHERE {{{soup}:_soupEntryId}} > 0"),
                        page_size,
                    )
                }
            };
            let builder = match select {
                Some(paths) => builder.select_paths(paths),
                None => builder,
            };
            let builder = match order {
                Some((path, order)) => builder.order_by(path, order),
                None => builder,
            };
            builder.page_size(page_size).build()
        })
}

/// Strategy for generating flat documents with an integer `age`, a string
/// `name` and an optional nested `address.city`.
pub fn document_strategy() -> impl Strategy<Value = Value> {
    (
        "[a-z]{1,8}",
        0..100i64,
        proptest::option::of("[a-z]{1,8}"),
    )
        .prop_map(|(name, age, city)| match city {
            Some(city) => json!({"name": name, "age": age, "address": {"city": city}}),
            None => json!({"name": name, "age": age}),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn index_specs_have_distinct_paths(specs in index_specs_strategy()) {
            let paths: HashSet<&str> = specs.iter().map(|s| s.path.as_str()).collect();
            prop_assert_eq!(paths.len(), specs.len());
            prop_assert!(!specs.is_empty());
        }

        #[test]
        fn paths_are_not_special(path in path_strategy()) {
            prop_assert!(!path.starts_with('_'));
        }

        #[test]
        fn query_specs_have_positive_page_size(spec in query_spec_strategy("s".to_string())) {
            prop_assert!(spec.page_size_value() > 0);
        }
    }
}
