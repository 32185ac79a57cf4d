//! Smart SQL translation tests.

use proptest::prelude::*;
use soupstore_core::{CoreError, IndexSpec, IndexType, SmartStore};
use soupstore_testkit::generators::path_strategy;
use soupstore_testkit::scenarios::{self, PEOPLE};

fn table(store: &SmartStore) -> String {
    store.get_soup_table_name(PEOPLE).unwrap()
}

#[test]
fn soup_reference_becomes_table_name() {
    let store = scenarios::people_store();
    let table = table(&store);
    assert_eq!(store.translate("SELECT count(*) FROM {people}").unwrap(), format!("SELECT count(*) FROM {table}"));
}

#[test]
fn indexed_paths_become_qualified_columns() {
    let store = scenarios::people_store();
    let table = table(&store);
    let sql = store.translate("SELECT {people:name}, {people:age} FROM {people}").unwrap();
    assert_eq!(sql, format!("SELECT {table}.{table}_0, {table}.{table}_1 FROM {table}"));
}

#[test]
fn special_fields_become_fixed_columns() {
    let store = scenarios::people_store();
    let table = table(&store);
    let sql = store
        .translate("SELECT {people:_soup}, {people:_soupEntryId}, {people:_soupCreatedDate}, {people:_soupLastModifiedDate} FROM {people}")
        .unwrap();
    assert_eq!(
        sql,
        format!("SELECT {table}.soup, {table}.id, {table}.created, {table}.lastModified FROM {table}")
    );
}

#[test]
fn json_paths_extract_from_the_qualified_document() {
    let store = scenarios::people_store();
    let table = table(&store);
    let sql = store.translate("SELECT {people:address.city} FROM {people}").unwrap();
    assert_eq!(sql, format!("SELECT json_extract({table}.soup, '$.address.city') FROM {table}"));
}

#[test]
fn match_literal_keeps_bare_columns() {
    let store = scenarios::people_store();
    let table = table(&store);
    let sql = store
        .translate("SELECT {people:_soupEntryId} FROM {people} WHERE {people:_soupEntryId} IN (SELECT rowid FROM {people}_fts WHERE {people}_fts MATCH '{people:bio}:rust')")
        .unwrap();
    assert!(sql.contains(&format!("MATCH '{table}_2:rust'")), "{sql}");
    assert!(sql.contains(&format!("FROM {table}_fts WHERE {table}_fts MATCH")), "{sql}");
}

#[test]
fn unknown_soup_is_positioned() {
    let store = scenarios::people_store();
    let err = store.translate("SELECT {people:name} FROM {ghosts}").unwrap_err();
    assert!(matches!(err, CoreError::UnknownCollection { ref name, .. } if name == "ghosts"));
    assert_eq!(err.position(), Some(26));
}

#[test]
fn translation_sees_newly_registered_soups() {
    let store = scenarios::people_store();
    assert!(store.translate("SELECT * FROM {pets}").is_err());
    store
        .register_soup("pets", &[IndexSpec::new("owner", IndexType::String)])
        .unwrap();
    let pets = store.get_soup_table_name("pets").unwrap();
    assert_eq!(store.translate("SELECT * FROM {pets}").unwrap(), format!("SELECT * FROM {pets}"));
}

#[test]
fn translation_forgets_dropped_soups() {
    let store = scenarios::people_store();
    store.translate("SELECT * FROM {people}").unwrap();
    store.drop_soup(PEOPLE).unwrap();
    assert!(matches!(
        store.translate("SELECT * FROM {people}"),
        Err(CoreError::UnknownCollection { .. })
    ));
}

proptest! {
    #[test]
    fn unindexed_paths_always_fall_back_to_json_extract(path in path_strategy()) {
        prop_assume!(!scenarios::people_specs().iter().any(|spec| spec.path == path));
        let store = scenarios::people_store();
        let table = table(&store);
        let sql = store.translate(&format!("SELECT {{people:{path}}} FROM {{people}}")).unwrap();
        prop_assert_eq!(sql, format!("SELECT json_extract({table}.soup, '$.{path}') FROM {table}"));
    }

    #[test]
    fn text_without_references_is_unchanged(sql in "SELECT [a-z0-9 ,*]{0,30}") {
        let store = scenarios::people_store();
        prop_assert_eq!(store.translate(&sql).unwrap(), sql);
    }

    #[test]
    fn writes_are_always_rejected(
        verb in prop_oneof![Just("INSERT"), Just("update"), Just("Delete")],
        rest in "[a-z ]{0,20}",
    ) {
        let store = scenarios::people_store();
        let result = store.translate(&format!("  {verb} {rest}"));
        prop_assert!(
            matches!(result, Err(CoreError::UnsupportedStatement { .. })),
            "expected rejection"
        );
    }
}
