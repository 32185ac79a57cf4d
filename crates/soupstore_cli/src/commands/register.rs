//! Register command implementation.

use soupstore_core::{SmartStore, StoreConfig};
use std::path::Path;

/// Runs the register command.
pub fn run(path: &Path, schema: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let registered = register(path, schema)?;
    if registered.is_empty() {
        println!("No new soups registered");
    } else {
        println!("Registered {} soup(s): {}", registered.len(), registered.join(", "));
    }
    Ok(())
}

/// Registers the soups of `schema` in the store at `path`, creating the
/// store if needed.
pub fn register(path: &Path, schema: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let config = StoreConfig::from_file(schema)?;
    let store = SmartStore::open(path)?;
    let registered = config.register_soups(&store)?;
    tracing::info!(count = registered.len(), schema = %schema.display(), "schema applied");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn registers_once() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("schema.json");
        std::fs::write(
            &schema,
            r#"{"soups": [{"soupName": "people", "indexes": [{"path": "name", "type": "string"}]}]}"#,
        )
        .unwrap();
        let store = dir.path().join("store.db");

        assert_eq!(register(&store, &schema).unwrap(), vec!["people".to_string()]);
        assert!(register(&store, &schema).unwrap().is_empty());
    }

    #[test]
    fn missing_schema_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(register(&dir.path().join("store.db"), &dir.path().join("nope.json")).is_err());
    }
}
