//! Translate command implementation.

use soupstore_core::SmartStore;
use std::path::Path;

/// Runs the translate command.
pub fn run(path: &Path, smart_sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SmartStore::open(path)?;
    println!("{}", store.translate(smart_sql)?);
    Ok(())
}
