//! Inspect command implementation.

use serde::Serialize;
use soupstore_core::{IndexSpec, QuerySpec, SmartStore};
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of soups.
    pub soup_count: usize,
    /// Total entries across all soups.
    pub entry_count: i64,
    /// Per-soup statistics.
    pub soups: Vec<SoupStats>,
}

/// Statistics for a single soup.
#[derive(Debug, Serialize)]
pub struct SoupStats {
    /// Soup name.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Number of entries.
    pub entry_count: i64,
    /// Index specs (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<IndexSpec>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_indexes: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, show_indexes)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for the store at `path`.
pub fn inspect(path: &Path, show_indexes: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let store = SmartStore::open(path)?;

    let mut soups = Vec::new();
    for name in store.get_all_soup_names()? {
        let entry_count = store.count_query(&QuerySpec::all(&name).build())?;
        soups.push(SoupStats {
            table: store.get_soup_table_name(&name)?,
            indexes: if show_indexes {
                Some(store.get_soup_index_specs(&name)?)
            } else {
                None
            },
            name,
            entry_count,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path)?.len(),
        soup_count: soups.len(),
        entry_count: soups.iter().map(|s| s.entry_count).sum(),
        soups,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("SoupStore Inspection");
    println!("====================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Soups:   {}", result.soup_count);
    println!("Entries: {}", result.entry_count);

    for soup in &result.soups {
        println!();
        println!("  {} ({}) {} entries", soup.name, soup.table, soup.entry_count);
        if let Some(indexes) = &soup.indexes {
            for spec in indexes {
                println!("    {} {} -> {}", spec.path, spec.index_type, spec.column());
            }
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use soupstore_core::IndexType;
    use tempfile::TempDir;

    #[test]
    fn inspect_counts_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SmartStore::open(&path).unwrap();
            store.register_soup("people", &[IndexSpec::new("name", IndexType::String)]).unwrap();
            store.create("people", json!({"name": "ann"})).unwrap();
            store.create("people", json!({"name": "bob"})).unwrap();
        }

        let result = inspect(&path, true).unwrap();
        assert_eq!(result.soup_count, 1);
        assert_eq!(result.entry_count, 2);
        assert_eq!(result.soups[0].indexes.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(inspect(&dir.path().join("absent.db"), false).is_err());
    }

    #[test]
    fn format_sizes() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
