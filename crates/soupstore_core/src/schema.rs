//! Declarative soup schemas.
//!
//! A schema file lists the soups an application needs:
//!
//! ```json
//! { "soups": [ { "soupName": "people", "indexes": [
//!     {"path": "name", "type": "string"},
//!     {"path": "address.city", "type": "json1"},
//!     {"path": "bio", "type": "full_text"}
//! ] } ] }
//! ```
//!
//! Index types are `string`, `integer`, `floating`, `json1` and
//! `full_text`.

use crate::error::CoreResult;
use crate::index::IndexSpec;
use crate::store::SmartStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One soup of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoupConfig {
    /// Soup name.
    #[serde(rename = "soupName")]
    pub soup_name: String,
    /// Index specs in declaration order.
    pub indexes: Vec<IndexSpec>,
}

/// A set of soups to register.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Soups, raw so one malformed entry does not reject the rest.
    #[serde(default)]
    pub soups: Vec<Value>,
}

impl StoreConfig {
    /// Parses a schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a schema file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            crate::error::CoreError::invalid_operation(format!(
                "cannot read schema {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Registers every soup not yet present and returns the names of those
    /// created.
    ///
    /// Malformed entries and soups that fail to register are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if soup existence cannot be checked.
    pub fn register_soups(&self, store: &SmartStore) -> CoreResult<Vec<String>> {
        let mut registered = Vec::new();
        for raw in &self.soups {
            let soup: SoupConfig = match serde_json::from_value(raw.clone()) {
                Ok(soup) => soup,
                Err(err) => {
                    tracing::warn!(error = %err, entry = %raw, "skipping malformed soup config");
                    continue;
                }
            };
            if store.has_soup(&soup.soup_name)? {
                tracing::debug!(soup = %soup.soup_name, "soup already registered");
                continue;
            }
            match store.register_soup(&soup.soup_name, &soup.indexes) {
                Ok(()) => registered.push(soup.soup_name),
                Err(err) => tracing::warn!(soup = %soup.soup_name, error = %err, "failed to register soup"),
            }
        }
        Ok(registered)
    }
}
