//! Error types for SoupStore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SoupStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(#[from] soupstore_storage::StorageError),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A soup referenced by name is not registered.
    #[error("unknown soup {name}{}", at(.position))]
    UnknownCollection {
        /// Name of the soup.
        name: String,
        /// Character offset of the reference in smart SQL, if any.
        position: Option<usize>,
    },

    /// A `{...}` reference could not be interpreted.
    #[error("invalid soup/path reference {reference} at character {position}")]
    MalformedReference {
        /// The full reference, braces included.
        reference: String,
        /// Character offset of the reference.
        position: usize,
    },

    /// Smart SQL that is not a read query.
    #[error("only SELECT statements are supported: {statement}")]
    UnsupportedStatement {
        /// The rejected statement.
        statement: String,
    },

    /// Releasing an engine resource failed.
    #[error("failed to release resource: {message}")]
    ResourceRelease {
        /// Description of the failure.
        message: String,
    },

    /// Index specs are missing or inconsistent.
    #[error("invalid index specs: {message}")]
    InvalidIndexSpecs {
        /// Description of the problem.
        message: String,
    },

    /// A query spec could not be built or parsed.
    #[error("invalid query spec: {message}")]
    InvalidQuerySpec {
        /// Description of the problem.
        message: String,
    },

    /// A path that must be indexed is not.
    #[error("soup {soup} does not have an index on {path}")]
    MissingIndex {
        /// Soup name.
        soup: String,
        /// The unindexed path.
        path: String,
    },

    /// An entry id does not exist in the soup.
    #[error("entry {id} not found in soup {soup}")]
    EntryNotFound {
        /// Soup name.
        soup: String,
        /// Entry id.
        id: i64,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

fn at(position: &Option<usize>) -> String {
    position.map_or_else(String::new, |p| format!(" at character {p}"))
}

impl CoreError {
    /// Creates an unknown collection error with no source position.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection {
            name: name.into(),
            position: None,
        }
    }

    /// Creates an unknown collection error at a smart SQL offset.
    pub fn unknown_collection_at(name: impl Into<String>, position: usize) -> Self {
        Self::UnknownCollection {
            name: name.into(),
            position: Some(position),
        }
    }

    /// Creates a malformed reference error.
    pub fn malformed_reference(reference: impl Into<String>, position: usize) -> Self {
        Self::MalformedReference {
            reference: reference.into(),
            position,
        }
    }

    /// Creates an unsupported statement error.
    pub fn unsupported_statement(statement: impl Into<String>) -> Self {
        Self::UnsupportedStatement {
            statement: statement.into(),
        }
    }

    /// Creates a resource release error.
    pub fn resource_release(message: impl Into<String>) -> Self {
        Self::ResourceRelease {
            message: message.into(),
        }
    }

    /// Creates an invalid index specs error.
    pub fn invalid_index_specs(message: impl Into<String>) -> Self {
        Self::InvalidIndexSpecs {
            message: message.into(),
        }
    }

    /// Creates an invalid query spec error.
    pub fn invalid_query_spec(message: impl Into<String>) -> Self {
        Self::InvalidQuerySpec {
            message: message.into(),
        }
    }

    /// Creates a missing index error.
    pub fn missing_index(soup: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingIndex {
            soup: soup.into(),
            path: path.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the smart SQL character offset carried by this error, if any.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::UnknownCollection { position, .. } => *position,
            Self::MalformedReference { position, .. } => Some(*position),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_collection_message_includes_position() {
        let err = CoreError::unknown_collection_at("accounts", 14);
        assert_eq!(err.to_string(), "unknown soup accounts at character 14");
        assert_eq!(err.position(), Some(14));

        let err = CoreError::unknown_collection("accounts");
        assert_eq!(err.to_string(), "unknown soup accounts");
        assert_eq!(err.position(), None);
    }

    #[test]
    fn malformed_reference_message() {
        let err = CoreError::malformed_reference("{a:b:c}", 7);
        assert_eq!(err.to_string(), "invalid soup/path reference {a:b:c} at character 7");
    }
}
