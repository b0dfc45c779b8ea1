//! # Catalog Errors
//!
//! Errors raised while loading or validating a catalog snapshot. Planning
//! itself never mutates the catalog, so these only surface at load time.

use thiserror::Error;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog loading and validation errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Snapshot file could not be read
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot is not valid catalog JSON
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two tables share a name
    #[error("Duplicate table '{0}'")]
    DuplicateTable(String),

    /// Lookup of a table that does not exist
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// Column list or partition column is malformed
    #[error("Table '{table}': {reason}")]
    InvalidColumn { table: String, reason: String },

    /// Index key or predicate is malformed
    #[error("Index '{index}' on table '{table}': {reason}")]
    InvalidIndex {
        table: String,
        index: String,
        reason: String,
    },
}

impl CatalogError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Io(_) => "CATALOG_IO",
            CatalogError::Parse(_) => "CATALOG_PARSE",
            CatalogError::DuplicateTable(_) => "CATALOG_DUPLICATE_TABLE",
            CatalogError::UnknownTable(_) => "CATALOG_UNKNOWN_TABLE",
            CatalogError::InvalidColumn { .. } => "CATALOG_INVALID_COLUMN",
            CatalogError::InvalidIndex { .. } => "CATALOG_INVALID_INDEX",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::InvalidIndex {
            table: "T".into(),
            index: "T_IDX".into(),
            reason: "empty key".into(),
        };
        assert_eq!(err.to_string(), "Index 'T_IDX' on table 'T': empty key");
        assert_eq!(err.code(), "CATALOG_INVALID_INDEX");
    }
}
