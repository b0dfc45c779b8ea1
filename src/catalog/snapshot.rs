//! Catalog snapshot
//!
//! An immutable, in-memory view of tables and their index metadata. The
//! planner borrows a snapshot for the whole compilation and never mutates
//! it, so one snapshot can serve concurrent compilations.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CatalogError, CatalogResult};
use super::table::Table;

/// Read-only catalog snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table (builder form). Validation happens in `validate`.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Case-insensitive table lookup
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> CatalogResult<&Table> {
        self.table(name)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Parses and validates a JSON snapshot
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let mut catalog: Catalog = serde_json::from_str(json)?;
        for table in &mut catalog.tables {
            table.attach_names();
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads a JSON snapshot from disk
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name.to_ascii_uppercase()) {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }
            table.validate()?;
        }
        Ok(())
    }
}
