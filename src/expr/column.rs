//! Resolved column references
//!
//! A column is identified by the FROM-list position of its table (the
//! scope) and its position within that table. Names ride along for
//! display only and never participate in equality.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A column resolved by the binder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Position of the owning table in the FROM list
    pub scope: usize,
    /// Position of the column in the owning table
    pub index: usize,
    /// Table name (display only)
    #[serde(default)]
    pub table: String,
    /// Column name (display only)
    #[serde(default)]
    pub name: String,
}

impl ColumnRef {
    pub fn new(scope: usize, index: usize, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope,
            index,
            table: table.into(),
            name: name.into(),
        }
    }

    /// Same column, moved to another scope
    pub fn with_scope(&self, scope: usize) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && self.index == other.index
    }
}

impl Eq for ColumnRef {}

impl Hash for ColumnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope.hash(state);
        self.index.hash(state);
    }
}
