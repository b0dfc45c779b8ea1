//! Table metadata: columns, partitioning and indexes

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::errors::{CatalogError, CatalogResult};
use super::index::IndexDescriptor;
use crate::expr::Expr;

/// How a table's rows are spread over the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partitioning {
    /// Every node holds a full copy
    #[default]
    Replicated,
    /// Rows are hashed on one column
    Partitioned { column: usize },
}

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub partitioning: Partitioning,
    /// Indexes in declaration order
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            partitioning: Partitioning::Replicated,
            indexes: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Partitions the table on the named column. An unknown name yields a
    /// partition column that `validate` rejects.
    pub fn partitioned_on(mut self, column: &str) -> Self {
        let index = self.column_index(column).unwrap_or(usize::MAX);
        self.partitioning = Partitioning::Partitioned { column: index };
        self
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self.attach_names();
        self
    }

    /// Fills table/column display names into index expressions
    pub(crate) fn attach_names(&mut self) {
        let table = self.name.clone();
        let columns = self.columns.clone();
        let name_of = |e: &Expr| match e {
            Expr::Column(col) => {
                let mut col = col.clone();
                col.table = table.clone();
                if let Some(name) = columns.get(col.index) {
                    col.name = name.clone();
                }
                Some(Expr::Column(col))
            }
            _ => None,
        };
        for index in &mut self.indexes {
            for part in &mut index.key {
                part.expr = part.expr.rewrite(&name_of);
            }
            index.predicate = index.predicate.as_ref().map(|p| p.rewrite(&name_of));
        }
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Column expression for this table in the given query scope
    pub fn column_expr(&self, scope: usize, index: usize) -> Expr {
        let name = self.columns.get(index).map(String::as_str).unwrap_or("");
        Expr::column(scope, index, &self.name, name)
    }

    pub fn partition_column(&self) -> Option<usize> {
        match self.partitioning {
            Partitioning::Replicated => None,
            Partitioning::Partitioned { column } => Some(column),
        }
    }

    /// Column sets of unique indexes built on plain columns
    pub fn unique_keys(&self) -> Vec<Vec<usize>> {
        self.indexes
            .iter()
            .filter(|idx| idx.unique && !idx.is_partial())
            .filter_map(|idx| idx.key_columns())
            .collect()
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.columns.is_empty() {
            return Err(CatalogError::InvalidColumn {
                table: self.name.clone(),
                reason: "table has no columns".into(),
            });
        }

        if let Some(column) = self.partition_column() {
            if column >= self.columns.len() {
                return Err(CatalogError::InvalidColumn {
                    table: self.name.clone(),
                    reason: format!("partition column {} out of range", column),
                });
            }
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            let invalid = |reason: String| CatalogError::InvalidIndex {
                table: self.name.clone(),
                index: index.name.clone(),
                reason,
            };

            if !seen.insert(index.name.to_ascii_uppercase()) {
                return Err(invalid("duplicate index name".into()));
            }
            if index.key.is_empty() {
                return Err(invalid("empty key".into()));
            }

            let referenced = index
                .key
                .iter()
                .map(|part| &part.expr)
                .chain(index.predicate.iter())
                .flat_map(|e| e.columns());
            for col in referenced {
                if col.index >= self.columns.len() {
                    return Err(invalid(format!("column {} out of range", col.index)));
                }
            }
            if index.key.iter().any(|part| part.expr.contains_aggregate()) {
                return Err(invalid("aggregate in index key".into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_t() -> Table {
        Table::new("T")
            .with_columns(&["T_D0", "T_D1", "T_D2"])
            .with_index(IndexDescriptor::new("T_PK").asc(0, "").asc(1, "").primary_key())
    }

    #[test]
    fn test_attach_names() {
        let t = table_t();
        let col = t.indexes[0].key[1].expr.as_column().unwrap();
        assert_eq!(col.table, "T");
        assert_eq!(col.name, "T_D1");
    }

    #[test]
    fn test_unique_keys() {
        let t = table_t().with_index(IndexDescriptor::new("T_D2_IDX").asc(2, "T_D2"));
        assert_eq!(t.unique_keys(), vec![vec![0, 1]]);
    }

    #[test]
    fn test_partitioning() {
        let p = Table::new("P").with_columns(&["P_D0", "P_D1"]).partitioned_on("p_d0");
        assert_eq!(p.partition_column(), Some(0));
        assert!(p.validate().is_ok());

        let bad = Table::new("P").with_columns(&["P_D0"]).partitioned_on("missing");
        assert!(matches!(bad.validate(), Err(CatalogError::InvalidColumn { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let t = Table::new("T")
            .with_columns(&["A"])
            .with_index(IndexDescriptor::new("BAD").asc(4, "X"));
        assert!(matches!(t.validate(), Err(CatalogError::InvalidIndex { .. })));

        let dup = table_t().with_index(IndexDescriptor::new("t_pk").asc(2, "T_D2"));
        assert!(dup.validate().is_err());
    }
}
